//! Persistent storage backends

pub mod files;

pub use files::{detect_mime, FileCategory, FileRecord, MediaStore};
