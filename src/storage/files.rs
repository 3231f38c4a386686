//! Media library
//!
//! Stores uploaded files on the local filesystem under a date-partitioned
//! layout (`uploads/YYYY/MM/DD/`) and records per-file metadata in a JSON
//! sidecar next to the stored bytes. Classification is by filename extension
//! only; file contents are never inspected.

use crate::utils::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Coarse category assigned to an upload, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl FileCategory {
    /// Classify by extension, case-insensitively; unknown and missing
    /// extensions fall back to `Other`
    pub fn from_filename(filename: &str) -> Self {
        let ext = match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return Self::Other,
        };
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => Self::Image,
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => Self::Audio,
            "mp4" | "avi" | "mov" | "wmv" | "mkv" | "webm" => Self::Video,
            "pdf" | "doc" | "docx" | "txt" | "md" | "markdown" => Self::Document,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
            Self::Other => "other",
        }
    }
}

/// Best-effort MIME type for a stored file, also extension-derived
pub fn detect_mime(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// Metadata record for one stored upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: FileCategory,
    pub file_size: u64,
    pub mime_type: String,
    pub upload_time: DateTime<Utc>,
    /// Public URL under which the stored file is addressable
    pub file_url: String,
    pub uploader_id: String,
}

/// Local-filesystem media store
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    public_base_url: String,
}

impl MediaStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, public_base_url: S) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Persist an upload and return its metadata record
    ///
    /// The stored name is prefixed with the record id so concurrent uploads
    /// of identically named files never collide.
    pub async fn put(&self, filename: &str, data: &[u8], uploader_id: &str) -> Result<FileRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let safe_name = sanitize_filename(filename);

        let relative_dir = format!("uploads/{}", now.format("%Y/%m/%d"));
        let stored_name = format!("{}_{}", id, safe_name);
        let dir = self.root.join(&relative_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GatewayError::storage(format!("creating upload dir: {}", e)))?;

        let path = dir.join(&stored_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| GatewayError::storage(format!("writing upload: {}", e)))?;

        let record = FileRecord {
            id,
            file_name: filename.to_string(),
            file_type: FileCategory::from_filename(filename),
            file_size: data.len() as u64,
            mime_type: detect_mime(filename).to_string(),
            upload_time: now,
            file_url: format!("{}/{}/{}", self.public_base_url, relative_dir, stored_name),
            uploader_id: uploader_id.to_string(),
        };

        let meta_path = dir.join(format!("{}.meta.json", id));
        let meta = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&meta_path, meta)
            .await
            .map_err(|e| GatewayError::storage(format!("writing metadata: {}", e)))?;

        info!(
            id = %record.id,
            file_name = %record.file_name,
            file_type = record.file_type.as_str(),
            file_size = record.file_size,
            "stored upload"
        );
        Ok(record)
    }

    /// Retrieve a stored upload by id
    ///
    /// Locates the metadata sidecar under the date-partitioned layout and
    /// reads the bytes stored next to it. Returns `None` for unknown ids.
    pub async fn get(&self, id: Uuid) -> Result<Option<(FileRecord, Vec<u8>)>> {
        let uploads = self.root.join("uploads");
        let sidecar_name = format!("{}.meta.json", id);
        let Some(meta_path) = find_file(&uploads, &sidecar_name).await? else {
            return Ok(None);
        };

        let meta = tokio::fs::read(&meta_path)
            .await
            .map_err(|e| GatewayError::storage(format!("reading metadata: {}", e)))?;
        let record: FileRecord = serde_json::from_slice(&meta)?;

        // The stored file sits next to its sidecar, prefixed with the id
        let dir = meta_path
            .parent()
            .ok_or_else(|| GatewayError::storage("sidecar has no parent directory"))?;
        let prefix = format!("{}_", id);
        let Some(stored_path) = find_with_prefix(dir, &prefix).await? else {
            return Err(GatewayError::storage(format!(
                "metadata without stored file for {}",
                id
            )));
        };
        let data = tokio::fs::read(&stored_path)
            .await
            .map_err(|e| GatewayError::storage(format!("reading upload: {}", e)))?;
        Ok(Some((record, data)))
    }
}

/// Depth-first search for an exactly named file under `root`
async fn find_file(root: &Path, name: &str) -> Result<Option<PathBuf>> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A missing uploads tree just means nothing was stored yet
            Err(_) => continue,
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GatewayError::storage(format!("listing {}: {}", dir.display(), e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| GatewayError::storage(e.to_string()))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if entry.file_name().to_str() == Some(name) {
                return Ok(Some(entry.path()));
            }
        }
    }
    Ok(None)
}

/// First directory entry whose name starts with `prefix`
async fn find_with_prefix(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| GatewayError::storage(format!("listing {}: {}", dir.display(), e)))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| GatewayError::storage(e.to_string()))?
    {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if name.starts_with(prefix) && !name.ends_with(".meta.json") {
                return Ok(Some(entry.path()));
            }
        }
    }
    Ok(None)
}

/// Strip path components and unusual characters from a client filename
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
