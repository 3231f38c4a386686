//! HTTP server implementation
//!
//! Route handlers, shared application state and server startup.

pub mod builder;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod utils;

pub use builder::run_server;
pub use server::HttpServer;
pub use state::AppState;
