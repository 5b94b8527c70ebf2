//! Seekstream Web - HTTP range streaming API
//!
//! Serves partially downloaded torrent files to browsers and players over
//! HTTP range requests, and opens streaming sessions on demand.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, FinishedSession, SessionSlot, build_router, run_server};
