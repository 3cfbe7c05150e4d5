//! Examina core — search and preview orchestration for archives of
//! scanned medical documents.
//!
//! A desktop shell feeds user input into a [`session::ViewerSession`] and
//! draws the [`session::Frame`]s it returns. Remote answers only count
//! while they are still current: searches are generation-stamped,
//! thumbnail fetches are epoch-stamped, and whatever arrives late is
//! dropped instead of clobbering the screen.

pub mod config;
pub mod models;
pub mod gateway; // HTTP surface of the indexing backend
pub mod search; // Generation-stamped query dispatch
pub mod thumbnails; // Refcounted preview cache
pub mod results; // Projection into screen geometry
pub mod status; // Connectivity and the status bar
pub mod session; // Per-user orchestrator

use tracing_subscriber::EnvFilter;

/// Initialize structured logging for the host process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Examina starting v{}", config::APP_VERSION);
}
