//! Application constants and environment-driven settings.
//!
//! Everything tunable lives here so the rest of the crate never reads the
//! environment directly. There is no config file: the backend address is the
//! only value that varies per deployment, and it comes from an env var.

/// Application-level constants
pub const APP_NAME: &str = "Examina";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var that overrides the backend base URL.
pub const BACKEND_URL_ENV: &str = "EXAMINA_BACKEND_URL";

/// Default indexing backend (uvicorn on the standard port).
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Page size for every search request. Paging beyond the first page is not
/// part of the client yet; the status line reports truncation instead.
pub const SEARCH_PAGE_LIMIT: u32 = 50;

/// Grid layout bounds. The shell may offer any column count in this range.
pub const MIN_GRID_COLUMNS: u8 = 2;
pub const MAX_GRID_COLUMNS: u8 = 6;
pub const DEFAULT_GRID_COLUMNS: u8 = 4;

/// HTTP timeouts for the backend gateway.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Resolve the backend base URL: env override, else the local default.
pub fn backend_url() -> String {
    std::env::var(BACKEND_URL_ENV)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
}

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "examina=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_examina() {
        assert_eq!(APP_NAME, "Examina");
    }

    #[test]
    fn grid_bounds_are_ordered() {
        assert!(MIN_GRID_COLUMNS <= DEFAULT_GRID_COLUMNS);
        assert!(DEFAULT_GRID_COLUMNS <= MAX_GRID_COLUMNS);
    }

    #[test]
    fn default_filter_scopes_to_crate() {
        assert!(default_log_filter().starts_with("examina"));
    }

    #[test]
    fn backend_url_env_override() {
        // Set, read, clean up, then check the fallback — all in one test so
        // parallel tests never observe the temporary env state.
        std::env::set_var(BACKEND_URL_ENV, "http://nas-index:9000 ");
        assert_eq!(backend_url(), "http://nas-index:9000");

        std::env::set_var(BACKEND_URL_ENV, "   ");
        assert_eq!(backend_url(), DEFAULT_BACKEND_URL);

        std::env::remove_var(BACKEND_URL_ENV);
        assert_eq!(backend_url(), DEFAULT_BACKEND_URL);
    }
}
