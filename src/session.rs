//! Viewer session — one user's search-and-preview workspace.
//!
//! **Why this exists**: the shell is a thin drawing layer; everything it
//! needs per frame comes out of `render()` here. The session wires the
//! search controller, the connectivity monitor and the preview cache
//! together and keeps preview holds in lockstep with what is on screen.
//!
//! **Design**:
//! - `render()` projects current state into a `Frame`, acquiring and
//!   releasing preview holds so they always match the visible grid
//! - error, list and blank screens hold no previews; the loading screen
//!   keeps the previous holds so a returning grid reuses warm slots
//! - the status bar is fed the accepted response even while loading, so
//!   counts do not flicker during a re-search
//! - downloads and preview fetches never disturb search state; their
//!   failures stay local to the tile or the save dialog

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config;
use crate::gateway::{BackendGateway, GatewayError, HttpGateway};
use crate::models::{FileKind, MedicalRecord, RecordId, SearchFilters};
use crate::results::{self, ResultsView, ViewMode};
use crate::search::{SearchController, SearchError, SearchOutcome};
use crate::status::{self, BackendMonitor, ConnectivityState, StatusError, StatusSummary};
use crate::thumbnails::{PreviewState, ThumbnailCache, ThumbnailError};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
    #[error("Thumbnail error: {0}")]
    Thumbnails(#[from] ThumbnailError),
    #[error("Status error: {0}")]
    Status(#[from] StatusError),
    #[error("Internal lock error")]
    LockPoisoned,
}

/// The content area of the screen.
#[derive(Debug, Clone)]
pub enum ScreenView {
    /// Nothing submitted yet, or the query was cleared.
    Blank,
    /// A dispatch is in flight; the shell draws a spinner.
    Loading,
    /// The latest dispatch failed.
    Error { message: String },
    Results(ResultsView),
}

/// One full draw of the screen.
#[derive(Debug, Clone)]
pub struct Frame {
    pub screen: ScreenView,
    pub status: StatusSummary,
}

/// What the shell should open when a result is activated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewIntent {
    pub record_id: RecordId,
    pub patient_name: String,
    pub file_type: FileKind,
}

/// A fetched document plus the name to save it under.
#[derive(Debug, Clone)]
pub struct DownloadPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Build the open-intent for a result row or tile.
pub fn view_intent(record: &MedicalRecord) -> ViewIntent {
    ViewIntent {
        record_id: record.id,
        patient_name: record.patient_name.clone(),
        file_type: record.file_type.clone(),
    }
}

struct ViewPrefs {
    mode: ViewMode,
    grid_columns: u8,
}

// ═══════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════

pub struct ViewerSession {
    gateway: Arc<dyn BackendGateway>,
    search: SearchController,
    monitor: BackendMonitor,
    thumbnails: ThumbnailCache,
    prefs: Mutex<ViewPrefs>,
    displayed: Mutex<HashSet<RecordId>>,
}

impl ViewerSession {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self {
            search: SearchController::new(gateway.clone()),
            monitor: BackendMonitor::new(gateway.clone()),
            thumbnails: ThumbnailCache::new(gateway.clone()),
            gateway,
            prefs: Mutex::new(ViewPrefs {
                mode: ViewMode::default(),
                grid_columns: config::DEFAULT_GRID_COLUMNS,
            }),
            displayed: Mutex::new(HashSet::new()),
        }
    }

    /// Session against the configured backend URL.
    pub fn connect() -> Self {
        Self::new(Arc::new(HttpGateway::from_env()))
    }

    // ── Search surface ──────────────────────────────────────

    pub async fn submit(&self, text: &str) -> Result<SearchOutcome, SessionError> {
        Ok(self.search.submit(text).await?)
    }

    pub async fn set_filters(&self, filters: SearchFilters) -> Result<SearchOutcome, SessionError> {
        Ok(self.search.set_filters(filters).await?)
    }

    /// Re-run the last query and re-probe the backend, concurrently.
    pub async fn refresh(&self) -> Result<SearchOutcome, SessionError> {
        let (outcome, probe) = tokio::join!(self.search.refresh(), self.monitor.check());
        probe?;
        Ok(outcome?)
    }

    pub async fn check_health(&self) -> Result<ConnectivityState, SessionError> {
        Ok(self.monitor.check().await?)
    }

    // ── View preferences ────────────────────────────────────

    pub fn set_view_mode(&self, mode: ViewMode) -> Result<(), SessionError> {
        self.prefs
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .mode = mode;
        Ok(())
    }

    pub fn set_grid_columns(&self, columns: u8) -> Result<(), SessionError> {
        self.prefs
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .grid_columns = results::clamp_grid_columns(columns);
        Ok(())
    }

    // ── Rendering ───────────────────────────────────────────

    /// Project the current state into one drawable frame.
    ///
    /// Preview holds are brought in line with what the frame shows, so
    /// calling this after every state change keeps the cache exact.
    pub fn render(&self) -> Result<Frame, SessionError> {
        let snapshot = self.search.snapshot()?;
        let (mode, columns) = {
            let prefs = self.prefs.lock().map_err(|_| SessionError::LockPoisoned)?;
            (prefs.mode, prefs.grid_columns)
        };

        let screen = if let Some(message) = snapshot.error.clone() {
            self.release_all()?;
            ScreenView::Error { message }
        } else if snapshot.searching {
            // Holds stay warm; the grid usually comes straight back.
            ScreenView::Loading
        } else if let Some(response) = &snapshot.accepted {
            match mode {
                ViewMode::List => {
                    self.release_all()?;
                    ScreenView::Results(results::present(response, mode, columns, &HashMap::new()))
                }
                ViewMode::Grid => {
                    let ids = response.results.iter().map(|r| r.id).collect();
                    let previews = self.sync_previews(ids)?;
                    ScreenView::Results(results::present(response, mode, columns, &previews))
                }
            }
        } else {
            self.release_all()?;
            ScreenView::Blank
        };

        let indexed = self.monitor.last_report()?.and_then(|r| r.indexed_files);
        let status = status::summarize(
            snapshot.accepted.as_ref(),
            self.monitor.connectivity()?,
            indexed,
        );
        Ok(Frame { screen, status })
    }

    // ── Documents ───────────────────────────────────────────

    /// Restart the fetch behind a failed preview tile.
    pub fn retry_preview(&self, id: RecordId) -> Result<PreviewState, SessionError> {
        let displayed = self.displayed.lock().map_err(|_| SessionError::LockPoisoned)?;
        if !displayed.contains(&id) {
            warn!(record_id = id, "Preview retry for a record not on screen ignored");
            return Ok(self.thumbnails.peek(id).unwrap_or(PreviewState::Failed));
        }
        // The extra hold restarts a failed slot; releasing it right away
        // leaves the refcount as it was.
        let state = self.thumbnails.acquire(id)?;
        self.thumbnails.release(id)?;
        Ok(state)
    }

    /// Fetch the full document and name it after the record.
    pub async fn download(&self, record: &MedicalRecord) -> Result<DownloadPayload, GatewayError> {
        let bytes = self.gateway.fetch_file(record.id).await?;
        info!(
            record_id = record.id,
            bytes = bytes.len(),
            "Document fetched for download"
        );
        Ok(DownloadPayload {
            file_name: record.suggested_filename(),
            bytes,
        })
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Release every preview hold. Safe to call more than once.
    pub fn teardown(&self) {
        if let Ok(mut displayed) = self.displayed.lock() {
            let count = displayed.len();
            for id in displayed.drain() {
                let _ = self.thumbnails.release(id);
            }
            if count > 0 {
                debug!(released = count, "Session preview holds released");
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn controller(&self) -> &SearchController {
        &self.search
    }

    pub fn monitor(&self) -> &BackendMonitor {
        &self.monitor
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    // ── Internal ────────────────────────────────────────────

    /// Move preview holds from the previously displayed set to `wanted`
    /// and report the current state of every wanted id.
    fn sync_previews(
        &self,
        wanted: Vec<RecordId>,
    ) -> Result<HashMap<RecordId, PreviewState>, SessionError> {
        let mut displayed = self.displayed.lock().map_err(|_| SessionError::LockPoisoned)?;

        let wanted_set: HashSet<RecordId> = wanted.iter().copied().collect();
        for id in displayed.iter() {
            if !wanted_set.contains(id) {
                self.thumbnails.release(*id)?;
            }
        }

        let mut previews = HashMap::with_capacity(wanted.len());
        for id in wanted {
            // A duplicated id in the response must not take a second hold.
            if previews.contains_key(&id) {
                continue;
            }
            let state = if displayed.contains(&id) {
                // Already held; observe without adding a hold.
                self.thumbnails.peek(id).unwrap_or(PreviewState::Pending)
            } else {
                self.thumbnails.acquire(id)?
            };
            previews.insert(id, state);
        }
        *displayed = wanted_set;
        Ok(previews)
    }

    fn release_all(&self) -> Result<(), SessionError> {
        let mut displayed = self.displayed.lock().map_err(|_| SessionError::LockPoisoned)?;
        for id in displayed.drain() {
            self.thumbnails.release(id)?;
        }
        Ok(())
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
