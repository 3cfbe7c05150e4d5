//! Search controller — generation-stamped dispatch with stale-drop.
//!
//! **Why this exists**: the backend answers search requests in whatever
//! order it pleases, while the screen must always show the most recently
//! submitted query. The controller stamps every dispatch with a monotonic
//! generation and applies a response only if that generation is still the
//! latest when the response lands. Stale responses — successes and
//! failures alike — are dropped silently.
//!
//! **Design**:
//! - one atomic counter orders submits, filter re-runs, refreshes and
//!   clears; whoever bumped it last owns the screen
//! - clearing the query bumps the generation too, so a clear is final
//!   against anything still in flight
//! - filter edits are always stored, but re-run the current text only when
//!   they actually change the effective query
//! - no lock is held across an await

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config;
use crate::gateway::BackendGateway;
use crate::models::{SearchFilters, SearchQuery, SearchResponse};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Internal lock error")]
    LockPoisoned,
}

/// What a dispatching call did, for shells that surface activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The response was current and now populates the screen state.
    Accepted,
    /// A newer dispatch overtook this one; its result was dropped.
    Superseded,
    /// The request failed while still current; the error is surfaced.
    Failed,
    /// Empty text reset the screen without issuing a request.
    Cleared,
    /// Nothing to do.
    Skipped,
}

/// Point-in-time copy of the screen-facing search state.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSnapshot {
    pub accepted: Option<SearchResponse>,
    pub error: Option<String>,
    pub searching: bool,
    pub filters: SearchFilters,
}

struct ControllerInner {
    filters: SearchFilters,
    current_text: String,
    last_submitted: Option<SearchQuery>,
    accepted: Option<SearchResponse>,
    error: Option<String>,
    in_flight: Option<u64>,
}

// ═══════════════════════════════════════════════════════════
// Controller
// ═══════════════════════════════════════════════════════════

pub struct SearchController {
    gateway: Arc<dyn BackendGateway>,
    generation: AtomicU64,
    inner: Mutex<ControllerInner>,
}

impl SearchController {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self {
            gateway,
            generation: AtomicU64::new(0),
            inner: Mutex::new(ControllerInner {
                filters: SearchFilters::default(),
                current_text: String::new(),
                last_submitted: None,
                accepted: None,
                error: None,
                in_flight: None,
            }),
        }
    }

    /// The latest issued generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Result<SearchSnapshot, SearchError> {
        let inner = self.lock()?;
        Ok(SearchSnapshot {
            accepted: inner.accepted.clone(),
            error: inner.error.clone(),
            searching: inner.in_flight.is_some(),
            filters: inner.filters.clone(),
        })
    }

    pub fn filters(&self) -> Result<SearchFilters, SearchError> {
        Ok(self.lock()?.filters.clone())
    }

    /// Submit the search box contents.
    ///
    /// Text that trims to empty clears the screen without a request; the
    /// clear is final for anything still in flight. Non-empty text always
    /// dispatches, identical to the previous submission or not.
    pub async fn submit(&self, text: &str) -> Result<SearchOutcome, SearchError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return self.clear(text);
        }
        let query = {
            let mut inner = self.lock()?;
            inner.current_text = text.to_string();
            SearchQuery::new(trimmed, inner.filters.clone())
        };
        self.dispatch(query).await
    }

    /// Store new filters, re-running the current text only when the rebuilt
    /// query differs from the last submitted one.
    pub async fn set_filters(&self, filters: SearchFilters) -> Result<SearchOutcome, SearchError> {
        let query = {
            let mut inner = self.lock()?;
            inner.filters = filters;
            let trimmed = inner.current_text.trim();
            if trimmed.is_empty() {
                return Ok(SearchOutcome::Skipped);
            }
            let rebuilt = SearchQuery::new(trimmed, inner.filters.clone());
            if inner.last_submitted.as_ref() == Some(&rebuilt) {
                debug!("Filter change leaves the effective query unchanged");
                return Ok(SearchOutcome::Skipped);
            }
            rebuilt
        };
        self.dispatch(query).await
    }

    /// Re-run the last submitted query verbatim, filters included.
    ///
    /// The last submission survives a clear, so a refresh after clearing
    /// restores the previous results.
    pub async fn refresh(&self) -> Result<SearchOutcome, SearchError> {
        let query = {
            let inner = self.lock()?;
            match &inner.last_submitted {
                Some(query) => query.clone(),
                None => return Ok(SearchOutcome::Skipped),
            }
        };
        self.dispatch(query).await
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, ControllerInner>, SearchError> {
        self.inner.lock().map_err(|_| SearchError::LockPoisoned)
    }

    fn clear(&self, raw: &str) -> Result<SearchOutcome, SearchError> {
        let mut inner = self.lock()?;
        // The bump makes the clear final: in-flight responses resolve stale.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.current_text = raw.to_string();
        inner.accepted = None;
        inner.error = None;
        inner.in_flight = None;
        debug!(generation, "Search cleared");
        Ok(SearchOutcome::Cleared)
    }

    async fn dispatch(&self, query: SearchQuery) -> Result<SearchOutcome, SearchError> {
        // Issue the generation and record the dispatch under one lock, so
        // concurrent dispatches and clears order cleanly.
        let generation = {
            let mut inner = self.lock()?;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.last_submitted = Some(query.clone());
            inner.error = None;
            inner.in_flight = Some(generation);
            generation
        };
        debug!(generation, query = %query.text, "Search dispatched");

        let result = self
            .gateway
            .search(&query, config::SEARCH_PAGE_LIMIT, 0)
            .await;

        // Apply only if nothing newer was issued while we waited. The check
        // sits inside the lock, so a stale path can never interleave with a
        // newer resolution. It touches nothing: the newer dispatch owns the
        // in-flight marker.
        let mut inner = self.lock()?;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Stale search response dropped");
            return Ok(SearchOutcome::Superseded);
        }
        inner.in_flight = None;
        match result {
            Ok(mut response) => {
                let repaired = response.normalize();
                if repaired > 0 {
                    debug!(repaired, "Search response fields repaired");
                }
                if !response.page_consistent() {
                    warn!(
                        total = response.total,
                        shown = response.results.len(),
                        "Search response page counts are inconsistent"
                    );
                }
                info!(
                    generation,
                    total = response.total,
                    shown = response.results.len(),
                    "Search accepted"
                );
                inner.accepted = Some(response);
                Ok(SearchOutcome::Accepted)
            }
            Err(e) => {
                warn!(generation, error = %e, "Search failed");
                inner.error = Some(e.to_string());
                inner.accepted = None;
                Ok(SearchOutcome::Failed)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
