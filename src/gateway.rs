//! Backend gateway — typed access to the indexing service's HTTP surface.
//!
//! **Why this exists**: every remote operation the client performs (health
//! probe, search, thumbnail fetch, file fetch) funnels through one seam, so
//! the controller, the preview cache and the tests all speak to the same
//! contract. The gateway does request/response framing only — no retries, no
//! caching, no interpretation of status semantics beyond success/failure.
//!
//! **Design**:
//! - `BackendGateway` is the async trait the rest of the crate depends on
//! - `HttpGateway` implements it over reqwest against the real backend
//! - `MockGateway` implements it over an in-memory corpus with the same
//!   matching rules the index applies (digit queries match patient ids,
//!   text queries match patient names)
//! - Failures map onto a three-way taxonomy: transport, HTTP status, decode

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::models::{MedicalRecord, RecordId, SearchQuery, SearchResponse, SortDirection, SortKey};

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

/// Failures surfaced by gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network-level failure: unreachable host, timeout, broken connection.
    #[error("Backend unreachable: {0}")]
    Transport(String),
    /// The backend answered with a non-success HTTP status.
    #[error("Backend returned HTTP {status}")]
    Status { status: u16 },
    /// The body could not be decoded (malformed JSON or image bytes).
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

// ═══════════════════════════════════════════════════════════
// Health report
// ═══════════════════════════════════════════════════════════

/// Diagnostic payload from `GET /api/health`.
///
/// Every field is optional and parsed leniently: connectivity is decided by
/// HTTP success alone, the payload is informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub watcher: Option<String>,
    #[serde(default)]
    pub cache_size: Option<String>,
    #[serde(default)]
    pub indexed_files: Option<u64>,
}

// ═══════════════════════════════════════════════════════════
// BackendGateway trait
// ═══════════════════════════════════════════════════════════

/// The four remote operations of the indexing backend.
///
/// Each call is a single request/response pair. Callers own retry policy;
/// implementations own none.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// `GET /api/health` — reachability probe with a diagnostic payload.
    async fn health(&self) -> Result<HealthReport, GatewayError>;

    /// `GET /api/search` — one page of matches for the query.
    async fn search(
        &self,
        query: &SearchQuery,
        limit: u32,
        offset: u64,
    ) -> Result<SearchResponse, GatewayError>;

    /// `GET /api/thumbnail/{id}` — encoded preview image bytes.
    async fn fetch_thumbnail(&self, id: RecordId) -> Result<Vec<u8>, GatewayError>;

    /// `GET /api/file/{id}` — the full document bytes.
    async fn fetch_file(&self, id: RecordId) -> Result<Vec<u8>, GatewayError>;
}

// ═══════════════════════════════════════════════════════════
// HttpGateway
// ═══════════════════════════════════════════════════════════

/// Gateway over the real backend via reqwest.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway against the given base URL.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Gateway against `EXAMINA_BACKEND_URL`, or the local default.
    pub fn from_env() -> Self {
        Self::new(&config::backend_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_connect() {
            GatewayError::Transport(format!("cannot reach backend at {}", self.base_url))
        } else if e.is_timeout() {
            GatewayError::Transport(format!(
                "request timed out after {}s",
                config::REQUEST_TIMEOUT_SECS
            ))
        } else {
            GatewayError::Transport(e.to_string())
        }
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn health(&self) -> Result<HealthReport, GatewayError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        // Reachable is what matters; a malformed payload still counts.
        Ok(response.json().await.unwrap_or_default())
    }

    async fn search(
        &self,
        query: &SearchQuery,
        limit: u32,
        offset: u64,
    ) -> Result<SearchResponse, GatewayError> {
        let url = format!("{}/api/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&query.to_params(limit, offset))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn fetch_thumbnail(&self, id: RecordId) -> Result<Vec<u8>, GatewayError> {
        self.get_bytes(&format!("/api/thumbnail/{id}")).await
    }

    async fn fetch_file(&self, id: RecordId) -> Result<Vec<u8>, GatewayError> {
        self.get_bytes(&format!("/api/file/{id}")).await
    }
}

// ═══════════════════════════════════════════════════════════
// MockGateway
// ═══════════════════════════════════════════════════════════

/// In-memory gateway for tests and shell development.
///
/// Serves a configurable record corpus with the index's matching rules,
/// counts calls per operation, and can inject failures.
pub struct MockGateway {
    records: Mutex<Vec<MedicalRecord>>,
    thumbnails: Mutex<HashMap<RecordId, Vec<u8>>>,
    files: Mutex<HashMap<RecordId, Vec<u8>>>,
    healthy: AtomicBool,
    fail_searches: AtomicBool,
    health_calls: AtomicU32,
    search_calls: AtomicU32,
    thumbnail_calls: AtomicU32,
    file_calls: AtomicU32,
    last_search: Mutex<Option<(SearchQuery, u32, u64)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            thumbnails: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            fail_searches: AtomicBool::new(false),
            health_calls: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
            thumbnail_calls: AtomicU32::new(0),
            file_calls: AtomicU32::new(0),
            last_search: Mutex::new(None),
        }
    }

    // ── Builders ────────────────────────────────────────────

    pub fn with_records(self, records: Vec<MedicalRecord>) -> Self {
        if let Ok(mut corpus) = self.records.lock() {
            *corpus = records;
        }
        self
    }

    pub fn with_thumbnail(self, id: RecordId, bytes: Vec<u8>) -> Self {
        self.set_thumbnail(id, bytes);
        self
    }

    pub fn with_file(self, id: RecordId, bytes: Vec<u8>) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert(id, bytes);
        }
        self
    }

    // ── Runtime knobs ───────────────────────────────────────

    pub fn set_thumbnail(&self, id: RecordId, bytes: Vec<u8>) {
        if let Ok(mut thumbs) = self.thumbnails.lock() {
            thumbs.insert(id, bytes);
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    // ── Observability ───────────────────────────────────────

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn thumbnail_calls(&self) -> u32 {
        self.thumbnail_calls.load(Ordering::SeqCst)
    }

    pub fn file_calls(&self) -> u32 {
        self.file_calls.load(Ordering::SeqCst)
    }

    /// The query, limit and offset of the most recent search call.
    pub fn last_search(&self) -> Option<(SearchQuery, u32, u64)> {
        self.last_search.lock().ok()?.clone()
    }

    // ── Matching (mirrors the index) ────────────────────────

    fn matches(record: &MedicalRecord, query: &SearchQuery) -> bool {
        let text = query.text.trim();
        let hit = if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            record.patient_id.contains(text)
        } else {
            record
                .patient_name
                .to_lowercase()
                .contains(&text.to_lowercase())
        };
        if !hit {
            return false;
        }

        if let Some(kind) = &query.filters.file_type {
            if &record.file_type != kind {
                return false;
            }
        }

        // Range bounds compare against the date prefix of the raw timestamp.
        let day = record
            .file_creation_date
            .as_deref()
            .and_then(|d| d.get(..10))
            .unwrap_or("");
        if let Some(start) = query.filters.date_start {
            if day < start.format("%Y-%m-%d").to_string().as_str() {
                return false;
            }
        }
        if let Some(end) = query.filters.date_end {
            if day.is_empty() || day > end.format("%Y-%m-%d").to_string().as_str() {
                return false;
            }
        }
        true
    }

    fn sort(records: &mut [MedicalRecord], key: &SortKey, direction: &SortDirection) {
        match key {
            SortKey::FileCreationDate => {
                records.sort_by(|a, b| a.file_creation_date.cmp(&b.file_creation_date));
            }
            SortKey::PatientName => records.sort_by(|a, b| a.patient_name.cmp(&b.patient_name)),
            SortKey::IndexedAt => records.sort_by_key(|r| r.id),
        }
        if *direction == SortDirection::Descending {
            records.reverse();
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn health(&self) -> Result<HealthReport, GatewayError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("mock backend offline".to_string()));
        }
        let indexed = self.records.lock().map(|r| r.len() as u64).unwrap_or(0);
        Ok(HealthReport {
            status: Some("healthy".to_string()),
            database: Some("connected".to_string()),
            watcher: Some("running".to_string()),
            cache_size: None,
            indexed_files: Some(indexed),
        })
    }

    async fn search(
        &self,
        query: &SearchQuery,
        limit: u32,
        offset: u64,
    ) -> Result<SearchResponse, GatewayError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_search.lock() {
            *last = Some((query.clone(), limit, offset));
        }
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(GatewayError::Status { status: 500 });
        }

        let mut matched: Vec<MedicalRecord> = self
            .records
            .lock()
            .map(|corpus| {
                corpus
                    .iter()
                    .filter(|r| Self::matches(r, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Self::sort(
            &mut matched,
            &query.filters.sort_by,
            &query.filters.sort_direction,
        );

        let total = matched.len() as u64;
        let page: Vec<MedicalRecord> = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(SearchResponse {
            total,
            results: page,
            query: query.text.clone(),
            limit,
            offset,
        })
    }

    async fn fetch_thumbnail(&self, id: RecordId) -> Result<Vec<u8>, GatewayError> {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        self.thumbnails
            .lock()
            .ok()
            .and_then(|t| t.get(&id).cloned())
            .ok_or(GatewayError::Status { status: 404 })
    }

    async fn fetch_file(&self, id: RecordId) -> Result<Vec<u8>, GatewayError> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .ok()
            .and_then(|f| f.get(&id).cloned())
            .ok_or(GatewayError::Status { status: 404 })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
