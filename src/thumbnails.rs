//! Thumbnail cache — refcounted preview slots shared across result screens.
//!
//! Key properties:
//! - One slot per record id; concurrent holders share a single fetch
//! - A slot is freed when its last holder releases it
//! - Every fetch is stamped with a cache-wide epoch; a completed fetch
//!   installs its result only if the slot still carries that epoch, so
//!   superseded fetches are discarded instead of resurrecting slots the
//!   screens no longer hold
//! - `peek` observes without holding, so re-renders never restart fetches
//! - A `Failed` slot retries only on a fresh `acquire`, never on its own
//!
//! Fetches are spawned onto the ambient tokio runtime; the cache must be
//! used from within one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use image::GenericImageView;
use tracing::{debug, warn};

use crate::gateway::{BackendGateway, GatewayError};
use crate::models::RecordId;

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Internal lock error")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// Preview image
// ═══════════════════════════════════════════════════════════

/// A decoded thumbnail, ready for the shell to blit.
///
/// Decoding happens on the fetch task, so consumers never hold raw bytes
/// that later turn out to be garbage.
#[derive(Debug)]
pub struct PreviewImage {
    image: image::DynamicImage,
    encoded_len: usize,
}

impl PreviewImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, GatewayError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(Self {
            image,
            encoded_len: bytes.len(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &image::DynamicImage {
        &self.image
    }

    /// Size of the encoded bytes this image was decoded from.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }
}

/// Lifecycle of one preview slot.
#[derive(Debug, Clone)]
pub enum PreviewState {
    /// A fetch is in flight.
    Pending,
    /// Decoded and displayable.
    Ready(Arc<PreviewImage>),
    /// Fetch or decode failed; retried only on a fresh `acquire`.
    Failed,
}

impl PreviewState {
    pub fn is_pending(&self) -> bool {
        matches!(self, PreviewState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PreviewState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PreviewState::Failed)
    }
}

// ═══════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════

struct PreviewSlot {
    state: PreviewState,
    refs: u32,
    epoch: u64,
}

struct CacheInner {
    gateway: Arc<dyn BackendGateway>,
    slots: Mutex<HashMap<RecordId, PreviewSlot>>,
    next_epoch: AtomicU64,
}

/// Shared preview cache. Cloning is cheap and all clones share state.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<CacheInner>,
}

impl ThumbnailCache {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                gateway,
                slots: Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Take a hold on the preview for `id` and report its current state.
    ///
    /// First holder starts the fetch; later holders share it. Acquiring a
    /// `Failed` slot restarts the fetch under a fresh epoch.
    pub fn acquire(&self, id: RecordId) -> Result<PreviewState, ThumbnailError> {
        let mut spawn_epoch = None;
        let state = {
            let mut slots = self
                .inner
                .slots
                .lock()
                .map_err(|_| ThumbnailError::LockPoisoned)?;
            match slots.entry(id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let slot = entry.get_mut();
                    slot.refs += 1;
                    if slot.state.is_failed() {
                        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
                        slot.state = PreviewState::Pending;
                        slot.epoch = epoch;
                        spawn_epoch = Some(epoch);
                    }
                    slot.state.clone()
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
                    entry.insert(PreviewSlot {
                        state: PreviewState::Pending,
                        refs: 1,
                        epoch,
                    });
                    spawn_epoch = Some(epoch);
                    PreviewState::Pending
                }
            }
        };
        // Spawn outside the lock.
        if let Some(epoch) = spawn_epoch {
            self.spawn_fetch(id, epoch);
        }
        Ok(state)
    }

    /// Drop one hold on `id`. The slot is evicted when the last hold goes.
    pub fn release(&self, id: RecordId) -> Result<(), ThumbnailError> {
        let mut slots = self
            .inner
            .slots
            .lock()
            .map_err(|_| ThumbnailError::LockPoisoned)?;
        match slots.get_mut(&id) {
            Some(slot) => {
                slot.refs -= 1;
                if slot.refs == 0 {
                    slots.remove(&id);
                    debug!(record_id = id, "Preview evicted");
                }
            }
            None => warn!(record_id = id, "Release of unheld preview ignored"),
        }
        Ok(())
    }

    /// Observe the state of `id` without taking a hold or starting a fetch.
    pub fn peek(&self, id: RecordId) -> Option<PreviewState> {
        self.inner
            .slots
            .lock()
            .ok()?
            .get(&id)
            .map(|slot| slot.state.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold count for `id`, if resident.
    pub fn refs(&self, id: RecordId) -> Option<u32> {
        self.inner.slots.lock().ok()?.get(&id).map(|slot| slot.refs)
    }

    /// Total encoded bytes behind `Ready` slots.
    pub fn resident_bytes(&self) -> usize {
        self.inner
            .slots
            .lock()
            .map(|slots| {
                slots
                    .values()
                    .map(|slot| match &slot.state {
                        PreviewState::Ready(img) => img.encoded_len(),
                        _ => 0,
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    fn spawn_fetch(&self, id: RecordId, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = match inner.gateway.fetch_thumbnail(id).await {
                Ok(bytes) => PreviewImage::decode(&bytes).map(Arc::new),
                Err(e) => Err(e),
            };
            let state = match outcome {
                Ok(image) => {
                    debug!(
                        record_id = id,
                        width = image.width(),
                        height = image.height(),
                        "Thumbnail ready"
                    );
                    PreviewState::Ready(image)
                }
                Err(e) => {
                    warn!(record_id = id, error = %e, "Thumbnail fetch failed");
                    PreviewState::Failed
                }
            };

            // Install only if the slot still carries our epoch. A released
            // or restarted slot means this result is orphaned.
            let Ok(mut slots) = inner.slots.lock() else {
                return;
            };
            match slots.get_mut(&id) {
                Some(slot) if slot.epoch == epoch => slot.state = state,
                _ => debug!(record_id = id, "Orphaned thumbnail result discarded"),
            }
        });
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{HealthReport, MockGateway};
    use crate::models::{SearchQuery, SearchResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Gateway whose thumbnail fetches park on a semaphore until the test
    /// opens the gate, one permit per fetch.
    struct GatedThumbs {
        bytes: Mutex<HashMap<RecordId, Vec<u8>>>,
        gate: Arc<Semaphore>,
        calls: AtomicU32,
    }

    impl GatedThumbs {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                bytes: Mutex::new(HashMap::new()),
                gate: Arc::new(Semaphore::new(0)),
                calls: AtomicU32::new(0),
            })
        }

        fn set_bytes(&self, id: RecordId, bytes: Vec<u8>) {
            self.bytes.lock().unwrap().insert(id, bytes);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendGateway for GatedThumbs {
        async fn health(&self) -> Result<HealthReport, GatewayError> {
            Ok(HealthReport::default())
        }

        async fn search(
            &self,
            _query: &SearchQuery,
            _limit: u32,
            _offset: u64,
        ) -> Result<SearchResponse, GatewayError> {
            Err(GatewayError::Status { status: 500 })
        }

        async fn fetch_thumbnail(&self, id: RecordId) -> Result<Vec<u8>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| GatewayError::Transport("gate closed".to_string()))?;
            permit.forget();
            self.bytes
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(GatewayError::Status { status: 404 })
        }

        async fn fetch_file(&self, _id: RecordId) -> Result<Vec<u8>, GatewayError> {
            Err(GatewayError::Status { status: 404 })
        }
    }

    fn ready_cache() -> (ThumbnailCache, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new().with_thumbnail(7, tiny_png()));
        (ThumbnailCache::new(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn acquire_fetches_and_decodes_once() {
        let (cache, gateway) = ready_cache();

        let state = cache.acquire(7).unwrap();
        assert!(state.is_pending());

        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        let Some(PreviewState::Ready(image)) = cache.peek(7) else {
            panic!("expected ready preview");
        };
        assert_eq!(image.width(), 1);
        assert_eq!(image.height(), 1);
        assert_eq!(image.encoded_len(), tiny_png().len());
        assert_eq!(cache.resident_bytes(), tiny_png().len());
        assert_eq!(gateway.thumbnail_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_holders_share_one_fetch() {
        let gateway = GatedThumbs::new();
        gateway.set_bytes(7, tiny_png());
        let cache = ThumbnailCache::new(gateway.clone());

        assert!(cache.acquire(7).unwrap().is_pending());
        assert!(cache.acquire(7).unwrap().is_pending());
        assert_eq!(cache.refs(7), Some(2));

        gateway.gate.add_permits(1);
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        assert_eq!(gateway.calls(), 1);
        assert_eq!(cache.refs(7), Some(2));
    }

    #[tokio::test]
    async fn missing_thumbnail_marks_slot_failed() {
        let cache = ThumbnailCache::new(Arc::new(MockGateway::new()));

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_failed())).await;
        assert_eq!(cache.len(), 1, "failed slot stays resident while held");
        assert_eq!(cache.refs(7), Some(1));
    }

    #[tokio::test]
    async fn undecodable_bytes_mark_slot_failed() {
        let gateway = Arc::new(MockGateway::new().with_thumbnail(7, vec![1, 2, 3, 4]));
        let cache = ThumbnailCache::new(gateway);

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_failed())).await;
    }

    #[tokio::test]
    async fn reacquire_after_failure_retries_fetch() {
        let gateway = Arc::new(MockGateway::new());
        let cache = ThumbnailCache::new(gateway.clone());

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_failed())).await;

        gateway.set_thumbnail(7, tiny_png());
        let state = cache.acquire(7).unwrap();
        assert!(state.is_pending(), "failed slot restarts on acquire");

        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        assert_eq!(gateway.thumbnail_calls(), 2);
        assert_eq!(cache.refs(7), Some(2));
    }

    #[tokio::test]
    async fn peek_never_starts_a_fetch() {
        let (cache, gateway) = ready_cache();

        assert!(cache.peek(7).is_none());
        assert_eq!(gateway.thumbnail_calls(), 0);

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        cache.peek(7);
        cache.peek(7);
        assert_eq!(gateway.thumbnail_calls(), 1);
    }

    #[tokio::test]
    async fn release_to_zero_evicts_slot() {
        let (cache, _gateway) = ready_cache();

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;

        cache.release(7).unwrap();
        assert!(cache.is_empty());
        assert!(cache.peek(7).is_none());
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[tokio::test]
    async fn partial_release_keeps_slot() {
        let (cache, _gateway) = ready_cache();

        cache.acquire(7).unwrap();
        cache.acquire(7).unwrap();
        cache.release(7).unwrap();
        assert_eq!(cache.refs(7), Some(1));

        cache.release(7).unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn release_of_unheld_id_is_ignored() {
        let (cache, _gateway) = ready_cache();
        cache.release(99).unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn eviction_drops_cache_reference() {
        let (cache, _gateway) = ready_cache();

        cache.acquire(7).unwrap();
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        let Some(PreviewState::Ready(held)) = cache.peek(7) else {
            panic!("expected ready preview");
        };
        assert_eq!(Arc::strong_count(&held), 2);

        cache.release(7).unwrap();
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[tokio::test]
    async fn result_after_release_is_discarded() {
        let gateway = GatedThumbs::new();
        gateway.set_bytes(7, tiny_png());
        let cache = ThumbnailCache::new(gateway.clone());

        cache.acquire(7).unwrap();
        wait_until(|| gateway.calls() == 1).await;
        cache.release(7).unwrap();
        assert!(cache.is_empty());

        // Let the parked fetch finish; its slot is gone, so nothing lands.
        gateway.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_empty());

        // A fresh hold starts over cleanly.
        gateway.gate.add_permits(1);
        assert!(cache.acquire(7).unwrap().is_pending());
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn stale_epoch_result_cannot_clobber_restarted_slot() {
        let gateway = GatedThumbs::new();
        gateway.set_bytes(7, tiny_png());
        let cache = ThumbnailCache::new(gateway.clone());

        // First fetch parks, then its hold is dropped and a new hold starts
        // a second fetch under a newer epoch.
        cache.acquire(7).unwrap();
        wait_until(|| gateway.calls() == 1).await;
        cache.release(7).unwrap();
        cache.acquire(7).unwrap();
        wait_until(|| gateway.calls() == 2).await;

        gateway.gate.add_permits(2);
        wait_until(|| cache.peek(7).is_some_and(|s| s.is_ready())).await;
        assert_eq!(cache.refs(7), Some(1));
    }
}
