// Realtime reconciliation: notify-then-pull with debouncing.
//
// Change notifications carry no payload, so every event resolves to the
// same action — an authoritative re-fetch followed by a wholesale snapshot
// replacement. Bursts of notifications within the debounce window (default
// 200ms, range 50ms–2s) coalesce into a single fetch.
//
// The reconciler never coordinates with the mutator. A fetch that lands
// while an optimistic write is still in flight may briefly overwrite the
// optimistic value with the pre-write state; that race is bounded by write
// latency and resolved by the pending mutation's own commit or rollback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use leadflow_common::protocol::ChangeEvent;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, trace, warn};

use crate::backend::LeadBackend;
use crate::store::LeadStore;

/// Default debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 50;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 2_000;

/// Configuration for fetch debouncing.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Create a config with the given window in milliseconds, clamped to
    /// [50, 2000].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

/// Coalesces change notifications into a single pending re-fetch.
///
/// Unlike a per-key debouncer there is only one slot: every notification
/// demands the same full fetch, so only the most recent arrival time
/// matters. Each notification resets the window.
pub struct FetchDebouncer {
    config: DebounceConfig,
    last_notified: Option<Instant>,
}

impl FetchDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, last_notified: None }
    }

    /// Record a change notification, arming (or re-arming) the window.
    pub fn notify(&mut self) {
        self.notify_at(Instant::now());
    }

    fn notify_at(&mut self, now: Instant) {
        self.last_notified = Some(now);
    }

    /// Returns true (and disarms) when the debounce window has elapsed.
    pub fn take_ready(&mut self) -> bool {
        self.take_ready_at(Instant::now())
    }

    fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.last_notified {
            Some(at) if now.duration_since(at) >= self.config.window => {
                self.last_notified = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.last_notified.is_some()
    }

    /// When the pending fetch becomes ready, or None if disarmed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.last_notified.map(|at| at + self.config.window)
    }
}

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub debounce: DebounceConfig,
    /// How often to check the debouncer for a ready fetch.
    pub poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { debounce: DebounceConfig::default(), poll_interval: Duration::from_millis(50) }
    }
}

/// Runs the reconciliation loop.
///
/// Consumes change notifications, debounces them, and replaces the local
/// snapshot with the authoritative fetch result. A failed fetch retains the
/// current snapshot and re-arms the debouncer so the fetch is retried after
/// another window.
///
/// Exits when `events` closes (subscription dropped) or `shutdown` fires.
pub async fn run_reconciler(
    mut events: mpsc::Receiver<ChangeEvent>,
    store: Arc<Mutex<LeadStore>>,
    backend: Arc<dyn LeadBackend>,
    config: ReconcilerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer = FetchDebouncer::new(config.debounce);

    info!("reconciler started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("reconciler shutting down");
                break;
            }

            maybe_event = events.recv() => {
                match maybe_event {
                    Some(event) => {
                        trace!(?event, "change notification received");
                        debouncer.notify();
                    }
                    None => {
                        info!("change stream closed, reconciler exiting");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(config.poll_interval) => {
                // Check for a ready debounced fetch.
            }
        }

        if debouncer.take_ready() {
            match backend.fetch_all().await {
                Ok(leads) => {
                    let mut store = store.lock().await;
                    store.replace_all(leads);
                    debug!(version = store.version(), "snapshot reconciled");
                }
                Err(error) => {
                    warn!(%error, "reconciliation fetch failed, snapshot retained");
                    debouncer.notify();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use leadflow_common::types::{Lead, LeadPatch, OwnerRef, Stage};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::backend::memory::InMemoryBackend;

    use super::*;

    // ── DebounceConfig ─────────────────────────────────────────────

    #[test]
    fn default_config_is_200ms() {
        assert_eq!(DebounceConfig::default().window, Duration::from_millis(200));
    }

    #[test]
    fn config_clamps_below_minimum() {
        assert_eq!(DebounceConfig::with_millis(1).window, Duration::from_millis(50));
    }

    #[test]
    fn config_clamps_above_maximum() {
        assert_eq!(DebounceConfig::with_millis(60_000).window, Duration::from_millis(2_000));
    }

    // ── FetchDebouncer ─────────────────────────────────────────────

    #[test]
    fn not_ready_before_window_elapses() {
        let mut debouncer = FetchDebouncer::new(DebounceConfig::default());
        let now = Instant::now();

        debouncer.notify_at(now);
        assert!(debouncer.is_armed());
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(100)));
        assert!(debouncer.is_armed());
    }

    #[test]
    fn ready_after_window_and_disarms() {
        let mut debouncer = FetchDebouncer::new(DebounceConfig::default());
        let now = Instant::now();

        debouncer.notify_at(now);
        assert!(debouncer.take_ready_at(now + Duration::from_millis(200)));
        assert!(!debouncer.is_armed());
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(400)), "take is one-shot");
    }

    #[test]
    fn burst_coalesces_and_resets_window() {
        let mut debouncer = FetchDebouncer::new(DebounceConfig::default());
        let now = Instant::now();

        debouncer.notify_at(now);
        debouncer.notify_at(now + Duration::from_millis(150));

        // 200ms after the first event, but only 50ms after the last.
        assert!(!debouncer.take_ready_at(now + Duration::from_millis(200)));
        assert!(debouncer.take_ready_at(now + Duration::from_millis(350)));
    }

    #[test]
    fn next_deadline_tracks_last_notification() {
        let mut debouncer = FetchDebouncer::new(DebounceConfig::default());
        assert!(debouncer.next_deadline().is_none());

        let now = Instant::now();
        debouncer.notify_at(now);
        assert_eq!(debouncer.next_deadline(), Some(now + Duration::from_millis(200)));
    }

    // ── run_reconciler ─────────────────────────────────────────────

    fn lead(name: &str, stage: Stage) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: String::new(),
            phone: String::new(),
            company: String::new(),
            value: Decimal::ZERO,
            stage,
            tags: Vec::new(),
            source: "test".to_string(),
            owner: OwnerRef::Unassigned,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn wait_for_version(store: &Arc<Mutex<LeadStore>>, at_least: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.lock().await.version() >= at_least {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("store version should advance in time");
    }

    #[tokio::test]
    async fn burst_of_events_coalesces_into_one_fetch() {
        let backend = Arc::new(InMemoryBackend::new());
        let l = lead("a", Stage::New);
        let id = l.id;
        backend.seed([l]);

        let store = Arc::new(Mutex::new(LeadStore::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (event_tx, event_rx) = mpsc::channel(32);

        let config = ReconcilerConfig {
            debounce: DebounceConfig::with_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        let handle = tokio::spawn(run_reconciler(
            event_rx,
            store.clone(),
            backend.clone() as Arc<dyn LeadBackend>,
            config,
            shutdown_rx,
        ));

        // Burst: several notifications in quick succession.
        for _ in 0..5 {
            event_tx.send(ChangeEvent::Update { lead_id: Some(id) }).await.expect("send");
        }

        wait_for_version(&store, 1).await;
        assert_eq!(backend.fetch_calls(), 1, "burst coalesces into a single fetch");
        assert_eq!(store.lock().await.len(), 1);

        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn failed_fetch_retains_snapshot_and_retries() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed([lead("a", Stage::New)]);
        backend.fail_next_fetches(1);

        let store = Arc::new(Mutex::new(LeadStore::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (event_tx, event_rx) = mpsc::channel(32);

        let config = ReconcilerConfig {
            debounce: DebounceConfig::with_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        let handle = tokio::spawn(run_reconciler(
            event_rx,
            store.clone(),
            backend.clone() as Arc<dyn LeadBackend>,
            config,
            shutdown_rx,
        ));

        event_tx.send(ChangeEvent::Insert { lead_id: None }).await.expect("send");

        // First fetch fails; the debouncer re-arms and the retry succeeds.
        wait_for_version(&store, 1).await;
        assert!(backend.fetch_calls() >= 2);
        assert_eq!(store.lock().await.len(), 1);

        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn reconciler_exits_when_change_stream_closes() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(Mutex::new(LeadStore::new()));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (event_tx, event_rx) = mpsc::channel(32);

        let handle = tokio::spawn(run_reconciler(
            event_rx,
            store,
            backend as Arc<dyn LeadBackend>,
            ReconcilerConfig::default(),
            shutdown_rx,
        ));

        drop(event_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reconciler should exit")
            .expect("reconciler task should not panic");
    }

    #[tokio::test]
    async fn external_backend_update_flows_into_snapshot() {
        let backend = Arc::new(InMemoryBackend::new());
        let l = lead("a", Stage::New);
        let id = l.id;
        backend.seed([l]);

        let store = Arc::new(Mutex::new(LeadStore::new()));
        store.lock().await.replace_all(backend.fetch_all().await.expect("seed fetch"));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let events = backend.subscribe();
        let config = ReconcilerConfig {
            debounce: DebounceConfig::with_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        let handle = tokio::spawn(run_reconciler(
            events,
            store.clone(),
            backend.clone() as Arc<dyn LeadBackend>,
            config,
            shutdown_rx,
        ));

        // Another user's edit: notification is pushed by the backend.
        backend.apply_external_update(id, LeadPatch::stage(Stage::Contacted));

        wait_for_version(&store, 2).await;
        assert_eq!(store.lock().await.get(id).expect("lead").stage, Stage::Contacted);

        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
}
