//! Dashboard poller — keeps [`PollerState`] in sync with the backend.
//!
//! On mount it runs one foreground cycle, then a silent background cycle
//! every `interval`. A cycle is:
//!
//!   probe ──fail──▶ Disconnected (fixed diagnostic, data kept)
//!     │
//!     ok
//!     ▼
//!   summary ∥ health (both awaited)
//!     ├─ connection-class failure ─▶ Disconnected (error message, data kept)
//!     └─ otherwise ─▶ Connected, each successful half replaces its slot,
//!                     a data-class failure keeps the previous value
//!
//! Cycles never overlap: a manual refresh waits for an in-flight cycle,
//! a background tick that finds a cycle in flight is skipped. Every state
//! write checks liveness, so nothing is published after [`Poller::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{DashboardApi, HealthData, SummaryData};
use crate::config::MonitorConfig;
use crate::error::ApiError;

mod state;

pub use state::{ConnectionState, Phase, PollerState, Snapshot};

/// Default polling interval (2 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Floor for the polling interval; zero would panic in `time::interval`.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_API_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub interval: Duration,
    /// Published as `connection_error` when the probe fails.
    pub unreachable_message: String,
}

impl PollerOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            unreachable_message: unreachable_message(config.api_port().unwrap_or(DEFAULT_API_PORT)),
        }
    }
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            unreachable_message: unreachable_message(DEFAULT_API_PORT),
        }
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_POLL_INTERVAL {
        warn!(
            requested_ms = interval.as_millis() as u64,
            min_ms = MIN_POLL_INTERVAL.as_millis() as u64,
            "Poll interval too small — clamping"
        );
        return MIN_POLL_INTERVAL;
    }
    interval
}

pub fn unreachable_message(port: u16) -> String {
    format!(
        "API server is not running. Please start the backend server on port {}.",
        port
    )
}

/// What one cycle learned from the backend.
enum CycleOutcome {
    Unreachable(ApiError),
    ConnectionLost(ApiError),
    Fetched {
        summary: Result<SummaryData, ApiError>,
        health: Result<HealthData, ApiError>,
    },
}

/// Owns the dashboard state for the lifetime of its owner.
pub struct Poller {
    shared: Arc<Shared>,
    interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    api: Arc<dyn DashboardApi>,
    state: watch::Sender<PollerState>,
    /// Serializes cycles.
    cycle: tokio::sync::Mutex<()>,
    alive: AtomicBool,
    unreachable_message: String,
}

impl Poller {
    /// Create a poller in its mount state without starting the schedule.
    pub fn new(api: Arc<dyn DashboardApi>, options: PollerOptions) -> Self {
        let (state, _) = watch::channel(PollerState::initial());
        Self {
            shared: Arc::new(Shared {
                api,
                state,
                cycle: tokio::sync::Mutex::new(()),
                alive: AtomicBool::new(true),
                unreachable_message: options.unreachable_message,
            }),
            interval: clamp_interval(options.interval),
            ticker: Mutex::new(None),
        }
    }

    /// Create and start a poller. Must be called inside a tokio runtime.
    pub fn mount(api: Arc<dyn DashboardApi>, options: PollerOptions) -> Self {
        let poller = Self::new(api, options);
        poller.start();
        poller
    }

    /// Start the schedule: one foreground cycle now, then silent cycles
    /// every interval. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() || !self.shared.is_alive() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let period = self.interval;
        *ticker = Some(tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "📡 Dashboard poller starting");

            shared.foreground_cycle().await;

            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if !shared.is_alive() {
                    break;
                }
                shared.background_cycle().await;
            }
        }));
    }

    /// Trigger a foreground cycle without waiting for it.
    pub fn refresh(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.foreground_cycle().await;
        });
    }

    /// Run a foreground cycle and return once its result is published.
    pub async fn refresh_now(&self) {
        self.shared.foreground_cycle().await;
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> PollerState {
        self.shared.state.borrow().clone()
    }

    /// Stop the schedule. Results still in flight are discarded.
    pub fn shutdown(&self) {
        // Flip the flag under the channel's write lock so no publish
        // can straddle it.
        self.shared.state.send_if_modified(|_| {
            self.shared.alive.store(false, Ordering::Release);
            false
        });

        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Dashboard poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_alive()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Apply `f` to the state and notify subscribers, unless torn down.
    fn publish<R>(&self, f: impl FnOnce(&mut PollerState) -> R) -> Option<R> {
        let mut out = None;
        self.state.send_if_modified(|state| {
            if !self.is_alive() {
                return false;
            }
            out = Some(f(state));
            true
        });
        out
    }

    async fn foreground_cycle(&self) {
        if !self.is_alive() {
            return;
        }
        let _guard = self.cycle.lock().await;
        // Shutdown may have happened while queued behind another cycle.
        if !self.is_alive() {
            return;
        }
        self.run_cycle(false).await;
    }

    async fn background_cycle(&self) {
        let Ok(_guard) = self.cycle.try_lock() else {
            debug!("Cycle still in flight — skipping tick");
            return;
        };
        self.run_cycle(true).await;
    }

    /// Caller must hold the cycle lock.
    async fn run_cycle(&self, silent: bool) {
        if !silent {
            self.publish(|state| {
                state.loading = true;
                state.connection_error = None;
            });
        }

        let outcome = self.fetch().await;

        let transition = self.publish(|state| {
            let before = state.connection;
            reconcile(state, outcome, &self.unreachable_message);
            if !silent {
                state.loading = false;
            }
            (before, state.connection, state.connection_error.clone())
        });

        match transition {
            Some((before, ConnectionState::Disconnected, message))
                if before != ConnectionState::Disconnected =>
            {
                warn!(error = message.as_deref().unwrap_or_default(), "🔌 Lost connection to API server");
            }
            Some((ConnectionState::Disconnected, ConnectionState::Connected, _)) => {
                info!("🔌 Connection to API server restored");
            }
            Some((ConnectionState::Unknown, ConnectionState::Connected, _)) => {
                info!("🔌 Connected to API server");
            }
            Some(_) => {}
            None => debug!("Poller torn down — discarding cycle result"),
        }
    }

    async fn fetch(&self) -> CycleOutcome {
        if let Err(e) = self.api.probe().await {
            return CycleOutcome::Unreachable(e);
        }

        let (summary, health) = tokio::join!(self.api.summary(), self.api.health());

        match (summary, health) {
            (Err(e), _) if e.is_connection_error() => CycleOutcome::ConnectionLost(e),
            (_, Err(e)) if e.is_connection_error() => CycleOutcome::ConnectionLost(e),
            (summary, health) => CycleOutcome::Fetched { summary, health },
        }
    }
}

/// Fold one cycle's outcome into the state. `loading` is left alone.
fn reconcile(state: &mut PollerState, outcome: CycleOutcome, unreachable_message: &str) {
    match outcome {
        CycleOutcome::Unreachable(err) => {
            debug!(error = %err, "Probe failed");
            state.connection_error = Some(unreachable_message.to_string());
            state.connection = ConnectionState::Disconnected;
        }
        CycleOutcome::ConnectionLost(err) => {
            state.connection_error = Some(err.to_string());
            state.connection = ConnectionState::Disconnected;
        }
        CycleOutcome::Fetched { summary, health } => {
            state.connection_error = None;
            state.connection = ConnectionState::Connected;

            match summary {
                Ok(summary) => state.summary = Some(summary),
                Err(e) => warn!(error = %e, "Summary fetch failed — keeping previous summary"),
            }
            match health {
                Ok(health) => state.health = Some(health),
                Err(e) => warn!(error = %e, "Health fetch failed — keeping previous health"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        CollectionCounts, Databases, MainDatabaseHealth, SummaryCounts, TableCounts,
        VectorDatabaseHealth,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Clone)]
    enum Reply<T> {
        Ok(T),
        ConnectionError(&'static str),
        DataError,
    }

    impl<T: Clone> Reply<T> {
        fn result(&self, endpoint: &str) -> Result<T, ApiError> {
            match self {
                Reply::Ok(v) => Ok(v.clone()),
                Reply::ConnectionError(msg) => Err(ApiError::connection(*msg)),
                Reply::DataError => Err(ApiError::status(
                    endpoint,
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    "boom",
                )),
            }
        }
    }

    /// Scripted backend. When `gated`, `summary()` signals `entered` and
    /// parks until `gate` is notified.
    struct FakeApi {
        reachable: AtomicBool,
        summary: Mutex<Reply<SummaryData>>,
        health: Mutex<Reply<HealthData>>,
        probes: AtomicUsize,
        gated: AtomicBool,
        entered: Notify,
        gate: Notify,
    }

    impl FakeApi {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                reachable: AtomicBool::new(true),
                summary: Mutex::new(Reply::Ok(sample_summary())),
                health: Mutex::new(Reply::Ok(sample_health())),
                probes: AtomicUsize::new(0),
                gated: AtomicBool::new(false),
                entered: Notify::new(),
                gate: Notify::new(),
            })
        }

        fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        fn set_summary(&self, reply: Reply<SummaryData>) {
            *self.summary.lock().unwrap() = reply;
        }

        fn set_health(&self, reply: Reply<HealthData>) {
            *self.health.lock().unwrap() = reply;
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DashboardApi for FakeApi {
        async fn probe(&self) -> Result<(), ApiError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ApiError::connection("refused"))
            }
        }

        async fn summary(&self) -> Result<SummaryData, ApiError> {
            if self.gated.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            let reply = self.summary.lock().unwrap().clone();
            reply.result("/api/summary")
        }

        async fn health(&self) -> Result<HealthData, ApiError> {
            let reply = self.health.lock().unwrap().clone();
            reply.result("/api/health")
        }
    }

    fn sample_summary() -> SummaryData {
        SummaryData {
            status: "healthy".into(),
            summary: SummaryCounts {
                tables: TableCounts { count: 3, total_rows: 120 },
                collections: CollectionCounts { count: 2, total_documents: 40 },
            },
        }
    }

    fn sample_health() -> HealthData {
        HealthData {
            status: "healthy".into(),
            timestamp: Some(1_700_000_000_000_000_000),
            databases: Databases {
                main: Some(MainDatabaseHealth {
                    status: "connected".into(),
                    tables: Some(3),
                    error: None,
                }),
                vector: Some(VectorDatabaseHealth {
                    status: "connected".into(),
                    collections: Some(2),
                    error: None,
                }),
            },
        }
    }

    fn poller(api: &Arc<FakeApi>) -> Poller {
        Poller::new(api.clone(), PollerOptions::default())
    }

    #[tokio::test]
    async fn test_probe_failure_sets_fixed_message() {
        let api = FakeApi::healthy();
        api.set_reachable(false);
        let poller = poller(&api);

        poller.refresh_now().await;

        let state = poller.state();
        assert!(!state.loading);
        assert_eq!(
            state.connection_error.as_deref(),
            Some("API server is not running. Please start the backend server on port 8000.")
        );
        assert!(state.summary.is_none());
        assert!(state.health.is_none());
        assert_eq!(state.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_successful_cycle_reflects_payloads() {
        let api = FakeApi::healthy();
        let poller = poller(&api);

        poller.refresh_now().await;

        let state = poller.state();
        assert!(!state.loading);
        assert!(state.connection_error.is_none());
        assert_eq!(state.summary, Some(sample_summary()));
        assert_eq!(state.health, Some(sample_health()));
        assert!(matches!(state.phase(), Phase::Ready(_)));
    }

    #[tokio::test]
    async fn test_health_data_error_keeps_previous_health() {
        let api = FakeApi::healthy();
        api.set_health(Reply::DataError);
        let poller = poller(&api);

        // First cycle: nothing to keep.
        poller.refresh_now().await;
        let state = poller.state();
        assert_eq!(state.summary, Some(sample_summary()));
        assert!(state.health.is_none());
        assert!(state.connection_error.is_none());

        // Good health, then a bad one: previous value survives.
        api.set_health(Reply::Ok(sample_health()));
        poller.shared.background_cycle().await;
        api.set_health(Reply::DataError);
        let mut newer = sample_summary();
        newer.summary.tables.count = 4;
        api.set_summary(Reply::Ok(newer.clone()));
        poller.shared.background_cycle().await;

        let state = poller.state();
        assert_eq!(state.summary, Some(newer));
        assert_eq!(state.health, Some(sample_health()));
        assert!(state.connection_error.is_none());
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn test_connection_loss_keeps_last_known_good() {
        let api = FakeApi::healthy();
        let poller = poller(&api);
        poller.refresh_now().await;

        api.set_reachable(false);
        poller.shared.background_cycle().await;

        let state = poller.state();
        assert!(state.connection_error.is_some());
        assert_eq!(state.summary, Some(sample_summary()));
        assert_eq!(state.health, Some(sample_health()));
        match state.phase() {
            Phase::Disconnected { last, .. } => assert!(last.is_some()),
            other => panic!("unexpected phase: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_error_uses_its_message() {
        let api = FakeApi::healthy();
        let poller = poller(&api);
        poller.refresh_now().await;

        api.set_summary(Reply::Ok(SummaryData::default()));
        api.set_health(Reply::ConnectionError("Unable to connect to API server"));
        poller.shared.background_cycle().await;

        let state = poller.state();
        assert_eq!(state.connection_error.as_deref(), Some("Unable to connect to API server"));
        // Neither half is applied when the backend dropped mid-cycle.
        assert_eq!(state.summary, Some(sample_summary()));
        assert_eq!(state.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_background_recovery_clears_error() {
        let api = FakeApi::healthy();
        api.set_reachable(false);
        let poller = poller(&api);
        poller.refresh_now().await;
        assert!(poller.state().connection_error.is_some());

        api.set_reachable(false);
        poller.shared.background_cycle().await;
        assert!(poller.state().connection_error.is_some());

        api.set_reachable(true);
        poller.shared.background_cycle().await;

        let state = poller.state();
        assert!(state.connection_error.is_none());
        assert!(!state.loading);
        assert!(matches!(state.phase(), Phase::Ready(_)));
    }

    #[tokio::test]
    async fn test_background_cycle_never_sets_loading() {
        let api = FakeApi::healthy();
        let poller = Arc::new(poller(&api));
        poller.refresh_now().await;
        assert!(!poller.state().loading);

        api.gated.store(true, Ordering::SeqCst);
        let bg = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.shared.background_cycle().await })
        };

        api.entered.notified().await;
        assert!(!poller.state().loading);

        api.gate.notify_one();
        bg.await.unwrap();
        assert!(!poller.state().loading);
    }

    #[tokio::test]
    async fn test_foreground_cycle_sets_loading_while_in_flight() {
        let api = FakeApi::healthy();
        api.set_reachable(false);
        let poller = Arc::new(poller(&api));
        poller.refresh_now().await;
        assert!(poller.state().connection_error.is_some());

        api.set_reachable(true);
        api.gated.store(true, Ordering::SeqCst);
        let fg = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh_now().await })
        };

        api.entered.notified().await;
        let mid = poller.state();
        assert!(mid.loading);
        assert!(mid.connection_error.is_none());

        api.gate.notify_one();
        fg.await.unwrap();
        assert!(!poller.state().loading);
    }

    #[tokio::test]
    async fn test_teardown_discards_in_flight_result() {
        let api = FakeApi::healthy();
        let poller = Arc::new(poller(&api));
        let mut rx = poller.subscribe();

        api.gated.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&poller.shared);
        let task = tokio::spawn(async move { shared.foreground_cycle().await });

        api.entered.notified().await;
        poller.shutdown();
        let before = rx.borrow_and_update().clone();

        api.gate.notify_one();
        task.await.unwrap();

        assert!(!rx.has_changed().unwrap());
        assert_eq!(poller.state(), before);
        assert!(poller.state().summary.is_none());
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_refresh_waits_for_in_flight_background_cycle() {
        let api = FakeApi::healthy();
        let poller = Arc::new(poller(&api));
        poller.refresh_now().await;
        assert_eq!(api.probes(), 1);

        api.gated.store(true, Ordering::SeqCst);
        let bg = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.shared.background_cycle().await })
        };
        api.entered.notified().await;

        let fg = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh_now().await })
        };
        tokio::task::yield_now().await;
        // Queued behind the background cycle, not interleaved with it.
        assert_eq!(api.probes(), 2);
        assert!(!poller.state().loading);

        api.gated.store(false, Ordering::SeqCst);
        api.gate.notify_one();
        bg.await.unwrap();
        fg.await.unwrap();

        assert_eq!(api.probes(), 3);
        let state = poller.state();
        assert!(!state.loading);
        assert_eq!(state.summary, Some(sample_summary()));
        assert_eq!(state.health, Some(sample_health()));
    }

    #[tokio::test]
    async fn test_background_tick_skipped_while_cycle_in_flight() {
        let api = FakeApi::healthy();
        let poller = Arc::new(poller(&api));

        api.gated.store(true, Ordering::SeqCst);
        let fg = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh_now().await })
        };
        api.entered.notified().await;
        assert_eq!(api.probes(), 1);

        poller.shared.background_cycle().await;
        assert_eq!(api.probes(), 1);

        api.gate.notify_one();
        fg.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_runs_immediately_then_on_interval() {
        let api = FakeApi::healthy();
        let poller = Poller::mount(api.clone(), PollerOptions::default());

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.probes(), 1);
        assert!(!poller.state().loading);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.probes(), 2);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.probes(), 3);

        poller.shutdown();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.probes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_with_zero_interval_still_polls() {
        let api = FakeApi::healthy();
        let options = PollerOptions {
            interval: Duration::ZERO,
            ..Default::default()
        };
        let poller = Poller::mount(api.clone(), options);

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.probes(), 1);
        let state = poller.state();
        assert!(!state.loading);
        assert_eq!(state.summary, Some(sample_summary()));

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(api.probes(), 2);
        assert!(poller.is_running());
    }

    #[tokio::test]
    async fn test_refresh_publishes_loading_then_data() {
        let api = FakeApi::healthy();
        let poller = poller(&api);
        let mut rx = poller.subscribe();

        api.gated.store(true, Ordering::SeqCst);
        poller.refresh();

        rx.changed().await.unwrap();
        {
            let state = rx.borrow_and_update();
            assert!(state.loading);
            assert!(state.summary.is_none());
        }

        api.gate.notify_one();
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert!(!state.loading);
        assert_eq!(state.summary, Some(sample_summary()));
        assert_eq!(state.health, Some(sample_health()));
        assert_eq!(api.probes(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_sends_no_requests() {
        let api = FakeApi::healthy();
        let poller = poller(&api);
        let mut rx = poller.subscribe();
        poller.shutdown();

        poller.refresh();
        time::sleep(Duration::from_millis(20)).await;

        assert_eq!(api.probes(), 0);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_queued_refresh_skipped_after_shutdown() {
        let api = FakeApi::healthy();
        let poller = Arc::new(poller(&api));

        api.gated.store(true, Ordering::SeqCst);
        let first = {
            let shared = Arc::clone(&poller.shared);
            tokio::spawn(async move { shared.foreground_cycle().await })
        };
        api.entered.notified().await;

        let queued = {
            let shared = Arc::clone(&poller.shared);
            tokio::spawn(async move { shared.foreground_cycle().await })
        };
        tokio::task::yield_now().await;

        poller.shutdown();
        api.gated.store(false, Ordering::SeqCst);
        api.gate.notify_one();
        first.await.unwrap();
        queued.await.unwrap();

        assert_eq!(api.probes(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_is_ignored() {
        let api = FakeApi::healthy();
        let poller = poller(&api);
        poller.shutdown();

        poller.refresh_now().await;
        assert_eq!(api.probes(), 0);
        assert_eq!(poller.state(), PollerState::initial());
    }

    #[test]
    fn test_options_follow_config_port() {
        let config = MonitorConfig {
            api_url: "http://localhost:9123".into(),
            poll_interval_ms: 750,
            ..Default::default()
        };
        let options = PollerOptions::from_config(&config);
        assert_eq!(options.interval, Duration::from_millis(750));
        assert!(options.unreachable_message.ends_with("on port 9123."));
    }
}
