//! Periodic sync loop with full-jitter exponential backoff.
//!
//! The loop runs only while the `online`, `visible` and `logged_in` gates are
//! all open. Closing any gate cancels the in-flight iteration (the target
//! finishes the layout it is working on, then stops) and parks the loop
//! without accruing backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Default interval between successful passes.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(30);
/// Default upper bound for the backoff window.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub base_interval: Duration,
    pub max_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(base_interval: Duration, max_interval: Duration) -> Self {
        Self {
            base_interval,
            max_interval: max_interval.max(base_interval),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_INTERVAL, DEFAULT_MAX_INTERVAL)
    }
}

/// Failure counter that turns into the next wait interval.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: SchedulerConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Upper bound of the next interval: `min(max, base * 2^failures)`.
    pub fn ceiling(&self) -> Duration {
        if self.failures == 0 {
            return self.config.base_interval;
        }

        2u32.checked_pow(self.failures)
            .and_then(|factor| self.config.base_interval.checked_mul(factor))
            .map_or(self.config.max_interval, |d| d.min(self.config.max_interval))
    }

    /// The next interval. After a success this is the base interval;
    /// after failures it is drawn uniformly from `[0, ceiling]`.
    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.failures == 0 {
            return self.config.base_interval;
        }
        let ceiling_ms = u64::try_from(self.ceiling().as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.random_range(0..=ceiling_ms))
    }
}

/// External signals the loop is gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncGates {
    pub online: bool,
    pub visible: bool,
    pub logged_in: bool,
}

impl SyncGates {
    pub fn open() -> Self {
        Self {
            online: true,
            visible: true,
            logged_in: true,
        }
    }

    pub fn all_open(&self) -> bool {
        self.online && self.visible && self.logged_in
    }
}

/// Something the scheduler can drive, typically the layout manager.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Runs one pass. Implementations check `cancel` between units of work.
    async fn sync(&self, cancel: CancellationToken) -> Result<(), SyncError>;
}

/// Handle to a running sync loop. Dropping it stops the loop.
pub struct SyncScheduler {
    gates: watch::Sender<SyncGates>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawns the loop on the current tokio runtime.
    pub fn spawn(target: Arc<dyn SyncTarget>, config: SchedulerConfig, gates: SyncGates) -> Self {
        let (gates_tx, gates_rx) = watch::channel(gates);
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_loop(
            target,
            config,
            gates_rx,
            wake.clone(),
            shutdown.clone(),
        ));

        Self {
            gates: gates_tx,
            wake,
            shutdown,
            task: Some(task),
        }
    }

    pub fn gates(&self) -> SyncGates {
        *self.gates.borrow()
    }

    pub fn set_online(&self, online: bool) {
        self.gates.send_modify(|g| g.online = online);
    }

    pub fn set_visible(&self, visible: bool) {
        self.gates.send_modify(|g| g.visible = visible);
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.gates.send_modify(|g| g.logged_in = logged_in);
    }

    /// Cuts the current wait short and syncs now, if the gates allow it.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Stops the loop and waits for the in-flight iteration to wind down.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Sync scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(
    target: Arc<dyn SyncTarget>,
    config: SchedulerConfig,
    mut gates: watch::Receiver<SyncGates>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new(config);

    loop {
        // Park until every gate is open.
        while !gates.borrow_and_update().all_open() {
            tracing::debug!("Sync parked");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                changed = gates.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let iteration = shutdown.child_token();
        let result = {
            let sync = target.sync(iteration.clone());
            tokio::pin!(sync);
            tokio::select! {
                result = &mut sync => result,
                _ = gate_closed(&mut gates) => {
                    iteration.cancel();
                    sync.await
                }
            }
        };

        if shutdown.is_cancelled() {
            return;
        }
        if iteration.is_cancelled() {
            // Interrupted by a gate; no backoff accrues.
            continue;
        }

        match result {
            Ok(()) => backoff.record_success(),
            Err(e) => {
                backoff.record_failure();
                tracing::warn!(failures = backoff.failures(), "{}", e);
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Next sync scheduled");

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
            _ = gate_closed(&mut gates) => {}
        }
    }
}

/// Resolves when any gate flips to closed. Pends forever once the sender is gone.
async fn gate_closed(gates: &mut watch::Receiver<SyncGates>) {
    loop {
        if gates.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if !gates.borrow_and_update().all_open() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct CountingTarget {
        calls: Mutex<Vec<Instant>>,
        fail: bool,
    }

    impl CountingTarget {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SyncTarget for CountingTarget {
        async fn sync(&self, _cancel: CancellationToken) -> Result<(), SyncError> {
            self.calls.lock().unwrap().push(Instant::now());
            if self.fail {
                Err(RemoteError::Network("unreachable".to_string()).into())
            } else {
                Ok(())
            }
        }
    }

    /// Blocks until cancelled, like a pass stuck on a slow layout.
    #[derive(Default)]
    struct BlockingTarget {
        started: AtomicUsize,
        cancelled: AtomicUsize,
    }

    #[async_trait]
    impl SyncTarget for BlockingTarget {
        async fn sync(&self, cancel: CancellationToken) -> Result<(), SyncError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn closed() -> SyncGates {
        SyncGates {
            online: false,
            ..SyncGates::open()
        }
    }

    #[test]
    fn test_backoff_ceiling_grows_to_cap() {
        let mut backoff = Backoff::new(SchedulerConfig::default());
        assert_eq!(backoff.ceiling(), Duration::from_secs(30));

        let mut ceilings = Vec::new();
        for _ in 0..6 {
            backoff.record_failure();
            ceilings.push(backoff.ceiling().as_secs());
        }
        assert_eq!(ceilings, vec![60, 120, 180, 180, 180, 180]);
    }

    #[test]
    fn test_backoff_never_overflows() {
        let mut backoff = Backoff::new(SchedulerConfig::default());
        for _ in 0..100 {
            backoff.record_failure();
        }
        assert_eq!(backoff.ceiling(), DEFAULT_MAX_INTERVAL);
    }

    #[test]
    fn test_backoff_delay_within_jitter_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = Backoff::new(SchedulerConfig::default());
        for _ in 0..5 {
            backoff.record_failure();
            for _ in 0..200 {
                assert!(backoff.next_delay_with(&mut rng) <= backoff.ceiling());
            }
        }
    }

    #[test]
    fn test_success_resets_to_base() {
        let mut backoff = Backoff::new(SchedulerConfig::default());
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();

        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_max_not_below_base() {
        let config = SchedulerConfig::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(config.max_interval, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncs_on_base_interval() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), SyncGates::open());

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(target.count(), 3);

        let calls = target.calls.lock().unwrap().clone();
        assert_eq!(calls[1] - calls[0], Duration::from_secs(30));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(30));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_stay_within_backoff_window() {
        let target = Arc::new(CountingTarget::failing());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), SyncGates::open());

        tokio::time::sleep(Duration::from_secs(1000)).await;
        scheduler.shutdown().await;

        let calls = target.calls.lock().unwrap().clone();
        assert!(calls.len() >= 6);
        for (i, pair) in calls.windows(2).enumerate() {
            let mut backoff = Backoff::new(SchedulerConfig::default());
            for _ in 0..=i {
                backoff.record_failure();
            }
            assert!(pair[1] - pair[0] <= backoff.ceiling());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parks_while_offline() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), closed());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.count(), 0);

        scheduler.set_online(true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(target.count(), 1);

        scheduler.set_visible(false);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.count(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_gate_cancels_iteration() {
        let target = Arc::new(BlockingTarget::default());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), SyncGates::open());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(target.started.load(Ordering::SeqCst), 1);
        assert_eq!(target.cancelled.load(Ordering::SeqCst), 0);

        scheduler.set_logged_in(false);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(target.cancelled.load(Ordering::SeqCst), 1);

        // Parked: no new iteration starts.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.started.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_skips_wait() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), SyncGates::open());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(target.count(), 1);

        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(target.count(), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = SyncScheduler::spawn(target.clone(), SchedulerConfig::default(), SyncGates::open());
        tokio::time::sleep(Duration::from_millis(1)).await;

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(target.count(), 1);
    }
}
