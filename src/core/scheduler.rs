//! Cancellable timers driving periodic refresh and debounced actions.

use crate::core::engine::{EngineState, FundStore};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error};

type Tick = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A spawned timer loop plus the signal that stops it.
///
/// Stopping ends the loop at its next wait. Work already running in the
/// loop is never aborted.
struct Timer {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Timer {
    fn stop(self) {
        // Err only means the loop has already exited
        if self.stop.send(()).is_err() {
            debug!("Timer already finished");
        }
    }
}

#[derive(Default)]
struct TimerSlot(Mutex<Option<Timer>>);

impl TimerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Timer>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a new timer, stopping the previous one.
    fn replace(&self, timer: Timer) {
        let previous = self.lock().replace(timer);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    fn stop(&self) -> bool {
        let current = self.lock().take();
        current.map(Timer::stop).is_some()
    }

    fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|timer| !timer.task.is_finished())
    }
}

/// Invokes a tick callback at most once per interval while armed.
///
/// The first tick fires one full interval after arming. Re-arming or
/// cancelling stops future ticks only; a tick in progress runs to
/// completion, and `cancel` may be called from inside a tick.
pub struct RefreshScheduler {
    tick: Tick,
    timer: TimerSlot,
}

impl RefreshScheduler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tick: Tick = Arc::new(move || callback().boxed());
        Self {
            tick,
            timer: TimerSlot::default(),
        }
    }

    /// Cancels any running timer, then arms a new one with `period`.
    pub fn arm(&self, period: Duration) {
        let period = period.max(Duration::from_millis(1));
        let tick = Arc::clone(&self.tick);
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = timer.tick() => {}
                }
                debug!(?period, "Scheduled tick");
                tick().await;
            }
            debug!(?period, "Timer stopped");
        });
        self.timer.replace(Timer { stop, task });
    }

    pub fn cancel(&self) {
        if self.timer.stop() {
            debug!("Scheduler cancelled");
        }
    }

    /// Applies an enable flag and interval in one step.
    pub fn configure(&self, enabled: bool, period: Duration) {
        self.cancel();
        if enabled {
            self.arm(period);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_running()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs an action after a quiet period; each `arm` supersedes the last.
///
/// Only the waiting period is cancellable. Once the action has started it
/// runs to completion.
#[derive(Default)]
pub struct Debouncer {
    timer: TimerSlot,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<Fut>(&self, delay: Duration, action: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stopped => return,
                _ = tokio::time::sleep(delay) => {}
            }
            action.await;
        });
        self.timer.replace(Timer { stop, task });
    }

    pub fn cancel(&self) {
        self.timer.stop();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn refresh_settings(state: &EngineState) -> (bool, u64) {
    (state.auto_refresh_enabled, state.refresh_interval_ms)
}

/// Keeps a `RefreshScheduler` in step with the store's refresh settings.
pub struct AutoRefresh {
    task: JoinHandle<()>,
}

impl AutoRefresh {
    /// Ticks call `refresh_funds(false)`, so they are served from the
    /// valuation cache while it is fresh.
    pub fn spawn(store: Arc<FundStore>) -> Self {
        let mut states = store.subscribe();
        let scheduler = {
            let store = Arc::clone(&store);
            RefreshScheduler::new(move || {
                let store = Arc::clone(&store);
                async move {
                    if let Err(e) = store.refresh_funds(false).await {
                        error!(error = %e, "Scheduled refresh failed");
                    }
                }
            })
        };
        // Only the receiver is needed from here on
        drop(store);

        let task = tokio::spawn(async move {
            let mut current = refresh_settings(&states.borrow_and_update());
            scheduler.configure(current.0, Duration::from_millis(current.1));
            debug!(enabled = current.0, interval_ms = current.1, "Auto refresh configured");

            while states.changed().await.is_ok() {
                let next = refresh_settings(&states.borrow_and_update());
                if next != current {
                    current = next;
                    scheduler.configure(current.0, Duration::from_millis(current.1));
                    debug!(enabled = current.0, interval_ms = current.1, "Auto refresh reconfigured");
                }
            }
            scheduler.cancel();
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TtlCache;
    use crate::core::engine::PersistedState;
    use crate::core::error::FetchError;
    use crate::core::fund::{FundProvider, FundRecord, HistoryPoint, HistoryRange, SearchResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting_scheduler() -> (Arc<AtomicUsize>, RefreshScheduler) {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::new({
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        (count, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let (count, scheduler) = counting_scheduler();
        scheduler.configure(true, Duration::from_millis(1000));

        sleep(Duration::from_millis(999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_pending_ticks() {
        let (count, scheduler) = counting_scheduler();
        scheduler.configure(true, Duration::from_millis(1000));
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.configure(false, Duration::from_millis(1000));
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_restarts_the_interval() {
        let (count, scheduler) = counting_scheduler();
        scheduler.configure(true, Duration::from_millis(1000));
        sleep(Duration::from_millis(800)).await;

        scheduler.configure(true, Duration::from_millis(1000));
        sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_inside_tick() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<RefreshScheduler>>>> = Arc::new(Mutex::new(None));
        let handle = Arc::new(RefreshScheduler::new({
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            let slot = Arc::clone(&slot);
            move || {
                let started = Arc::clone(&started);
                let finished = Arc::clone(&finished);
                let slot = Arc::clone(&slot);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let me = slot.lock().unwrap().clone();
                    if let Some(me) = me {
                        me.cancel();
                    }
                    // The rest of the tick still runs after cancelling
                    sleep(Duration::from_millis(1)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
        *slot.lock().unwrap() = Some(Arc::clone(&handle));

        handle.arm(Duration::from_millis(100));
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!handle.is_armed());

        // Break the reference cycle through the tick closure
        slot.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_lets_running_tick_finish() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::new({
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            move || {
                let started = Arc::clone(&started);
                let finished = Arc::clone(&finished);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(500)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        scheduler.configure(true, Duration::from_millis(1000));
        sleep(Duration::from_millis(1200)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        scheduler.configure(true, Duration::from_secs(30));
        sleep(Duration::from_millis(800)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // The old timer is gone; the new one has not fired yet
        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_armed());

        sleep(Duration::from_secs(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_action_survives_cancel_once_started() {
        let finished = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new();

        let counter = Arc::clone(&finished);
        debouncer.arm(Duration::from_millis(300), async move {
            sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(350)).await;
        debouncer.cancel();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_runs_only_the_last_action() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new();

        for keyword in ["h", "hu", "hua"] {
            let fired = Arc::clone(&fired);
            debouncer.arm(Duration::from_millis(300), async move {
                fired.lock().unwrap().push(keyword);
            });
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_millis(300)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["hua"]);

        let fired_clone = Arc::clone(&fired);
        debouncer.arm(Duration::from_millis(300), async move {
            fired_clone.lock().unwrap().push("cancelled");
        });
        debouncer.cancel();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FundProvider for CountingProvider {
        async fn fetch_valuation(&self, code: &str) -> Result<FundRecord, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FundRecord::new(code, "Fund", None, 1.0, 0.1, "15:00"))
        }

        async fn search(&self, _keyword: &str) -> Result<Vec<SearchResult>, FetchError> {
            Ok(vec![])
        }

        async fn fetch_history(
            &self,
            _code: &str,
            _range: HistoryRange,
        ) -> Result<Vec<HistoryPoint>, FetchError> {
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_follows_store_settings() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(FundStore::new(
            Arc::clone(&provider) as Arc<dyn FundProvider>,
            // Zero TTL so every tick reaches the provider
            TtlCache::new("funds", Duration::ZERO),
            EngineState::from_persisted(PersistedState {
                watch_list: vec![FundRecord::new("000001", "Fund", None, 1.0, 0.0, "")],
                auto_refresh: true,
                refresh_interval: 1000,
            }),
        ));

        let auto = AutoRefresh::spawn(Arc::clone(&store));
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        store.set_auto_refresh(false);
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        store.set_refresh_interval(500).unwrap();
        store.set_auto_refresh(true);
        sleep(Duration::from_millis(1200)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);

        auto.stop();
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }
}
