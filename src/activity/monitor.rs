use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ActivityConfig, ActivityPhase, ActivitySource, ActivityState};

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Tasks {
    driver: Option<JoinHandle<()>>,
    idle_timer: Option<JoinHandle<()>>,
    bridges: Vec<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in self
            .driver
            .take()
            .into_iter()
            .chain(self.idle_timer.take())
            .chain(self.bridges.drain(..))
        {
            handle.abort();
        }
    }
}

struct Inner {
    config: ActivityConfig,
    state: watch::Sender<ActivityState>,
    on_warning: Mutex<Option<Hook>>,
    on_idle: Mutex<Option<Hook>>,
    sources: Mutex<Vec<Arc<dyn ActivitySource>>>,
    tasks: Mutex<Tasks>,
}

fn hook(slot: &Mutex<Option<Hook>>) -> Option<Hook> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

impl Inner {
    fn tasks(&self) -> std::sync::MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_activity(&self) {
        let now = Instant::now();
        let mut previous = ActivityPhase::Active;
        self.state.send_if_modified(|state| {
            previous = state.phase;
            if state.phase == ActivityPhase::Idle {
                return false;
            }
            state.last_activity_at = now;
            state.phase = ActivityPhase::Active;
            previous != ActivityPhase::Active
        });

        if previous == ActivityPhase::Warning {
            if let Some(timer) = self.tasks().idle_timer.take() {
                timer.abort();
            }
            log::debug!(
                target: "warden::activity",
                "msg=\"activity during warning, back to active\"",
            );
        }
    }

    fn enter_warning(self: &Arc<Self>, now: Instant) -> bool {
        let warning_after = self.config.warning_after();
        let entered = self.state.send_if_modified(|state| {
            if state.phase == ActivityPhase::Active
                && now >= state.last_activity_at + warning_after
            {
                state.phase = ActivityPhase::Warning;
                return true;
            }
            false
        });

        if entered {
            log::info!(
                target: "warden::activity",
                "msg=\"idle warning\", remaining_secs={}",
                self.config.warning_window.as_secs()
            );
            self.arm_idle_timer();
            if let Some(hook) = hook(&self.on_warning) {
                hook();
            }
        }
        entered
    }

    /// At most one idle timer is pending at a time.
    fn arm_idle_timer(self: &Arc<Self>) {
        let mut tasks = self.tasks();
        if tasks.idle_timer.as_ref().is_some_and(|timer| !timer.is_finished()) {
            return;
        }

        let deadline = self.state.borrow().last_activity_at + self.config.idle_timeout;
        let weak = Arc::downgrade(self);
        tasks.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.enter_idle(Instant::now());
            }
        }));
    }

    fn enter_idle(&self, now: Instant) -> bool {
        let idle_timeout = self.config.idle_timeout;
        let fired = self.state.send_if_modified(|state| {
            if state.phase == ActivityPhase::Warning
                && now >= state.last_activity_at + idle_timeout
            {
                state.phase = ActivityPhase::Idle;
                return true;
            }
            false
        });

        if fired {
            log::info!(target: "warden::activity", "msg=\"idle timeout reached\"");
            if let Some(hook) = hook(&self.on_idle) {
                hook();
            }
        }
        fired
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}

async fn drive(weak: Weak<Inner>) {
    loop {
        let next_check = {
            let Some(inner) = weak.upgrade() else { return };
            let now = Instant::now();
            let state = *inner.state.borrow();

            match state.phase {
                ActivityPhase::Idle => return,
                ActivityPhase::Active => {
                    if inner.enter_warning(now) {
                        continue;
                    }
                    let warn_at = state.last_activity_at + inner.config.warning_after();
                    warn_at.min(now + inner.config.check_interval)
                }
                ActivityPhase::Warning => {
                    if inner.enter_idle(now) {
                        return;
                    }
                    now + inner.config.check_interval
                }
            }
        };
        tokio::time::sleep_until(next_check).await;
    }
}

fn spawn_bridge(inner: &Arc<Inner>, source: &dyn ActivitySource) -> JoinHandle<()> {
    let mut signals = source.subscribe();
    let weak = Arc::downgrade(inner);

    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
            let Some(inner) = weak.upgrade() else { break };
            inner.record_activity();
        }
    })
}

/// Idle detection state machine.
///
/// Transitions happen exactly at their deadlines: the driver sleeps until
/// the earlier of the warning deadline and the next periodic check, and a
/// dedicated timer moves `Warning` to `Idle`. The idle hook runs once per
/// start.
///
/// Must be started from within a tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// use warden::activity::{ActivityConfig, ActivityMonitor};
///
/// let monitor = ActivityMonitor::new(ActivityConfig::default());
/// monitor.on_idle(|| println!("signing out"));
/// monitor.start();
/// ```
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<Inner>,
}

impl ActivityMonitor {
    pub fn new(config: ActivityConfig) -> Self {
        let (state, _) = watch::channel(ActivityState::active_at(Instant::now()));

        Self {
            inner: Arc::new(Inner {
                config,
                state,
                on_warning: Mutex::new(None),
                on_idle: Mutex::new(None),
                sources: Mutex::new(Vec::new()),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.inner.config
    }

    /// Runs when the warning phase starts.
    pub fn on_warning(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Runs when the monitor goes idle.
    pub fn on_idle(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_idle.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Registers an activity source; it is followed while the monitor runs.
    pub fn add_source(&self, source: Arc<dyn ActivitySource>) {
        self.inner
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&source));

        let mut tasks = self.inner.tasks();
        if tasks.driver.is_some() {
            tasks.bridges.push(spawn_bridge(&self.inner, source.as_ref()));
        }
    }

    /// Starts monitoring from a fresh `Active` state.
    ///
    /// Does nothing while the monitor is already running.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks();
        if tasks.driver.as_ref().is_some_and(|driver| !driver.is_finished()) {
            return;
        }
        tasks.abort_all();

        self.inner.state.send_replace(ActivityState::active_at(Instant::now()));
        tasks.driver = Some(tokio::spawn(drive(Arc::downgrade(&self.inner))));

        let sources = self.inner.sources.lock().unwrap_or_else(PoisonError::into_inner);
        for source in sources.iter() {
            tasks.bridges.push(spawn_bridge(&self.inner, source.as_ref()));
        }

        log::debug!(
            target: "warden::activity",
            "msg=\"activity monitor started\", idle_timeout_secs={}, sources={}",
            self.inner.config.idle_timeout.as_secs(),
            sources.len()
        );
    }

    /// Cancels the driver, any pending idle timer and source subscriptions.
    pub fn stop(&self) {
        self.inner.tasks().abort_all();
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .tasks()
            .driver
            .as_ref()
            .is_some_and(|driver| !driver.is_finished())
    }

    /// Applies an activity signal immediately.
    ///
    /// Ignored once the monitor is idle.
    pub fn record_activity(&self) {
        self.inner.record_activity();
    }

    pub fn state(&self) -> ActivityState {
        *self.inner.state.borrow()
    }

    pub fn phase(&self) -> ActivityPhase {
        self.inner.state.borrow().phase
    }

    /// Time left before the idle deadline; zero once it has passed.
    pub fn time_until_idle(&self) -> Duration {
        let deadline = self.inner.state.borrow().last_activity_at + self.inner.config.idle_timeout;
        deadline.saturating_duration_since(Instant::now())
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivityState> {
        self.inner.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::activity::{ActivityChannel, ActivitySignal};

    const MINUTE: Duration = Duration::from_secs(60);
    const SECOND: Duration = Duration::from_secs(1);

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(by: Duration) {
        tokio::time::advance(by).await;
        settle().await;
    }

    fn monitor_with_counters() -> (ActivityMonitor, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let monitor = ActivityMonitor::new(ActivityConfig::default());
        let warnings = Arc::new(AtomicUsize::new(0));
        let idles = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&warnings);
        monitor.on_warning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&idles);
        monitor.on_idle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        (monitor, warnings, idles)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_at_exact_deadlines() {
        let (monitor, warnings, idles) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(25 * MINUTE - SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Active);

        advance(SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);

        advance(5 * MINUTE - SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);
        assert_eq!(idles.load(Ordering::SeqCst), 0);

        advance(SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Idle);
        assert_eq!(idles.load(Ordering::SeqCst), 1);

        advance(60 * MINUTE).await;
        assert_eq!(idles.load(Ordering::SeqCst), 1);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_warning() {
        let (monitor, warnings, _) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(20 * MINUTE).await;
        monitor.record_activity();
        assert_eq!(monitor.time_until_idle(), 30 * MINUTE);

        advance(24 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Active);
        assert_eq!(warnings.load(Ordering::SeqCst), 0);

        advance(MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_during_warning_cancels_idle_timer() {
        let (monitor, _, idles) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(26 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);

        monitor.record_activity();
        assert_eq!(monitor.phase(), ActivityPhase::Active);

        // past the cancelled idle deadline
        advance(5 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Active);
        assert_eq!(idles.load(Ordering::SeqCst), 0);

        // new idle deadline is 30 minutes after the activity at 26:00
        advance(25 * MINUTE - SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);
        assert_eq!(idles.load(Ordering::SeqCst), 0);
        advance(SECOND).await;
        assert_eq!(monitor.phase(), ActivityPhase::Idle);
        assert_eq!(idles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_after_idle_is_ignored() {
        let (monitor, _, idles) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(30 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Idle);

        monitor.record_activity();
        assert_eq!(monitor.phase(), ActivityPhase::Idle);
        assert_eq!(idles.load(Ordering::SeqCst), 1);

        monitor.start();
        assert_eq!(monitor.phase(), ActivityPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (monitor, warnings, idles) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(10 * MINUTE).await;
        monitor.start();
        settle().await;

        // second start did not reset the clock
        advance(15 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);

        advance(5 * MINUTE).await;
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert_eq!(idles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_everything() {
        let (monitor, _, idles) = monitor_with_counters();
        monitor.start();
        settle().await;

        advance(26 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);

        monitor.stop();
        assert!(!monitor.is_running());
        advance(60 * MINUTE).await;

        assert_eq!(monitor.phase(), ActivityPhase::Warning);
        assert_eq!(idles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_signals_count_as_activity() {
        let (monitor, _, _) = monitor_with_counters();
        let input = ActivityChannel::new();
        monitor.add_source(Arc::new(input.clone()));
        monitor.start();
        settle().await;

        advance(20 * MINUTE).await;
        assert_eq!(input.notify(ActivitySignal::KeyPress), 1);
        settle().await;

        advance(6 * MINUTE).await;
        assert_eq!(monitor.phase(), ActivityPhase::Active);

        monitor.stop();
        settle().await;
        assert_eq!(input.notify(ActivitySignal::Click), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_phase_changes() {
        let (monitor, _, _) = monitor_with_counters();
        let mut states = monitor.subscribe();
        monitor.start();
        settle().await;
        states.mark_unchanged();

        advance(25 * MINUTE).await;
        assert!(states.has_changed().unwrap());
        assert_eq!(states.borrow_and_update().phase, ActivityPhase::Warning);

        monitor.record_activity();
        assert_eq!(states.borrow_and_update().phase, ActivityPhase::Active);
    }
}
