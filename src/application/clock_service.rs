use crate::application::clock_repository::keys;
use crate::application::focus_clock::{FocusClock, FocusSummary};
use crate::domain::models::{ClockSettings, ClockState, SessionMode};
use crate::domain::transition::SessionTransition;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage_events::{ChangeFeed, FeedMessage, StorageSubscription};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

struct DriverHandle {
    epoch: u64,
    task: JoinHandle<()>,
}

// Lock order: clock, then driver.
pub struct ClockService {
    clock: Mutex<FocusClock>,
    driver: Mutex<Option<DriverHandle>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
    tick_period: Duration,
}

impl ClockService {
    pub fn new(clock: FocusClock) -> Result<Arc<Self>, InfraError> {
        Self::with_tick_period(clock, TICK_PERIOD)
    }

    pub fn with_tick_period(clock: FocusClock, tick_period: Duration) -> Result<Arc<Self>, InfraError> {
        let runtime = Handle::try_current().map_err(|error| InfraError::Runtime(error.to_string()))?;
        let service = Arc::new(Self {
            clock: Mutex::new(clock),
            driver: Mutex::new(None),
            listener: Mutex::new(None),
            runtime,
            tick_period,
        });

        // A clock that survived reconciliation still running keeps ticking here.
        let resumed = {
            let clock = service.lock_clock()?;
            clock.state().running.then(|| clock.run_epoch())
        };
        if let Some(epoch) = resumed {
            service.ensure_driver(epoch)?;
        }
        Ok(service)
    }

    pub fn snapshot(&self) -> Result<ClockState, InfraError> {
        Ok(self.lock_clock()?.state().clone())
    }

    pub fn summary(&self) -> Result<FocusSummary, InfraError> {
        Ok(self.lock_clock()?.summary())
    }

    pub fn settings(&self) -> Result<ClockSettings, InfraError> {
        Ok(self.lock_clock()?.settings().clone())
    }

    pub fn is_degraded(&self) -> Result<bool, InfraError> {
        Ok(self.lock_clock()?.is_degraded())
    }

    pub fn start(self: &Arc<Self>) -> Result<ClockState, InfraError> {
        let mut clock = self.lock_clock()?;
        let epoch = clock.start();
        self.ensure_driver(epoch)?;
        Ok(clock.state().clone())
    }

    pub fn pause(&self) -> Result<ClockState, InfraError> {
        self.stop_with(|clock| clock.pause())
    }

    pub fn reset(&self) -> Result<ClockState, InfraError> {
        self.stop_with(|clock| clock.reset())
    }

    pub fn switch_mode(&self, mode: SessionMode) -> Result<ClockState, InfraError> {
        self.stop_with(|clock| clock.switch_mode(mode))
    }

    pub fn set_countdown(&self, is_countdown: bool) -> Result<ClockState, InfraError> {
        self.stop_with(|clock| clock.set_countdown(is_countdown))
    }

    pub fn skip(&self) -> Result<(SessionTransition, ClockState), InfraError> {
        let mut clock = self.lock_clock()?;
        let transition = clock.skip();
        self.stop_driver()?;
        Ok((transition, clock.state().clone()))
    }

    pub fn update_settings(&self, settings: ClockSettings) -> Result<ClockState, InfraError> {
        settings.validate().map_err(InfraError::InvalidConfig)?;
        let mut clock = self.lock_clock()?;
        clock.update_settings(settings);
        Ok(clock.state().clone())
    }

    pub fn adopt_persisted(self: &Arc<Self>) -> Result<bool, InfraError> {
        let mut clock = self.lock_clock()?;
        let changed = clock.adopt_persisted();
        if clock.state().running {
            self.ensure_driver(clock.run_epoch())?;
        } else {
            self.stop_driver()?;
        }
        Ok(changed)
    }

    /// Starts listening for saves from other contexts. Only the first call
    /// installs a listener; later calls return `false`.
    pub fn install_cross_tab_listener(
        self: &Arc<Self>,
        feed: &dyn ChangeFeed,
    ) -> Result<bool, InfraError> {
        let mut listener = self
            .listener
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("listener: {error}")))?;
        if listener.is_some() {
            return Ok(false);
        }
        let subscription = feed.subscribe();
        *listener = Some(
            self.runtime
                .spawn(listen_for_changes(Arc::downgrade(self), subscription)),
        );
        Ok(true)
    }

    pub fn shutdown(&self) {
        if let Ok(mut driver) = self.driver.lock() {
            if let Some(handle) = driver.take() {
                handle.task.abort();
            }
        }
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(task) = listener.take() {
                task.abort();
            }
        }
    }

    fn stop_with(&self, apply: impl FnOnce(&mut FocusClock)) -> Result<ClockState, InfraError> {
        let mut clock = self.lock_clock()?;
        apply(&mut clock);
        self.stop_driver()?;
        Ok(clock.state().clone())
    }

    fn tick_if_current(&self, epoch: u64) -> bool {
        let Ok(mut clock) = self.lock_clock() else {
            return false;
        };
        if clock.run_epoch() != epoch || !clock.state().running {
            return false;
        }
        clock.tick();
        clock.state().running
    }

    fn ensure_driver(self: &Arc<Self>, epoch: u64) -> Result<(), InfraError> {
        let mut driver = self.lock_driver()?;
        if let Some(current) = driver.as_ref() {
            if current.epoch == epoch && !current.task.is_finished() {
                return Ok(());
            }
            current.task.abort();
        }
        let task = self
            .runtime
            .spawn(drive_ticks(Arc::downgrade(self), epoch, self.tick_period));
        *driver = Some(DriverHandle { epoch, task });
        debug!(epoch, "tick driver started");
        Ok(())
    }

    fn stop_driver(&self) -> Result<(), InfraError> {
        if let Some(handle) = self.lock_driver()?.take() {
            handle.task.abort();
            debug!(epoch = handle.epoch, "tick driver stopped");
        }
        Ok(())
    }

    fn lock_clock(&self) -> Result<MutexGuard<'_, FocusClock>, InfraError> {
        self.clock
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("clock: {error}")))
    }

    fn lock_driver(&self) -> Result<MutexGuard<'_, Option<DriverHandle>>, InfraError> {
        self.driver
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("tick driver: {error}")))
    }
}

impl Drop for ClockService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drive_ticks(weak: Weak<ClockService>, epoch: u64, period: Duration) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(service) = weak.upgrade() else {
            return;
        };
        if !service.tick_if_current(epoch) {
            return;
        }
    }
}

async fn listen_for_changes(weak: Weak<ClockService>, mut subscription: StorageSubscription) {
    while let Some(message) = subscription.next().await {
        let relevant = match &message {
            FeedMessage::Changed(event) => event.key == keys::LAST_UPDATE_MS,
            FeedMessage::Lagged(missed) => {
                warn!(missed, "missed storage notifications; reloading clock");
                true
            }
        };
        if !relevant {
            continue;
        }
        let Some(service) = weak.upgrade() else {
            return;
        };
        if let Err(error) = service.adopt_persisted() {
            warn!(%error, "failed to adopt clock state from another context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock_repository::{ClockStateRepository, NowProvider};
    use crate::application::focus_clock::EventJournal;
    use crate::infrastructure::kv_store::{InMemoryKeyValueStore, KeyValueStore};
    use crate::infrastructure::storage_events::StorageChannel;
    use chrono::{Local, TimeZone};

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            Local
                .with_ymd_and_hms(2026, 2, 16, 12, 0, 0)
                .single()
                .expect("unambiguous local time")
        })
    }

    // Wall time that follows tokio's clock, so paused tests can auto-advance.
    fn tokio_now() -> NowProvider {
        let origin = Instant::now();
        let base = Local
            .with_ymd_and_hms(2026, 2, 16, 12, 0, 0)
            .single()
            .expect("unambiguous local time");
        Arc::new(move || {
            base + chrono::Duration::from_std(Instant::now().duration_since(origin))
                .expect("elapsed fits")
        })
    }

    fn clock_on(
        store: Arc<dyn KeyValueStore>,
        settings: ClockSettings,
        now: NowProvider,
    ) -> FocusClock {
        let repository = ClockStateRepository::new(store).with_now_provider(now);
        FocusClock::open(repository, settings, Arc::new(EventJournal::default()))
    }

    fn service_on(store: Arc<dyn KeyValueStore>, now: NowProvider) -> Arc<ClockService> {
        ClockService::new(clock_on(store, ClockSettings::default(), now)).expect("service")
    }

    fn single_service() -> Arc<ClockService> {
        service_on(Arc::new(InMemoryKeyValueStore::default()), tokio_now())
    }

    async fn settle() {
        time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn driver_ticks_once_per_second() {
        let service = single_service();
        service.start().expect("start");

        time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(service.snapshot().expect("snapshot").seconds, 1_497);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_cancels_pending_ticks() {
        let service = single_service();
        service.start().expect("start");
        time::sleep(Duration::from_millis(2_500)).await;

        let paused = service.pause().expect("pause");
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(paused.seconds, 1_498);
        assert_eq!(service.snapshot().expect("snapshot"), paused);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tick_never_clobbers_a_reset() {
        let service = single_service();
        service.start().expect("start");
        time::sleep(Duration::from_millis(1_999)).await;

        let reset = service.reset().expect("reset");
        time::sleep(Duration::from_secs(3)).await;

        assert_eq!(reset.seconds, 1_500);
        assert!(!reset.running);
        assert_eq!(service.snapshot().expect("snapshot").seconds, 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_pause_runs_a_single_driver() {
        let service = single_service();
        service.start().expect("start");
        time::sleep(Duration::from_millis(1_500)).await;
        service.pause().expect("pause");
        service.start().expect("restart");
        time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(service.snapshot().expect("snapshot").seconds, 1_497);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_runs_focus_to_break() {
        let service = single_service();
        service
            .update_settings(ClockSettings {
                focus_minutes: 1,
                ..ClockSettings::default()
            })
            .expect("settings");
        assert_eq!(service.snapshot().expect("snapshot").seconds, 60);

        service.start().expect("start");
        time::sleep(Duration::from_secs(65)).await;

        let state = service.snapshot().expect("snapshot");
        assert_eq!(state.mode, SessionMode::Break);
        assert_eq!(state.completed_sessions, 1);
        assert_eq!(state.seconds, 5 * 60);
        assert!(!state.running);
        assert_eq!(service.summary().expect("summary").daily_focus_minutes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_adopts_saves_from_another_tab() {
        let channel = StorageChannel::new(Arc::new(InMemoryKeyValueStore::default()));
        let tab_a = channel.open_context();
        let tab_b = channel.open_context();
        let now = tokio_now();
        let service_a = service_on(Arc::new(tab_a), now.clone());
        let service_b = service_on(Arc::new(tab_b.clone()), now);

        assert!(service_b.install_cross_tab_listener(&tab_b).expect("install"));
        assert!(!service_b.install_cross_tab_listener(&tab_b).expect("second install"));

        service_a.switch_mode(SessionMode::LongBreak).expect("switch");
        service_a.start().expect("start");
        settle().await;
        assert!(service_b.snapshot().expect("snapshot").running);
        assert_eq!(
            service_b.snapshot().expect("snapshot").mode,
            SessionMode::LongBreak
        );

        let paused = service_a.pause().expect("pause");
        settle().await;
        assert_eq!(service_b.snapshot().expect("snapshot"), paused);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_phase_contexts_share_one_countdown() {
        let channel = StorageChannel::new(Arc::new(InMemoryKeyValueStore::default()));
        let tab_a = channel.open_context();
        let tab_b = channel.open_context();
        let now = tokio_now();
        let service_a = service_on(Arc::new(tab_a.clone()), now.clone());
        service_a.start().expect("start");

        // B loads the running clock half a second later, so its driver fires
        // between A's ticks.
        time::sleep(Duration::from_millis(500)).await;
        let service_b = service_on(Arc::new(tab_b.clone()), now);
        assert!(service_a.install_cross_tab_listener(&tab_a).expect("install a"));
        assert!(service_b.install_cross_tab_listener(&tab_b).expect("install b"));
        assert!(service_b.snapshot().expect("snapshot").running);

        time::sleep(Duration::from_millis(3_200)).await;

        assert_eq!(service_a.snapshot().expect("snapshot a").seconds, 1_497);
        assert_eq!(service_b.snapshot().expect("snapshot b").seconds, 1_497);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn two_running_contexts_follow_real_time() {
        let channel = StorageChannel::new(Arc::new(InMemoryKeyValueStore::default()));
        let tab_a = channel.open_context();
        let tab_b = channel.open_context();
        let now: NowProvider = Arc::new(Local::now);
        let service_a = service_on(Arc::new(tab_a.clone()), now.clone());
        service_a.start().expect("start");

        time::sleep(Duration::from_millis(500)).await;
        let service_b = service_on(Arc::new(tab_b.clone()), now);
        service_a.install_cross_tab_listener(&tab_a).expect("install a");
        service_b.install_cross_tab_listener(&tab_b).expect("install b");

        time::sleep(Duration::from_millis(3_200)).await;

        // Three seconds of wall time; a double-speed clock would be near 1_494.
        for service in [&service_a, &service_b] {
            let seconds = service.snapshot().expect("snapshot").seconds;
            assert!((1_496..=1_498).contains(&seconds), "seconds = {seconds}");
        }
    }

    #[tokio::test]
    async fn update_settings_rejects_zero_durations() {
        let service = single_service();
        let result = service.update_settings(ClockSettings {
            break_minutes: 0,
            ..ClockSettings::default()
        });
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn construction_requires_a_runtime() {
        let clock = clock_on(
            Arc::new(InMemoryKeyValueStore::default()),
            ClockSettings::default(),
            fixed_now(),
        );
        assert!(matches!(
            ClockService::new(clock),
            Err(InfraError::Runtime(_))
        ));
    }
}
