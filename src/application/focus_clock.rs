use crate::application::clock_repository::ClockStateRepository;
use crate::domain::drift::{reconcile_drift, roll_over_day, DriftOutcome};
use crate::domain::models::{ClockEvent, ClockSettings, ClockState, SessionMode};
use crate::domain::ticking::{advance_one_second, TickStep};
use crate::infrastructure::error::InfraError;
use crate::domain::transition::{complete_session, enter_mode, skip_session, SessionTransition};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const EVENT_JOURNAL_CAPACITY: usize = 128;

pub trait ClockObserver: Send + Sync {
    fn on_session_complete(&self, _mode: SessionMode) {}
    fn on_minute_boundary(&self, _total_minutes: u32) {}
    fn on_mode_change(&self, _new_mode: SessionMode) {}
    fn on_reward(&self, _fish: u32) {}
    fn on_daily_goal_reached(&self, _minutes: u32) {}
}

#[derive(Debug, Default)]
pub struct EventJournal {
    events: Mutex<VecDeque<ClockEvent>>,
}

impl EventJournal {
    pub fn drain(&self) -> Result<Vec<ClockEvent>, InfraError> {
        let mut events = self
            .events
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("event journal: {error}")))?;
        Ok(events.drain(..).collect())
    }

    fn record(&self, event: ClockEvent) {
        info!(?event, "clock event");
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, ?event, "event journal lock poisoned; event not kept");
                return;
            }
        };
        if events.len() == EVENT_JOURNAL_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }
}

impl ClockObserver for EventJournal {
    fn on_session_complete(&self, mode: SessionMode) {
        self.record(ClockEvent::SessionCompleted { mode });
    }

    fn on_minute_boundary(&self, total_minutes: u32) {
        self.record(ClockEvent::MinuteBoundary { total_minutes });
    }

    fn on_mode_change(&self, new_mode: SessionMode) {
        self.record(ClockEvent::ModeChanged { mode: new_mode });
    }

    fn on_reward(&self, fish: u32) {
        self.record(ClockEvent::RewardEarned { fish });
    }

    fn on_daily_goal_reached(&self, minutes: u32) {
        self.record(ClockEvent::DailyGoalReached { minutes });
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSummary {
    pub daily_focus_minutes: u32,
    pub daily_goal_minutes: u32,
    pub goal_progress_percent: u32,
    pub completed_sessions: u32,
    pub sessions_until_long_break: u32,
}

pub struct FocusClock {
    state: ClockState,
    settings: ClockSettings,
    repository: ClockStateRepository,
    observer: Arc<dyn ClockObserver>,
    run_epoch: u64,
    degraded: bool,
}

impl FocusClock {
    pub fn open(
        repository: ClockStateRepository,
        settings: ClockSettings,
        observer: Arc<dyn ClockObserver>,
    ) -> Self {
        let state = repository.load();
        let mut clock = Self {
            state,
            settings,
            repository,
            observer,
            run_epoch: 0,
            degraded: false,
        };
        if clock.state.running {
            let outcome = clock.reconcile();
            info!(
                elapsed_seconds = outcome.elapsed_seconds,
                completed = outcome.completed,
                "resumed running clock"
            );
        }
        clock
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    /// Identifies the current run. Any operation that stops or restarts the
    /// clock moves it, which invalidates ticks scheduled for the old run.
    pub fn run_epoch(&self) -> u64 {
        self.run_epoch
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn reconcile(&mut self) -> DriftOutcome {
        let now = self.repository.now();
        self.roll_day();
        let outcome = reconcile_drift(&mut self.state, now.timestamp_millis());
        for _ in 0..outcome.minutes_crossed {
            self.credit_focus_minute();
        }
        if outcome.completed {
            self.finish_session();
        }
        if self.state.running || outcome.completed || outcome.elapsed_seconds > 0 {
            self.persist();
        }
        outcome
    }

    pub fn start(&mut self) -> u64 {
        self.roll_day();
        if self.state.running {
            return self.run_epoch;
        }
        if self.state.is_countdown && self.state.seconds == 0 {
            self.state.seconds = self.state.target_seconds;
        }
        self.state.running = true;
        self.state.last_timestamp_ms = Some(self.repository.now().timestamp_millis());
        self.run_epoch += 1;
        self.persist();
        info!(mode = %self.state.mode, seconds = self.state.seconds, "clock started");
        self.run_epoch
    }

    pub fn pause(&mut self) {
        if !self.state.running {
            return;
        }
        self.run_epoch += 1;
        self.state.running = false;
        self.state.last_timestamp_ms = None;
        self.persist();
        info!(mode = %self.state.mode, seconds = self.state.seconds, "clock paused");
    }

    pub fn reset(&mut self) {
        self.run_epoch += 1;
        self.state.rewind();
        self.persist();
        info!(mode = %self.state.mode, "clock reset");
    }

    pub fn switch_mode(&mut self, mode: SessionMode) {
        self.run_epoch += 1;
        enter_mode(&mut self.state, mode, &self.settings);
        self.observer.on_mode_change(mode);
        self.persist();
    }

    pub fn set_countdown(&mut self, is_countdown: bool) {
        self.run_epoch += 1;
        self.state.is_countdown = is_countdown;
        self.state.target_seconds = self.settings.duration_seconds(self.state.mode);
        self.state.rewind();
        self.persist();
        info!(is_countdown, "clock style changed");
    }

    pub fn skip(&mut self) -> SessionTransition {
        self.run_epoch += 1;
        let transition = skip_session(&mut self.state, &self.settings);
        self.observer.on_mode_change(transition.next);
        self.persist();
        info!(skipped = %transition.finished, next = %transition.next, "session skipped");
        transition
    }

    pub fn update_settings(&mut self, settings: ClockSettings) {
        let untouched = !self.state.running
            && self.state.is_countdown
            && self.state.seconds == self.state.target_seconds;
        self.settings = settings;
        if untouched {
            let mode = self.state.mode;
            enter_mode(&mut self.state, mode, &self.settings);
            self.persist();
        }
    }

    /// Advances by the whole seconds elapsed since `last_timestamp_ms`, so
    /// every context ticking the same persisted run lands on the same value.
    /// Gaps longer than one step go through `reconcile`.
    pub fn tick(&mut self) -> TickStep {
        if !self.state.running {
            return TickStep::Idle;
        }
        let now_ms = self.repository.now().timestamp_millis();
        self.roll_day();

        match self.state.last_timestamp_ms.map(|last| now_ms - last) {
            Some(elapsed_ms) if (0..1_000).contains(&elapsed_ms) => TickStep::Idle,
            Some(elapsed_ms) if (1_000..2_000).contains(&elapsed_ms) => self.step_one_second(),
            _ => {
                let outcome = self.reconcile();
                if outcome.elapsed_seconds > 1 {
                    debug!(
                        elapsed_seconds = outcome.elapsed_seconds,
                        "caught up after a delayed tick"
                    );
                }
                let minute_crossed = outcome.minutes_crossed > 0;
                if outcome.completed {
                    TickStep::CountdownFinished { minute_crossed }
                } else if outcome.elapsed_seconds > 0 {
                    TickStep::Advanced { minute_crossed }
                } else {
                    TickStep::Idle
                }
            }
        }
    }

    /// Replaces local state with whatever another context saved last. Adoption
    /// never saves, so it cannot echo back.
    pub fn adopt_persisted(&mut self) -> bool {
        let loaded = self.repository.load();
        if loaded == self.state {
            return false;
        }

        let was_running = self.state.running;
        let mode_changed = loaded.mode != self.state.mode;
        self.state = loaded;
        if !(was_running && self.state.running) {
            self.run_epoch += 1;
        }
        if mode_changed {
            self.observer.on_mode_change(self.state.mode);
        }
        debug!(
            mode = %self.state.mode,
            seconds = self.state.seconds,
            running = self.state.running,
            "adopted clock state from another context"
        );
        true
    }

    pub fn summary(&self) -> FocusSummary {
        let goal = self.settings.daily_goal_minutes.max(1);
        let cadence = self.settings.sessions_before_long_break.max(1);
        let progress = u64::from(self.state.daily_focus_minutes) * 100 / u64::from(goal);
        FocusSummary {
            daily_focus_minutes: self.state.daily_focus_minutes,
            daily_goal_minutes: self.settings.daily_goal_minutes,
            goal_progress_percent: progress.min(100) as u32,
            completed_sessions: self.state.completed_sessions,
            sessions_until_long_break: cadence - self.state.completed_sessions % cadence,
        }
    }

    fn step_one_second(&mut self) -> TickStep {
        let step = advance_one_second(&mut self.state);
        match step {
            TickStep::Idle => return step,
            TickStep::Advanced { minute_crossed } => {
                if minute_crossed {
                    self.credit_focus_minute();
                }
                self.state.last_timestamp_ms =
                    self.state.last_timestamp_ms.map(|last| last.saturating_add(1_000));
            }
            TickStep::CountdownFinished { minute_crossed } => {
                if minute_crossed {
                    self.credit_focus_minute();
                }
                self.finish_session();
            }
        }
        self.persist();
        step
    }

    fn finish_session(&mut self) {
        let transition = complete_session(&mut self.state, &self.settings);
        self.observer.on_session_complete(transition.finished);
        if transition.reward_fish > 0 {
            self.observer.on_reward(transition.reward_fish);
        }
        self.observer.on_mode_change(transition.next);
        info!(
            finished = %transition.finished,
            next = %transition.next,
            completed_sessions = self.state.completed_sessions,
            "session completed"
        );
    }

    fn credit_focus_minute(&mut self) {
        let before = self.state.daily_focus_minutes;
        self.state.daily_focus_minutes = before.saturating_add(1);
        self.observer
            .on_minute_boundary(self.state.daily_focus_minutes);

        let goal = self.settings.daily_goal_minutes;
        if before < goal && self.state.daily_focus_minutes >= goal {
            self.observer.on_daily_goal_reached(self.state.daily_focus_minutes);
        }
    }

    fn roll_day(&mut self) {
        let today = self.repository.today();
        if roll_over_day(&mut self.state, today) {
            info!(%today, "new day; daily focus minutes reset");
        }
    }

    fn persist(&mut self) {
        match self.repository.save(&self.state) {
            Ok(_) => {
                if self.degraded {
                    info!("clock storage available again");
                }
                self.degraded = false;
            }
            Err(error) => {
                if !self.degraded {
                    warn!(%error, "clock state not persisted; continuing in memory");
                }
                self.degraded = true;
            }
        }
    }
}
