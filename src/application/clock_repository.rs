use crate::domain::drift::roll_over_day;
use crate::domain::models::{ClockState, SessionMode, DEFAULT_FOCUS_SECONDS, FOCUS_DATE_FORMAT};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub mod keys {
    pub const MODE: &str = "clock.mode";
    pub const IS_COUNTDOWN: &str = "clock.isCountdown";
    pub const SECONDS: &str = "clock.seconds";
    pub const TARGET_SECONDS: &str = "clock.targetSeconds";
    pub const RUNNING: &str = "clock.running";
    pub const LAST_TIMESTAMP_MS: &str = "clock.lastTimestampMs";
    pub const COMPLETED_SESSIONS: &str = "clock.completedSessions";
    pub const DAILY_FOCUS_MINUTES: &str = "clock.dailyFocusMinutes";
    pub const FOCUS_DATE: &str = "clock.focusDate";
    pub const LAST_UPDATE_MS: &str = "clock.lastUpdateMs";
}

#[derive(Debug, Clone, Default)]
pub struct RawClockRecord {
    pub mode: Option<String>,
    pub is_countdown: Option<String>,
    pub seconds: Option<String>,
    pub target_seconds: Option<String>,
    pub running: Option<String>,
    pub last_timestamp_ms: Option<String>,
    pub completed_sessions: Option<String>,
    pub daily_focus_minutes: Option<String>,
    pub focus_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClock {
    pub state: ClockState,
    pub malformed: Vec<&'static str>,
}

pub fn parse_clock_record(raw: &RawClockRecord, today: NaiveDate) -> ParsedClock {
    let mut malformed = Vec::new();

    let mode = parse_field(&raw.mode, keys::MODE, &mut malformed, SessionMode::parse)
        .unwrap_or(SessionMode::Focus);
    let is_countdown = parse_field(&raw.is_countdown, keys::IS_COUNTDOWN, &mut malformed, parse_bool)
        .unwrap_or(true);
    let target_seconds = parse_field(&raw.target_seconds, keys::TARGET_SECONDS, &mut malformed, |value| {
        value.parse::<u32>().ok().filter(|seconds| *seconds > 0)
    })
    .unwrap_or(DEFAULT_FOCUS_SECONDS);
    let seconds = parse_field(&raw.seconds, keys::SECONDS, &mut malformed, |value| {
        value.parse::<u32>().ok()
    })
    .unwrap_or(if is_countdown { target_seconds } else { 0 });
    let running = parse_field(&raw.running, keys::RUNNING, &mut malformed, parse_bool).unwrap_or(false);
    let last_timestamp_ms =
        parse_field(&raw.last_timestamp_ms, keys::LAST_TIMESTAMP_MS, &mut malformed, |value| {
            value.parse::<i64>().ok()
        });
    let completed_sessions =
        parse_field(&raw.completed_sessions, keys::COMPLETED_SESSIONS, &mut malformed, |value| {
            value.parse::<u32>().ok()
        })
        .unwrap_or(0);
    let daily_focus_minutes =
        parse_field(&raw.daily_focus_minutes, keys::DAILY_FOCUS_MINUTES, &mut malformed, |value| {
            value.parse::<u32>().ok()
        })
        .unwrap_or(0);
    let focus_date = parse_field(&raw.focus_date, keys::FOCUS_DATE, &mut malformed, |value| {
        NaiveDate::parse_from_str(value, FOCUS_DATE_FORMAT).ok()
    });

    let mut state = ClockState {
        mode,
        is_countdown,
        seconds,
        target_seconds,
        running,
        last_timestamp_ms: if running { last_timestamp_ms } else { None },
        completed_sessions,
        daily_focus_minutes,
        focus_date: focus_date.unwrap_or(today),
    };
    if focus_date.is_none() {
        state.daily_focus_minutes = 0;
    }
    roll_over_day(&mut state, today);

    ParsedClock { state, malformed }
}

fn parse_field<T>(
    value: &Option<String>,
    key: &'static str,
    malformed: &mut Vec<&'static str>,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = value.as_deref()?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        malformed.push(key);
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub struct ClockStateRepository {
    store: Arc<dyn KeyValueStore>,
    now_provider: NowProvider,
}

impl ClockStateRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            now_provider: Arc::new(Local::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now(&self) -> DateTime<Local> {
        (self.now_provider)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn load(&self) -> ClockState {
        let raw = RawClockRecord {
            mode: self.read(keys::MODE),
            is_countdown: self.read(keys::IS_COUNTDOWN),
            seconds: self.read(keys::SECONDS),
            target_seconds: self.read(keys::TARGET_SECONDS),
            running: self.read(keys::RUNNING),
            last_timestamp_ms: self.read(keys::LAST_TIMESTAMP_MS),
            completed_sessions: self.read(keys::COMPLETED_SESSIONS),
            daily_focus_minutes: self.read(keys::DAILY_FOCUS_MINUTES),
            focus_date: self.read(keys::FOCUS_DATE),
        };

        let parsed = parse_clock_record(&raw, self.today());
        if !parsed.malformed.is_empty() {
            warn!(keys = ?parsed.malformed, "ignored malformed persisted clock values");
        }
        parsed.state
    }

    /// Writes every field, then a marker strictly greater than the last one.
    /// Returns the marker.
    pub fn save(&self, state: &ClockState) -> Result<i64, InfraError> {
        self.store.set(keys::MODE, state.mode.as_str())?;
        self.store.set(keys::IS_COUNTDOWN, bool_str(state.is_countdown))?;
        self.store.set(keys::SECONDS, &state.seconds.to_string())?;
        self.store.set(keys::TARGET_SECONDS, &state.target_seconds.to_string())?;
        self.store.set(keys::RUNNING, bool_str(state.running))?;
        match state.last_timestamp_ms {
            Some(timestamp) => self.store.set(keys::LAST_TIMESTAMP_MS, &timestamp.to_string())?,
            None => self.store.remove(keys::LAST_TIMESTAMP_MS)?,
        }
        self.store
            .set(keys::COMPLETED_SESSIONS, &state.completed_sessions.to_string())?;
        self.store
            .set(keys::DAILY_FOCUS_MINUTES, &state.daily_focus_minutes.to_string())?;
        self.store.set(
            keys::FOCUS_DATE,
            &state.focus_date.format(FOCUS_DATE_FORMAT).to_string(),
        )?;

        let now_ms = self.now().timestamp_millis();
        let marker = match self.last_update_marker() {
            Some(previous) if previous >= now_ms => previous.saturating_add(1),
            _ => now_ms,
        };
        self.store.set(keys::LAST_UPDATE_MS, &marker.to_string())?;
        Ok(marker)
    }

    pub fn last_update_marker(&self) -> Option<i64> {
        self.read(keys::LAST_UPDATE_MS)
            .and_then(|value| value.trim().parse::<i64>().ok())
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(error) => {
                debug!(key, %error, "clock store read failed; using default");
                None
            }
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
