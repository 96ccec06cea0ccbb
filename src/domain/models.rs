use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOCUS_SECONDS: u32 = 25 * 60;
pub const FOCUS_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionMode {
    Focus,
    Break,
    LongBreak,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
            Self::LongBreak => "longBreak",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "focus" => Some(Self::Focus),
            "break" => Some(Self::Break),
            "longBreak" => Some(Self::LongBreak),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub mode: SessionMode,
    pub is_countdown: bool,
    /// Countdown remaining or stopwatch elapsed, depending on `is_countdown`.
    pub seconds: u32,
    pub target_seconds: u32,
    pub running: bool,
    /// Wall-clock instant at which `seconds` was last valid while running.
    pub last_timestamp_ms: Option<i64>,
    pub completed_sessions: u32,
    pub daily_focus_minutes: u32,
    pub focus_date: NaiveDate,
}

impl ClockState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            mode: SessionMode::Focus,
            is_countdown: true,
            seconds: DEFAULT_FOCUS_SECONDS,
            target_seconds: DEFAULT_FOCUS_SECONDS,
            running: false,
            last_timestamp_ms: None,
            completed_sessions: 0,
            daily_focus_minutes: 0,
            focus_date: today,
        }
    }

    pub fn spent_seconds(&self) -> u32 {
        if self.is_countdown {
            self.target_seconds.saturating_sub(self.seconds)
        } else {
            self.seconds
        }
    }

    pub fn rewind(&mut self) {
        self.running = false;
        self.last_timestamp_ms = None;
        self.seconds = if self.is_countdown { self.target_seconds } else { 0 };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClockSettings {
    pub focus_minutes: u32,
    pub break_minutes: u32,
    pub long_break_minutes: u32,
    pub sessions_before_long_break: u32,
    pub daily_goal_minutes: u32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            break_minutes: 5,
            long_break_minutes: 15,
            sessions_before_long_break: 4,
            daily_goal_minutes: 120,
        }
    }
}

impl ClockSettings {
    pub fn validate(&self) -> Result<(), String> {
        validate_positive(self.focus_minutes, "settings.focus_minutes")?;
        validate_positive(self.break_minutes, "settings.break_minutes")?;
        validate_positive(self.long_break_minutes, "settings.long_break_minutes")?;
        validate_positive(
            self.sessions_before_long_break,
            "settings.sessions_before_long_break",
        )?;
        validate_positive(self.daily_goal_minutes, "settings.daily_goal_minutes")?;
        Ok(())
    }

    pub fn duration_seconds(&self, mode: SessionMode) -> u32 {
        let minutes = match mode {
            SessionMode::Focus => self.focus_minutes,
            SessionMode::Break => self.break_minutes,
            SessionMode::LongBreak => self.long_break_minutes,
        };
        minutes.saturating_mul(60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClockEvent {
    SessionCompleted { mode: SessionMode },
    #[serde(rename_all = "camelCase")]
    MinuteBoundary { total_minutes: u32 },
    ModeChanged { mode: SessionMode },
    RewardEarned { fish: u32 },
    DailyGoalReached { minutes: u32 },
}

fn validate_positive(value: u32, field_name: &str) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field_name} must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
    }

    #[test]
    fn new_state_is_a_stopped_focus_countdown() {
        let state = ClockState::new(today());
        assert_eq!(state.mode, SessionMode::Focus);
        assert!(state.is_countdown);
        assert!(!state.running);
        assert_eq!(state.seconds, DEFAULT_FOCUS_SECONDS);
        assert_eq!(state.focus_date, today());
    }

    #[test]
    fn mode_parse_accepts_persisted_names_only() {
        assert_eq!(SessionMode::parse("longBreak"), Some(SessionMode::LongBreak));
        assert_eq!(SessionMode::parse(" break "), Some(SessionMode::Break));
        assert_eq!(SessionMode::parse("long_break"), None);
        assert_eq!(SessionMode::parse(""), None);
    }

    #[test]
    fn settings_validate_rejects_zero_values() {
        assert!(ClockSettings::default().validate().is_ok());

        let mut settings = ClockSettings::default();
        settings.sessions_before_long_break = 0;
        let error = settings.validate().expect_err("zero cadence must fail");
        assert!(error.contains("sessions_before_long_break"));
    }

    #[test]
    fn spent_seconds_follows_clock_style() {
        let mut state = ClockState::new(today());
        state.seconds = 1_300;
        assert_eq!(state.spent_seconds(), 200);

        state.is_countdown = false;
        state.seconds = 75;
        assert_eq!(state.spent_seconds(), 75);
    }

    #[test]
    fn rewind_restores_session_start() {
        let mut state = ClockState::new(today());
        state.seconds = 10;
        state.running = true;
        state.last_timestamp_ms = Some(1);
        state.rewind();
        assert_eq!(state.seconds, state.target_seconds);
        assert!(!state.running);
        assert_eq!(state.last_timestamp_ms, None);
    }

    #[test]
    fn minute_boundary_event_serializes_camel_case() {
        let json = serde_json::to_value(ClockEvent::MinuteBoundary { total_minutes: 3 })
            .expect("serialize event");
        assert_eq!(json["type"], "minuteBoundary");
        assert_eq!(json["totalMinutes"], 3);
    }

    proptest! {
        #[test]
        fn duration_seconds_matches_configured_minutes(
            focus in 1u32..600u32,
            short in 1u32..120u32,
            long in 1u32..240u32
        ) {
            let settings = ClockSettings {
                focus_minutes: focus,
                break_minutes: short,
                long_break_minutes: long,
                ..ClockSettings::default()
            };
            prop_assert_eq!(settings.duration_seconds(SessionMode::Focus), focus * 60);
            prop_assert_eq!(settings.duration_seconds(SessionMode::Break), short * 60);
            prop_assert_eq!(settings.duration_seconds(SessionMode::LongBreak), long * 60);
        }
    }
}
