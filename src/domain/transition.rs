use crate::domain::models::{ClockSettings, ClockState, SessionMode};

pub const MINUTES_PER_FISH: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTransition {
    pub finished: SessionMode,
    pub next: SessionMode,
    /// False for skipped sessions.
    pub counted: bool,
    pub reward_fish: u32,
}

pub fn next_mode(
    finished: SessionMode,
    completed_sessions: u32,
    sessions_before_long_break: u32,
) -> SessionMode {
    match finished {
        SessionMode::Focus => {
            let cadence = sessions_before_long_break.max(1);
            if completed_sessions % cadence == 0 {
                SessionMode::LongBreak
            } else {
                SessionMode::Break
            }
        }
        SessionMode::Break | SessionMode::LongBreak => SessionMode::Focus,
    }
}

pub fn fish_for_session(target_seconds: u32) -> u32 {
    (target_seconds / 60 / MINUTES_PER_FISH).max(1)
}

pub fn enter_mode(state: &mut ClockState, mode: SessionMode, settings: &ClockSettings) {
    state.mode = mode;
    state.target_seconds = settings.duration_seconds(mode);
    state.rewind();
}

pub fn complete_session(state: &mut ClockState, settings: &ClockSettings) -> SessionTransition {
    let finished = state.mode;
    let mut reward_fish = 0;
    if finished == SessionMode::Focus {
        state.completed_sessions = state.completed_sessions.saturating_add(1);
        reward_fish = fish_for_session(state.target_seconds);
    }

    let next = next_mode(
        finished,
        state.completed_sessions,
        settings.sessions_before_long_break,
    );
    enter_mode(state, next, settings);

    SessionTransition {
        finished,
        next,
        counted: true,
        reward_fish,
    }
}

/// Moves on without counting the session. A skipped focus never earns a long break.
pub fn skip_session(state: &mut ClockState, settings: &ClockSettings) -> SessionTransition {
    let finished = state.mode;
    let next = match finished {
        SessionMode::Focus => SessionMode::Break,
        SessionMode::Break | SessionMode::LongBreak => SessionMode::Focus,
    };
    enter_mode(state, next, settings);

    SessionTransition {
        finished,
        next,
        counted: false,
        reward_fish: 0,
    }
}
