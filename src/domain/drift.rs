use crate::domain::models::{ClockState, SessionMode};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftOutcome {
    pub elapsed_seconds: u32,
    /// Focus minute boundaries skipped while the clock was not ticking.
    pub minutes_crossed: u32,
    pub completed: bool,
}

/// Catches a running clock up with wall-clock time that passed while nothing
/// was ticking. Missing or future timestamps count as no elapsed time.
pub fn reconcile_drift(state: &mut ClockState, now_ms: i64) -> DriftOutcome {
    if !state.running {
        return DriftOutcome::default();
    }

    // Only whole seconds are consumed; the sub-second remainder stays on the
    // timestamp for the next tick or reconcile.
    let (elapsed_seconds, consumed_until) = match state.last_timestamp_ms {
        Some(last) if last <= now_ms => {
            let seconds = u32::try_from((now_ms - last) / 1000).unwrap_or(u32::MAX);
            (seconds, last.saturating_add(i64::from(seconds) * 1000))
        }
        _ => (0, now_ms),
    };
    state.last_timestamp_ms = Some(consumed_until);

    let spent_before = state.spent_seconds();
    if state.is_countdown {
        state.seconds = state.seconds.saturating_sub(elapsed_seconds);
    } else {
        state.seconds = state.seconds.saturating_add(elapsed_seconds);
    }

    let minutes_crossed = if state.mode == SessionMode::Focus {
        (state.spent_seconds() / 60).saturating_sub(spent_before / 60)
    } else {
        0
    };

    let completed = state.is_countdown && state.seconds == 0;
    if completed {
        state.running = false;
    }

    DriftOutcome {
        elapsed_seconds,
        minutes_crossed,
        completed,
    }
}

/// Resets the daily counter when it belongs to another day. Minutes and date
/// always change together.
pub fn roll_over_day(state: &mut ClockState, today: NaiveDate) -> bool {
    if state.focus_date == today {
        return false;
    }
    state.daily_focus_minutes = 0;
    state.focus_date = today;
    true
}
