use crate::domain::models::{ClockState, SessionMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    Idle,
    Advanced { minute_crossed: bool },
    CountdownFinished { minute_crossed: bool },
}

/// Applies one 1 Hz step. A countdown already at zero stays put until the
/// transition policy moves it to the next mode.
pub fn advance_one_second(state: &mut ClockState) -> TickStep {
    if !state.running {
        return TickStep::Idle;
    }

    let spent_before = state.spent_seconds();
    if state.is_countdown {
        if state.seconds == 0 {
            return TickStep::Idle;
        }
        state.seconds -= 1;
    } else {
        state.seconds = state.seconds.saturating_add(1);
    }

    // A single step moves by one second, so at most one boundary is crossed.
    let minute_crossed =
        state.mode == SessionMode::Focus && state.spent_seconds() / 60 > spent_before / 60;

    if state.is_countdown && state.seconds == 0 {
        state.running = false;
        return TickStep::CountdownFinished { minute_crossed };
    }
    TickStep::Advanced { minute_crossed }
}
