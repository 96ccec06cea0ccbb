pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::clock_service::ClockService;
pub use application::commands::{
    drain_events_impl, get_clock_state_impl, get_focus_summary_impl, get_settings_impl,
    pause_clock_impl, reset_clock_impl, set_countdown_impl, skip_session_impl, start_clock_impl,
    switch_mode_impl, update_settings_impl, AppState, ClockStateResponse, SkipSessionResponse,
};
pub use application::focus_clock::{ClockObserver, FocusSummary};
pub use domain::models::{ClockEvent, ClockSettings, ClockState, SessionMode};
pub use infrastructure::error::InfraError;

use infrastructure::logging::init_logging;
use std::fs;
use std::path::PathBuf;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{info, warn};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(workspace_root: PathBuf) -> Result<(), InfraError> {
    let logs_dir = workspace_root.join("logs");
    fs::create_dir_all(&logs_dir)?;
    init_logging(&logs_dir)?;

    let state = AppState::new(workspace_root)?;
    let clock = start_clock_impl(&state).map_err(|error| {
        state.command_error("start_clock", &error);
        error
    })?;
    info!(mode = %clock.mode, seconds = clock.seconds, "focus clock running");

    let mut summaries = time::interval(SUMMARY_INTERVAL);
    summaries.set_missed_tick_behavior(MissedTickBehavior::Skip);
    summaries.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "failed to listen for ctrl-c");
                }
                break;
            }
            _ = summaries.tick() => {
                match get_focus_summary_impl(&state) {
                    Ok(summary) => info!(
                        daily_focus_minutes = summary.daily_focus_minutes,
                        goal_progress_percent = summary.goal_progress_percent,
                        completed_sessions = summary.completed_sessions,
                        "focus summary"
                    ),
                    Err(error) => {
                        state.command_error("get_focus_summary", &error);
                    }
                }
            }
        }
    }

    state.clock().shutdown();
    info!("focus clock stopped; state stays persisted for the next start");
    Ok(())
}
