use crate::application::bootstrap::bootstrap_workspace;
use crate::application::clock_repository::ClockStateRepository;
use crate::application::clock_service::ClockService;
use crate::application::focus_clock::{EventJournal, FocusClock, FocusSummary};
use crate::domain::models::{
    ClockEvent, ClockSettings, ClockState, SessionMode, FOCUS_DATE_FORMAT,
};
use crate::infrastructure::config::save_clock_settings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::SqliteKeyValueStore;
use crate::infrastructure::storage_events::{StorageChannel, TabStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

struct ClockContext {
    store: TabStore,
    service: Arc<ClockService>,
    journal: Arc<EventJournal>,
}

impl ClockContext {
    fn open(channel: &Arc<StorageChannel>, settings: ClockSettings) -> Result<Self, InfraError> {
        let store = channel.open_context();
        let journal = Arc::new(EventJournal::default());
        let repository = ClockStateRepository::new(Arc::new(store.clone()));
        let clock = FocusClock::open(repository, settings, journal.clone());
        let service = ClockService::new(clock)?;
        service.install_cross_tab_listener(&store)?;
        Ok(Self {
            store,
            service,
            journal,
        })
    }
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    channel: Arc<StorageChannel>,
    context: ClockContext,
    settings_guard: Mutex<()>,
}

impl AppState {
    /// Must be called from inside a tokio runtime; the clock's tasks are
    /// spawned on it.
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let backend = SqliteKeyValueStore::open(&bootstrap.database_path)?;
        let channel = StorageChannel::new(Arc::new(backend));
        let context = ClockContext::open(&channel, bootstrap.settings)?;

        info!(
            workspace = %bootstrap.workspace_root.display(),
            context = context.store.context_id(),
            "app state ready"
        );
        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            channel,
            context,
            settings_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn clock(&self) -> &Arc<ClockService> {
        &self.context.service
    }

    pub fn open_sibling_context(&self) -> Result<Arc<ClockService>, InfraError> {
        let settings = self.context.service.settings()?;
        let sibling = ClockContext::open(&self.channel, settings)?;
        Ok(sibling.service)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClockStateResponse {
    pub mode: String,
    pub is_countdown: bool,
    pub seconds: u32,
    pub target_seconds: u32,
    pub running: bool,
    pub completed_sessions: u32,
    pub daily_focus_minutes: u32,
    pub focus_date: String,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkipSessionResponse {
    pub skipped: String,
    pub next: String,
    pub clock: ClockStateResponse,
}

pub fn start_clock_impl(state: &AppState) -> Result<ClockStateResponse, InfraError> {
    let clock = state.clock().start()?;
    to_clock_state_response(state, &clock)
}

pub fn pause_clock_impl(state: &AppState) -> Result<ClockStateResponse, InfraError> {
    let clock = state.clock().pause()?;
    to_clock_state_response(state, &clock)
}

pub fn reset_clock_impl(state: &AppState) -> Result<ClockStateResponse, InfraError> {
    let clock = state.clock().reset()?;
    to_clock_state_response(state, &clock)
}

pub fn switch_mode_impl(state: &AppState, mode: String) -> Result<ClockStateResponse, InfraError> {
    let mode = SessionMode::parse(&mode)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown session mode: {}", mode.trim())))?;
    let clock = state.clock().switch_mode(mode)?;
    info!(command = "switch_mode", %mode, "session mode switched");
    to_clock_state_response(state, &clock)
}

pub fn set_countdown_impl(
    state: &AppState,
    is_countdown: bool,
) -> Result<ClockStateResponse, InfraError> {
    let clock = state.clock().set_countdown(is_countdown)?;
    to_clock_state_response(state, &clock)
}

pub fn skip_session_impl(state: &AppState) -> Result<SkipSessionResponse, InfraError> {
    let (transition, clock) = state.clock().skip()?;
    Ok(SkipSessionResponse {
        skipped: transition.finished.as_str().to_string(),
        next: transition.next.as_str().to_string(),
        clock: to_clock_state_response(state, &clock)?,
    })
}

pub fn get_clock_state_impl(state: &AppState) -> Result<ClockStateResponse, InfraError> {
    let clock = state.clock().snapshot()?;
    to_clock_state_response(state, &clock)
}

pub fn get_focus_summary_impl(state: &AppState) -> Result<FocusSummary, InfraError> {
    state.clock().summary()
}

pub fn drain_events_impl(state: &AppState) -> Result<Vec<ClockEvent>, InfraError> {
    state.context.journal.drain()
}

pub fn get_settings_impl(state: &AppState) -> Result<ClockSettings, InfraError> {
    state.clock().settings()
}

pub fn update_settings_impl(
    state: &AppState,
    settings: ClockSettings,
) -> Result<ClockStateResponse, InfraError> {
    let _guard = state
        .settings_guard
        .lock()
        .map_err(|error| InfraError::LockPoisoned(format!("settings: {error}")))?;
    save_clock_settings(state.config_dir(), &settings)?;
    let clock = state.clock().update_settings(settings)?;
    info!(command = "update_settings", "clock settings updated");
    to_clock_state_response(state, &clock)
}

fn to_clock_state_response(
    state: &AppState,
    clock: &ClockState,
) -> Result<ClockStateResponse, InfraError> {
    Ok(ClockStateResponse {
        mode: clock.mode.as_str().to_string(),
        is_countdown: clock.is_countdown,
        seconds: clock.seconds,
        target_seconds: clock.target_seconds,
        running: clock.running,
        completed_sessions: clock.completed_sessions,
        daily_focus_minutes: clock.daily_focus_minutes,
        focus_date: clock.focus_date.format(FOCUS_DATE_FORMAT).to_string(),
        degraded: state.clock().is_degraded()?,
    })
}
