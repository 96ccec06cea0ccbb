use crate::domain::models::ClockSettings;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;

const CLOCK_JSON: &str = "clock.json";
const CONFIG_SCHEMA: u64 = 1;

fn default_clock_config() -> serde_json::Value {
    let defaults = ClockSettings::default();
    serde_json::json!({
        "schema": CONFIG_SCHEMA,
        "focusMinutes": defaults.focus_minutes,
        "breakMinutes": defaults.break_minutes,
        "longBreakMinutes": defaults.long_break_minutes,
        "sessionsBeforeLongBreak": defaults.sessions_before_long_break,
        "dailyGoalMinutes": defaults.daily_goal_minutes
    })
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(CLOCK_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_clock_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != CONFIG_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Reads `clock.json`; keys left out fall back to the defaults.
pub fn load_clock_settings(config_dir: &Path) -> Result<ClockSettings, InfraError> {
    let path = config_dir.join(CLOCK_JSON);
    let value = read_config(&path)?;
    let settings: ClockSettings = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid clock settings in {}: {error}", path.display()))
    })?;
    settings.validate().map_err(InfraError::InvalidConfig)?;
    Ok(settings)
}

pub fn save_clock_settings(config_dir: &Path, settings: &ClockSettings) -> Result<(), InfraError> {
    settings.validate().map_err(InfraError::InvalidConfig)?;

    let mut value = serde_json::to_value(settings)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("clock settings must serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::Value::from(CONFIG_SCHEMA));

    let formatted = serde_json::to_string_pretty(&value)?;
    fs::write(config_dir.join(CLOCK_JSON), format!("{formatted}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_default_settings() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_config(dir.path()).expect("write defaults");

        let settings = load_clock_settings(dir.path()).expect("load settings");
        assert_eq!(settings, ClockSettings::default());
    }

    #[test]
    fn existing_config_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(CLOCK_JSON),
            r#"{"schema": 1, "focusMinutes": 50, "breakMinutes": 10}"#,
        )
        .expect("seed config");

        ensure_default_config(dir.path()).expect("ensure defaults");
        let settings = load_clock_settings(dir.path()).expect("load settings");

        assert_eq!(settings.focus_minutes, 50);
        assert_eq!(settings.break_minutes, 10);
        assert_eq!(settings.long_break_minutes, 15);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(CLOCK_JSON),
            r#"{"schema": 1, "longBreakMinutes": 0}"#,
        )
        .expect("seed config");

        match load_clock_settings(dir.path()) {
            Err(InfraError::InvalidConfig(message)) => {
                assert!(message.contains("long_break_minutes"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn negative_or_textual_durations_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(CLOCK_JSON),
            r#"{"schema": 1, "focusMinutes": "twenty"}"#,
        )
        .expect("seed config");

        assert!(matches!(
            load_clock_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join(CLOCK_JSON), r#"{"schema": 2}"#).expect("seed config");
        assert!(matches!(
            load_clock_settings(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn saved_settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = ClockSettings {
            focus_minutes: 45,
            sessions_before_long_break: 3,
            ..ClockSettings::default()
        };
        save_clock_settings(dir.path(), &settings).expect("save settings");
        assert_eq!(load_clock_settings(dir.path()).expect("load"), settings);
    }
}
