use crate::domain::time::{TimeWindow, UnmarkedHourPolicy};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SETTINGS_JSON: &str = "settings.json";
const SCHEMA_VERSION: u8 = 1;
const API_VERSION_SEGMENT: &str = "/api/v1";
pub const API_URL_ENV: &str = "TIMEBLOCK_API_URL";
pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

/// Persisted planner settings (`config/settings.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub schema: u8,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    #[serde(default)]
    pub hours_visible: Option<u32>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default)]
    pub unmarked_hours: UnmarkedHourPolicy,
    #[serde(default)]
    pub sidebar_collapsed: bool,
    #[serde(default)]
    pub collapsed_sections: Vec<String>,
    #[serde(default)]
    pub theme: ThemePreference,
}

fn default_start_hour() -> u32 {
    TimeWindow::default().start_hour
}

fn default_end_hour() -> u32 {
    TimeWindow::default().end_hour
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECONDS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            api_url: None,
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            hours_visible: None,
            sync_interval_seconds: DEFAULT_SYNC_INTERVAL_SECONDS,
            unmarked_hours: UnmarkedHourPolicy::default(),
            sidebar_collapsed: false,
            collapsed_sections: Vec::new(),
            theme: ThemePreference::default(),
        }
    }
}

impl Settings {
    /// Falls back to the default window when the stored hours are inverted.
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow::new(self.start_hour, self.end_hour).unwrap_or_else(|message| {
            tracing::warn!(%message, "ignoring stored time window");
            TimeWindow::default()
        })
    }

    /// Stored API URL, overridden by `lookup(API_URL_ENV)` when set.
    pub fn effective_api_url<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(API_URL_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| normalize_api_url(&value))
            .or_else(|| self.api_url.clone())
    }

    pub fn set_hours_visible(&mut self, hours: u32) -> Result<(), InfraError> {
        if !(1..=24).contains(&hours) {
            return Err(InfraError::InvalidConfig(format!(
                "hoursVisible must be between 1 and 24, got {hours}"
            )));
        }
        self.hours_visible = Some(hours);
        Ok(())
    }

    pub fn is_section_collapsed(&self, section: &str) -> bool {
        self.collapsed_sections.iter().any(|name| name == section)
    }

    /// Returns whether `section` is collapsed afterwards.
    pub fn toggle_section(&mut self, section: &str) -> bool {
        let section = section.trim();
        if let Some(position) = self
            .collapsed_sections
            .iter()
            .position(|name| name == section)
        {
            self.collapsed_sections.remove(position);
            false
        } else {
            self.collapsed_sections.push(section.to_string());
            true
        }
    }
}

/// Trims trailing slashes and cuts anything after the first `/api/v1`.
pub fn normalize_api_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.find(API_VERSION_SEGMENT) {
        Some(index) if !trimmed.ends_with(API_VERSION_SEGMENT) => {
            trimmed[..index + API_VERSION_SEGMENT.len()].to_string()
        }
        _ => trimmed.to_string(),
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(SETTINGS_JSON);
    if !path.exists() {
        write_settings(config_dir, &Settings::default())?;
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
    if schema != u64::from(SCHEMA_VERSION) {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_settings(config_dir: &Path) -> Result<Settings, InfraError> {
    let value = read_config(&config_dir.join(SETTINGS_JSON))?;
    Ok(serde_json::from_value(value)?)
}

fn write_settings(config_dir: &Path, settings: &Settings) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(settings)?;
    fs::write(config_dir.join(SETTINGS_JSON), format!("{formatted}\n"))?;
    Ok(())
}

/// Loads, edits and writes back the settings file.
pub fn update_settings<F>(config_dir: &Path, edit: F) -> Result<Settings, InfraError>
where
    F: FnOnce(&mut Settings) -> Result<(), InfraError>,
{
    let mut settings = load_settings(config_dir)?;
    edit(&mut settings)?;
    write_settings(config_dir, &settings)?;
    Ok(settings)
}

pub fn save_api_url(config_dir: &Path, url: &str) -> Result<String, InfraError> {
    let normalized = normalize_api_url(url);
    if normalized.is_empty() {
        return Err(InfraError::InvalidConfig(
            "apiUrl must not be empty".to_string(),
        ));
    }
    update_settings(config_dir, |settings| {
        settings.api_url = Some(normalized.clone());
        Ok(())
    })?;
    Ok(normalized)
}

/// Persists the visible window; an inverted range is rejected and nothing is written.
pub fn save_time_window(
    config_dir: &Path,
    start_hour: u32,
    end_hour: u32,
) -> Result<TimeWindow, InfraError> {
    let window = TimeWindow::new(start_hour, end_hour).map_err(InfraError::InvalidConfig)?;
    update_settings(config_dir, |settings| {
        settings.start_hour = window.start_hour;
        settings.end_hour = window.end_hour;
        Ok(())
    })?;
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicU64 = AtomicU64::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "timeblock-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_config_is_created_once_and_loads() {
        let workspace = TempWorkspace::new();
        ensure_default_config(&workspace.path).expect("defaults");
        save_api_url(&workspace.path, "https://notes.example.com/api/v1").expect("save url");

        ensure_default_config(&workspace.path).expect("defaults again");
        let settings = load_settings(&workspace.path).expect("load");

        assert_eq!(
            settings.api_url.as_deref(),
            Some("https://notes.example.com/api/v1")
        );
        assert_eq!(settings.time_window(), TimeWindow::default());
        assert_eq!(settings.sync_interval_seconds, 60);
        assert_eq!(settings.theme, ThemePreference::System);
    }

    #[test]
    fn missing_or_unsupported_schema_is_rejected() {
        let workspace = TempWorkspace::new();
        let path = workspace.path.join(SETTINGS_JSON);

        fs::write(&path, r#"{ "apiUrl": "https://x" }"#).expect("write");
        assert!(matches!(
            load_settings(&workspace.path),
            Err(InfraError::InvalidConfig(message)) if message.contains("missing schema")
        ));

        fs::write(&path, r#"{ "schema": 2 }"#).expect("write");
        assert!(matches!(
            load_settings(&workspace.path),
            Err(InfraError::InvalidConfig(message)) if message.contains("unsupported schema 2")
        ));
    }

    #[test]
    fn sparse_file_fills_in_defaults() {
        let workspace = TempWorkspace::new();
        fs::write(
            workspace.path.join(SETTINGS_JSON),
            r#"{ "schema": 1, "unmarkedHours": "assumeMorning", "theme": "dark" }"#,
        )
        .expect("write");

        let settings = load_settings(&workspace.path).expect("load");
        assert_eq!(settings.unmarked_hours, UnmarkedHourPolicy::AssumeMorning);
        assert_eq!(settings.theme, ThemePreference::Dark);
        assert_eq!(settings.start_hour, 6);
        assert_eq!(settings.end_hour, 22);
    }

    #[test]
    fn inverted_time_window_is_not_persisted() {
        let workspace = TempWorkspace::new();
        ensure_default_config(&workspace.path).expect("defaults");

        assert!(save_time_window(&workspace.path, 18, 9).is_err());
        assert!(save_time_window(&workspace.path, 9, 9).is_err());
        assert_eq!(
            load_settings(&workspace.path).expect("load").time_window(),
            TimeWindow::default()
        );

        let window = save_time_window(&workspace.path, 7, 19).expect("valid window");
        assert_eq!(window.total_hours(), 12);
        let settings = load_settings(&workspace.path).expect("load");
        assert_eq!((settings.start_hour, settings.end_hour), (7, 19));
    }

    #[test]
    fn api_url_is_normalized_to_version_segment() {
        assert_eq!(
            normalize_api_url("https://notes.example.com/api/v1/"),
            "https://notes.example.com/api/v1"
        );
        assert_eq!(
            normalize_api_url("https://notes.example.com/api/v1/blocks?date=today"),
            "https://notes.example.com/api/v1"
        );
        assert_eq!(
            normalize_api_url("https://notes.example.com/custom//"),
            "https://notes.example.com/custom"
        );

        let workspace = TempWorkspace::new();
        ensure_default_config(&workspace.path).expect("defaults");
        assert!(save_api_url(&workspace.path, " / ").is_err());
    }

    #[test]
    fn environment_url_overrides_stored_value() {
        let settings = Settings {
            api_url: Some("https://stored.example.com/api/v1".to_string()),
            ..Settings::default()
        };

        let from_env = settings.effective_api_url(|key| match key {
            API_URL_ENV => Some("https://env.example.com/api/v1/blocks".to_string()),
            _ => None,
        });
        assert_eq!(from_env.as_deref(), Some("https://env.example.com/api/v1"));

        let stored = settings.effective_api_url(|_| Some("  ".to_string()));
        assert_eq!(stored.as_deref(), Some("https://stored.example.com/api/v1"));
    }

    #[test]
    fn inverted_stored_window_falls_back_to_default() {
        let settings = Settings {
            start_hour: 20,
            end_hour: 8,
            ..Settings::default()
        };
        assert_eq!(settings.time_window(), TimeWindow::default());
    }

    #[test]
    fn toggle_section_flips_membership() {
        let mut settings = Settings::default();
        assert!(settings.toggle_section(" unscheduled "));
        assert_eq!(settings.collapsed_sections, vec!["unscheduled".to_string()]);
        assert!(settings.is_section_collapsed("unscheduled"));
        assert!(!settings.toggle_section("unscheduled"));
        assert!(settings.collapsed_sections.is_empty());
    }

    #[test]
    fn layout_preferences_persist_through_update() {
        let workspace = TempWorkspace::new();
        ensure_default_config(&workspace.path).expect("defaults");

        let rejected = update_settings(&workspace.path, |settings| settings.set_hours_visible(0));
        assert!(matches!(rejected, Err(InfraError::InvalidConfig(_))));

        update_settings(&workspace.path, |settings| {
            settings.set_hours_visible(10)?;
            settings.sidebar_collapsed = true;
            settings.toggle_section("unscheduled");
            Ok(())
        })
        .expect("update");

        let raw = fs::read_to_string(workspace.path.join(SETTINGS_JSON)).expect("read");
        assert!(raw.contains(r#""hoursVisible": 10"#));
        let settings = load_settings(&workspace.path).expect("load");
        assert_eq!(settings.hours_visible, Some(10));
        assert!(settings.sidebar_collapsed);
        assert!(settings.is_section_collapsed("unscheduled"));
    }
}
