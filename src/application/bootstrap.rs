use crate::infrastructure::config::{ensure_default_config, load_settings, Settings};
use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "timeblock.log";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub settings: Settings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let settings = load_settings(&config_dir)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        settings,
    })
}

/// Installs the global subscriber, appending plain-text events to
/// `logs/timeblock.log`. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(logs_dir: &Path) -> Result<PathBuf, InfraError> {
    let path = logs_dir.join(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to install logger: {error}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::save_time_window;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicU64 = AtomicU64::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "timeblock-bootstrap-tests-{}-{}",
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
    fn bootstrap_creates_layout_and_default_settings() {
        let workspace = TempWorkspace::new();

        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");

        assert!(result.config_dir.join("settings.json").is_file());
        assert!(result.logs_dir.is_dir());
        assert_eq!(result.settings, Settings::default());
    }

    #[test]
    fn bootstrap_keeps_existing_settings() {
        let workspace = TempWorkspace::new();
        let first = bootstrap_workspace(&workspace.path).expect("bootstrap");
        save_time_window(&first.config_dir, 8, 20).expect("save window");

        let second = bootstrap_workspace(&workspace.path).expect("bootstrap again");

        assert_eq!((second.settings.start_hour, second.settings.end_hour), (8, 20));
    }

    #[test]
    fn init_logging_creates_log_file() {
        let workspace = TempWorkspace::new();
        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");

        let _ = init_logging(&result.logs_dir);

        assert!(result.logs_dir.join(LOG_FILE).is_file());
    }
}
