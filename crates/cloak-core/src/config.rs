use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CloakResult;
use crate::log::LogConfig;

/// Name of the per-user data directory under `%LOCALAPPDATA%`.
pub const APP_DIR_NAME: &str = "Cloak";

/// How often the supervisor checks that the app is alive.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Age after which an update marker is disbelieved.
pub const UPDATE_MARKER_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Age after which a restart marker is disbelieved.
pub const RESTART_MARKER_STALE_AFTER: Duration = Duration::from_secs(30);

/// Upper bound on every wait for a remote thread.
pub const REMOTE_THREAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Time given to a relaunched app before liveness is re-checked.
pub const LAUNCH_SETTLE_TIME: Duration = Duration::from_secs(5);

/// Flags appended to the app's command line on relaunch.
pub const RESTART_FLAGS: [&str; 2] = ["--auto-start", "--service-restart"];

/// Top-level configuration for Cloak.
///
/// Loaded from `config.toml` in the data directory. Missing sections
/// fall back to defaults thanks to `#[serde(default)]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LogConfig,
    pub supervisor: SupervisorConfig,
    pub visibility: VisibilityConfig,
}

/// Names the supervisor uses to find, detect and relaunch the app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Executable of the main application, expected next to the supervisor.
    pub app_exe_name: String,
    /// Named mutex the app holds while it is alive.
    pub app_mutex_name: String,
    /// Named mutex guarding against a second supervisor in the session.
    pub supervisor_mutex_name: String,
    /// Substrings identifying installer processes (case-insensitive).
    pub installer_patterns: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            app_exe_name: "cloak-app.exe".into(),
            app_mutex_name: "CloakAppSingleInstanceMutex".into(),
            supervisor_mutex_name: "CloakSupervisorMutex".into(),
            installer_patterns: vec![
                "cloak-setup".into(),
                "cloak_setup".into(),
                "cloak_update".into(),
            ],
        }
    }
}

/// Visibility controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// File name of the capability module, resolved next to the executable.
    pub payload_file: String,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            payload_file: "cloak_payload.dll".into(),
        }
    }
}

/// Returns the data directory: `%LOCALAPPDATA%\Cloak`.
///
/// Falls back to the platform's local data directory when `LOCALAPPDATA`
/// is not set.
pub fn data_dir() -> Option<PathBuf> {
    std::env::var_os("LOCALAPPDATA")
        .map(PathBuf::from)
        .or_else(dirs::data_local_dir)
        .map(|base| base.join(APP_DIR_NAME))
}

/// Returns the data directory, creating it if it doesn't exist.
pub fn ensure_data_dir() -> CloakResult<PathBuf> {
    let dir = data_dir().ok_or("could not resolve the local data directory")?;
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: `<data dir>\config.toml`.
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("config.toml"))
}

/// Returns the directory holding the running executable.
pub fn exe_dir() -> CloakResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or("executable path has no parent directory")?;
    Ok(dir.to_path_buf())
}

/// Loads the configuration from disk, falling back to defaults.
///
/// If the file doesn't exist, returns defaults silently.
/// If the file exists but can't be parsed, warns and returns defaults.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };

    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return Config::default(),
    };

    parse(&content).unwrap_or_else(|e| {
        eprintln!("Warning: failed to parse {}: {e}", path.display());
        Config::default()
    })
}

fn parse(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        // Arrange / Act
        let config = Config::default();

        // Assert
        assert!(config.logging.enabled);
        assert_eq!(config.logging.max_file_mb, 1);
        assert_eq!(config.supervisor.app_exe_name, "cloak-app.exe");
        assert_eq!(config.supervisor.installer_patterns.len(), 3);
        assert_eq!(config.visibility.payload_file, "cloak_payload.dll");
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_sections() {
        // Arrange
        let toml_str = "[supervisor]\napp_exe_name = \"other.exe\"\n";

        // Act
        let config = parse(toml_str).unwrap();

        // Assert
        assert_eq!(config.supervisor.app_exe_name, "other.exe");
        assert_eq!(
            config.supervisor.app_mutex_name,
            "CloakAppSingleInstanceMutex"
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse("[supervisor\n").is_err());
    }

    #[test]
    fn tuned_timings_are_preserved() {
        assert_eq!(CHECK_INTERVAL.as_secs(), 120);
        assert_eq!(UPDATE_MARKER_STALE_AFTER.as_secs(), 600);
        assert_eq!(RESTART_MARKER_STALE_AFTER.as_secs(), 30);
        assert_eq!(REMOTE_THREAD_TIMEOUT.as_millis(), 5000);
    }
}
