//! Timestamped lock markers shared with the installer and the app.
//!
//! A marker is a small file in the data directory whose presence and age
//! say that a protected operation is (recently) underway. Markers older
//! than their kind's threshold are treated as left behind by a crashed
//! writer: readers ignore and delete them.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{RESTART_MARKER_STALE_AFTER, UPDATE_MARKER_STALE_AFTER};
use crate::{CloakResult, log_debug, log_info, log_warn};

/// The two marker kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Written by the installer while it replaces files.
    Update,
    /// Written by the supervisor while it relaunches the app.
    Restart,
}

impl MarkerKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Update => ".update_in_progress",
            Self::Restart => ".restart_pending",
        }
    }

    /// Age past which the marker is considered stale.
    pub fn stale_after(self) -> Duration {
        match self {
            Self::Update => UPDATE_MARKER_STALE_AFTER,
            Self::Restart => RESTART_MARKER_STALE_AFTER,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Update => "Update",
            Self::Restart => "Restart",
        }
    }
}

/// Payload of the restart marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartMarker {
    /// Unix seconds at creation.
    pub timestamp: u64,
    pub pid: u32,
}

/// Payload of the update marker, as written by the installer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMarker {
    /// Unix seconds at creation.
    #[serde(default)]
    pub started_at: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub pid: u32,
}

/// The directory holding both markers.
#[derive(Debug, Clone)]
pub struct LockDir {
    dir: PathBuf,
}

impl LockDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, kind: MarkerKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Returns whether a fresh marker of `kind` exists.
    ///
    /// A marker older than the kind's threshold is deleted and reported
    /// as inactive.
    pub fn is_active(&self, kind: MarkerKind) -> bool {
        self.is_active_at(kind, SystemTime::now())
    }

    fn is_active_at(&self, kind: MarkerKind, now: SystemTime) -> bool {
        let path = self.path(kind);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return false,
            Err(e) => {
                log_warn!("Could not read {} marker: {e}", kind.label());
                return false;
            }
        };

        // A timestamp in the future counts as brand new.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > kind.stale_after() {
            log_info!("{} lock file is stale, removing", kind.label());
            remove_quietly(&path);
            return false;
        }

        if kind == MarkerKind::Update {
            match self.read_update_marker() {
                Some(m) => log_info!(
                    "Update in progress: version {}, pid {}, started at {}",
                    m.version,
                    m.pid,
                    m.started_at
                ),
                None => log_info!("Update in progress detected"),
            }
        }
        true
    }

    /// Writes a fresh restart marker, replacing any existing one.
    pub fn create_restart_marker(&self) -> CloakResult<()> {
        let marker = RestartMarker {
            timestamp: unix_now(),
            pid: std::process::id(),
        };
        self.write(MarkerKind::Restart, &serde_json::to_string(&marker)?)
    }

    /// Deletes the restart marker. Absence is not an error.
    pub fn remove_restart_marker(&self) {
        remove_quietly(&self.path(MarkerKind::Restart));
    }

    /// Writes a fresh update marker for `version`, replacing any existing one.
    pub fn create_update_marker(&self, version: &str) -> CloakResult<()> {
        let marker = UpdateMarker {
            started_at: unix_now(),
            version: version.to_string(),
            pid: std::process::id(),
        };
        self.write(MarkerKind::Update, &serde_json::to_string(&marker)?)
    }

    /// Deletes the update marker. Absence is not an error.
    pub fn remove_update_marker(&self) {
        remove_quietly(&self.path(MarkerKind::Update));
    }

    /// Parses the update marker payload, if present and well-formed.
    pub fn read_update_marker(&self) -> Option<UpdateMarker> {
        let content = fs::read_to_string(self.path(MarkerKind::Update)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Parses the restart marker payload, if present and well-formed.
    pub fn read_restart_marker(&self) -> Option<RestartMarker> {
        let content = fs::read_to_string(self.path(MarkerKind::Restart)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write(&self, kind: MarkerKind, payload: &str) -> CloakResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(kind), payload)?;
        log_debug!("{} marker written", kind.label());
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log_warn!("Could not remove {}: {e}", path.display()),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    /// Creates a marker file whose last-write time is `age` in the past.
    fn write_aged(locks: &LockDir, kind: MarkerKind, age: Duration) -> PathBuf {
        let path = locks.path(kind);
        fs::write(&path, "{}").unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn missing_marker_is_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());

        assert!(!locks.is_active(MarkerKind::Update));
        assert!(!locks.is_active(MarkerKind::Restart));
    }

    #[test]
    fn update_marker_eleven_minutes_old_is_stale_and_removed() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        let path = write_aged(&locks, MarkerKind::Update, Duration::from_secs(11 * 60));

        // Act
        let active = locks.is_active(MarkerKind::Update);

        // Assert
        assert!(!active);
        assert!(!path.exists());
    }

    #[test]
    fn restart_marker_thirty_one_seconds_old_is_stale_and_removed() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        let path = write_aged(&locks, MarkerKind::Restart, Duration::from_secs(31));

        // Act
        let active = locks.is_active(MarkerKind::Restart);

        // Assert
        assert!(!active);
        assert!(!path.exists());
    }

    #[test]
    fn stale_check_is_idempotent() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        write_aged(&locks, MarkerKind::Restart, Duration::from_secs(45));

        // Act
        let first = locks.is_active(MarkerKind::Restart);
        let second = locks.is_active(MarkerKind::Restart);

        // Assert
        assert!(!first);
        assert!(!second);
    }

    #[test]
    fn fresh_update_marker_is_active_and_kept() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        let path = write_aged(&locks, MarkerKind::Update, Duration::from_secs(9 * 60));

        // Act / Assert
        assert!(locks.is_active(MarkerKind::Update));
        assert!(path.exists());
    }

    #[test]
    fn unparsable_update_marker_still_counts_as_active() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        fs::write(locks.path(MarkerKind::Update), "not json").unwrap();

        assert!(locks.is_active(MarkerKind::Update));
    }

    #[test]
    fn thresholds_apply_per_kind() {
        // Arrange: a 60 s old marker is stale for restart, fresh for update.
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        let now = SystemTime::now();
        fs::write(locks.path(MarkerKind::Update), "{}").unwrap();
        fs::write(locks.path(MarkerKind::Restart), "{}").unwrap();
        let later = now + Duration::from_secs(60);

        // Act / Assert
        assert!(locks.is_active_at(MarkerKind::Update, later));
        assert!(!locks.is_active_at(MarkerKind::Restart, later));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        fs::write(locks.path(MarkerKind::Restart), "{}").unwrap();

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        assert!(locks.is_active_at(MarkerKind::Restart, earlier));
    }

    #[test]
    fn restart_marker_records_pid_and_overwrites() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        fs::write(locks.path(MarkerKind::Restart), "garbage").unwrap();

        // Act
        locks.create_restart_marker().unwrap();

        // Assert
        let marker = locks.read_restart_marker().unwrap();
        assert_eq!(marker.pid, std::process::id());
        assert!(marker.timestamp > 0);
        assert!(locks.is_active(MarkerKind::Restart));
    }

    #[test]
    fn removing_absent_restart_marker_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());

        locks.remove_restart_marker();
        locks.create_restart_marker().unwrap();
        locks.remove_restart_marker();

        assert!(!locks.path(MarkerKind::Restart).exists());
    }

    #[test]
    fn update_marker_roundtrips_version() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());

        // Act
        locks.create_update_marker("2.4.1").unwrap();

        // Assert
        let marker = locks.read_update_marker().unwrap();
        assert_eq!(marker.version, "2.4.1");
        locks.remove_update_marker();
        assert!(!locks.is_active(MarkerKind::Update));
    }
}
