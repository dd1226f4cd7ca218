//! Availability supervisor: relaunches the app when it stops running.
//!
//! Each cycle is synchronous and keeps no state beyond the lock markers
//! on disk:
//!
//! ```text
//! update marker active?   -> skip
//! restart marker active?  -> skip
//! installer running?      -> skip
//! app detected?           -> idle
//! otherwise               -> recover (marker, launch, settle, re-check, unmark)
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{CHECK_INTERVAL, LAUNCH_SETTLE_TIME, RESTART_FLAGS, SupervisorConfig};
use crate::lock::{LockDir, MarkerKind};
use crate::process::ProcessInspector;
use crate::{CloakResult, log_error, log_info, log_warn};

/// Granularity at which the loop notices a stop request while sleeping.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// OS services the supervisor needs beyond process inspection.
pub trait SupervisorHost: ProcessInspector {
    /// Whether a named mutex with this name currently exists.
    fn mutex_exists(&self, name: &str) -> bool;

    /// Starts `exe` detached from this process and returns its pid.
    fn launch_detached(&self, exe: &Path, args: &[&str]) -> CloakResult<u32>;

    fn sleep(&self, duration: Duration);
}

/// What a single cycle decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    UpdateInProgress,
    RestartPending,
    InstallerRunning(String),
    AppRunning,
    MissingExecutable(PathBuf),
    LaunchFailed(String),
    /// The app was launched; `confirmed` is the post-launch liveness check.
    Recovered { pid: u32, confirmed: bool },
}

pub struct Supervisor<H> {
    host: H,
    locks: LockDir,
    config: SupervisorConfig,
    /// Directory the app executable is expected in.
    app_dir: PathBuf,
}

impl<H: SupervisorHost> Supervisor<H> {
    pub fn new(host: H, locks: LockDir, config: SupervisorConfig, app_dir: PathBuf) -> Self {
        Self {
            host,
            locks,
            config,
            app_dir,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn app_path(&self) -> PathBuf {
        self.app_dir.join(&self.config.app_exe_name)
    }

    /// Runs cycles every [`CHECK_INTERVAL`] until `stop` is set.
    ///
    /// A failed cycle never ends the loop.
    pub fn run_until(&self, stop: &AtomicBool) {
        log_info!("Check interval: {}s", CHECK_INTERVAL.as_secs());
        while !stop.load(Ordering::Relaxed) {
            self.run_cycle();
            self.sleep_unless_stopped(CHECK_INTERVAL, stop);
        }
        log_info!("Supervisor loop stopped");
    }

    /// Performs one check and, if needed, one recovery.
    pub fn run_cycle(&self) -> CycleOutcome {
        log_info!("Performing availability check...");

        if self.locks.is_active(MarkerKind::Update) {
            log_info!("Update in progress, skipping check");
            return CycleOutcome::UpdateInProgress;
        }
        if self.locks.is_active(MarkerKind::Restart) {
            log_info!("Restart already pending, skipping");
            return CycleOutcome::RestartPending;
        }
        if let Some(installer) = self.host.find_running(&self.config.installer_patterns) {
            log_info!("Installer is running ({}), skipping check", installer.exe_name);
            return CycleOutcome::InstallerRunning(installer.exe_name);
        }
        if self.is_app_running() {
            log_info!("App is running normally");
            return CycleOutcome::AppRunning;
        }

        log_warn!("App is NOT running, initiating recovery...");
        self.recover()
    }

    /// Either signal is sufficient: the app's mutex or its process name.
    pub fn is_app_running(&self) -> bool {
        if self.host.mutex_exists(&self.config.app_mutex_name) {
            log_info!("App detected via mutex");
            return true;
        }
        if self.host.is_process_running(&self.config.app_exe_name) {
            log_info!("App detected via process list");
            return true;
        }
        log_info!("App not detected by any method");
        false
    }

    fn recover(&self) -> CycleOutcome {
        if let Err(e) = self.locks.create_restart_marker() {
            log_error!("Could not write restart marker: {e}");
        }
        let outcome = self.launch_and_verify();
        self.locks.remove_restart_marker();
        outcome
    }

    fn launch_and_verify(&self) -> CycleOutcome {
        let app = self.app_path();
        if !app.is_file() {
            log_error!("App executable not found at: {}", app.display());
            return CycleOutcome::MissingExecutable(app);
        }

        log_info!("Starting app: {}", app.display());
        let pid = match self.host.launch_detached(&app, &RESTART_FLAGS) {
            Ok(pid) => pid,
            Err(e) => {
                log_error!("Failed to start app: {e}");
                return CycleOutcome::LaunchFailed(e.to_string());
            }
        };
        log_info!("App started with PID: {pid}");

        self.host.sleep(LAUNCH_SETTLE_TIME);
        let confirmed = self.is_app_running();
        if confirmed {
            log_info!("App recovery successful");
        } else {
            log_warn!("App may not have started properly");
        }
        CycleOutcome::Recovered { pid, confirmed }
    }

    fn sleep_unless_stopped(&self, total: Duration, stop: &AtomicBool) {
        let mut remaining = total;
        while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
            let slice = remaining.min(SLEEP_SLICE);
            self.host.sleep(slice);
            remaining -= slice;
        }
    }
}
