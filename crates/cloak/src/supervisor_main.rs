//! Availability supervisor: relaunches the desktop app when it is not
//! running and no update or restart is under way.

mod logging;

use clap::Parser;

#[cfg(windows)]
use cloak_core::CycleOutcome;
use cloak_core::config::{self, Config};

#[derive(Parser)]
#[command(
    name = "cloak-supervisor",
    version,
    about = "Keeps the Cloak desktop app running"
)]
struct Cli {
    /// Run a single availability check and exit
    #[arg(long, visible_alias = "verify")]
    check_once: bool,
}

fn main() {
    let cli = Cli::parse();
    let config = config::load();
    logging::init(&config, "supervisor.log");

    std::process::exit(run(&cli, config));
}

#[cfg(windows)]
fn run(cli: &Cli, config: Config) -> i32 {
    use std::sync::atomic::AtomicBool;

    use cloak_core::{LockDir, Supervisor, log_error, log_info};
    use cloak_windows::{SingleInstance, Win32Host};

    static STOP: AtomicBool = AtomicBool::new(false);

    let _instance = match SingleInstance::acquire(&config.supervisor.supervisor_mutex_name) {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            log_info!("Another supervisor instance is already running");
            return 0;
        }
        Err(e) => {
            log_error!("Failed to create the single-instance mutex: {e}");
            return 1;
        }
    };

    let (data_dir, app_dir) = match (config::ensure_data_dir(), config::exe_dir()) {
        (Ok(data), Ok(app)) => (data, app),
        (Err(e), _) | (_, Err(e)) => {
            log_error!("Supervisor cannot start: {e}");
            eprintln!("Error: {e}");
            return 1;
        }
    };

    log_info!("Supervisor started (PID {})", std::process::id());
    let supervisor = Supervisor::new(Win32Host, LockDir::new(data_dir), config.supervisor, app_dir);

    if cli.check_once {
        let outcome = supervisor.run_cycle();
        println!("{}", describe(&outcome));
        return exit_code(&outcome);
    }

    if let Err(e) = cloak_windows::ctrl_c::install(&STOP) {
        log_error!("Ctrl+C handler not installed: {e}");
    }
    supervisor.run_until(&STOP);
    0
}

#[cfg(not(windows))]
fn run(_cli: &Cli, _config: Config) -> i32 {
    eprintln!("cloak-supervisor is only supported on Windows.");
    1
}

/// One-line summary printed by `--check-once`.
#[cfg(windows)]
fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::UpdateInProgress => "Update in progress; no action taken.".into(),
        CycleOutcome::RestartPending => "Restart already pending; no action taken.".into(),
        CycleOutcome::InstallerRunning(name) => format!("Installer {name} running; no action taken."),
        CycleOutcome::AppRunning => "App is running.".into(),
        CycleOutcome::MissingExecutable(path) => format!("App executable not found: {}", path.display()),
        CycleOutcome::LaunchFailed(e) => format!("Relaunch failed: {e}"),
        CycleOutcome::Recovered { pid, confirmed: true } => format!("App relaunched (PID {pid})."),
        CycleOutcome::Recovered { pid, confirmed: false } => {
            format!("App launched (PID {pid}) but was not running after the settle time.")
        }
    }
}

#[cfg(windows)]
fn exit_code(outcome: &CycleOutcome) -> i32 {
    match outcome {
        CycleOutcome::MissingExecutable(_)
        | CycleOutcome::LaunchFailed(_)
        | CycleOutcome::Recovered { confirmed: false, .. } => 1,
        _ => 0,
    }
}
