use cloak_core::config;
use cloak_core::{LockDir, MarkerKind};

fn lock_dir() -> LockDir {
    match config::ensure_data_dir() {
        Ok(dir) => LockDir::new(dir),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn status() {
    let locks = lock_dir();

    // is_active also clears stale markers.
    if locks.is_active(MarkerKind::Update) {
        let version = locks
            .read_update_marker()
            .map(|m| m.version)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown version".into());
        println!("Update in progress ({version}).");
    } else {
        println!("No update in progress.");
    }

    if locks.is_active(MarkerKind::Restart) {
        let pid = locks.read_restart_marker().map_or(0, |m| m.pid);
        println!("Restart pending (supervisor PID {pid}).");
    } else {
        println!("No restart pending.");
    }
}

pub fn begin(version: &str) {
    let locks = lock_dir();
    if let Err(e) = locks.create_update_marker(version) {
        eprintln!("Error: failed to write {}: {e}", locks.path(MarkerKind::Update).display());
        std::process::exit(1);
    }
    println!("Update marker written for {version}.");
}

pub fn end() {
    lock_dir().remove_update_marker();
    println!("Update marker cleared.");
}
