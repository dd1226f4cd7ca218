use cloak_core::ProcessInspector;

use crate::platform;

pub fn execute(name: &str) {
    let backend = platform::backend();
    let pids = backend.find_process_ids(name);

    if pids.is_empty() {
        println!("No running process matches '{name}'.");
        return;
    }

    println!("{:<8} {:<18}", "PID", "Window");
    println!("{}", "-".repeat(27));
    for pid in pids {
        let windows = backend.visible_windows(pid);
        if windows.is_empty() {
            println!("{pid:<8} (no visible windows)");
        }
        for window in windows {
            println!("{pid:<8} 0x{:<16X}", window.0);
        }
    }
}
