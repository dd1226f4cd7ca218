use cloak_core::ProcessInspector;

use crate::platform;

pub fn execute(name: &str) {
    let backend = platform::backend();
    let pids = backend.find_process_ids(name);

    if pids.is_empty() {
        println!("{name}: not running.");
        return;
    }

    let windows: usize = pids.iter().map(|&pid| backend.visible_windows(pid).len()).sum();
    println!(
        "{name}: running ({} process(es), {windows} visible window(s)).",
        pids.len()
    );
}
