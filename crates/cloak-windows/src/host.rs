use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use cloak_core::{CloakResult, ProcessInspector, ProcessRecord, SupervisorHost, WindowHandle};

use crate::{enumerate, mutex, process};

/// Process creation flags for a relaunched app.
///
/// `CREATE_NEW_PROCESS_GROUP` (0x200) keeps console signals sent to the
/// supervisor away from the app. `DETACHED_PROCESS` (0x8) starts it
/// without the supervisor's console, so it outlives the supervisor.
const DETACH_FLAGS: u32 = 0x00000200 | 0x00000008;

/// Live Win32 services used by the supervisor.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Host;

impl ProcessInspector for Win32Host {
    fn list_processes(&self) -> CloakResult<Vec<ProcessRecord>> {
        process::list_processes()
    }

    fn visible_windows(&self, pid: u32) -> Vec<WindowHandle> {
        enumerate::visible_windows(pid)
    }
}

impl SupervisorHost for Win32Host {
    fn mutex_exists(&self, name: &str) -> bool {
        mutex::mutex_exists(name)
    }

    fn launch_detached(&self, exe: &Path, args: &[&str]) -> CloakResult<u32> {
        let working_dir = exe.parent().unwrap_or_else(|| Path::new("."));

        let mut child = Command::new(exe)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(DETACH_FLAGS)
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", exe.display()))?;

        let pid = child.id();
        // Acknowledge without blocking; the child runs on after we drop it.
        let _ = child.try_wait();
        Ok(pid)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_sees_its_own_process() {
        // Arrange
        let host = Win32Host;
        let own = std::env::current_exe().unwrap();
        let name = own.file_name().unwrap().to_str().unwrap();

        // Act
        let running = host.is_process_running(name);

        // Assert
        assert!(running);
    }

    #[test]
    fn launch_of_missing_executable_fails() {
        let host = Win32Host;
        let result = host.launch_detached(Path::new(r"C:\no\such\cloak-app.exe"), &[]);
        assert!(result.is_err());
    }
}
