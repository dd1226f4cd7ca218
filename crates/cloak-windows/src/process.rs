use cloak_core::{CloakResult, ProcessRecord};

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
    Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};

/// RAII guard that closes a HANDLE on drop.
pub(crate) struct HandleGuard(pub(crate) HANDLE);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        // SAFETY: CloseHandle releases the handle. The guard owns
        // this handle exclusively.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Takes a snapshot of every running process.
///
/// Each call reflects the process table at that instant.
pub fn list_processes() -> CloakResult<Vec<ProcessRecord>> {
    // SAFETY: CreateToolhelp32Snapshot returns an owned snapshot handle,
    // closed by the guard on every exit path.
    let snapshot = HandleGuard(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)? });

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut processes = Vec::new();

    // SAFETY: entry is a properly sized PROCESSENTRY32W that the
    // iteration functions fill in place.
    unsafe {
        if Process32FirstW(snapshot.0, &mut entry).is_err() {
            return Ok(processes);
        }
        loop {
            processes.push(ProcessRecord::new(
                entry.th32ProcessID,
                wide_to_string(&entry.szExeFile),
            ));
            if Process32NextW(snapshot.0, &mut entry).is_err() {
                break;
            }
        }
    }

    Ok(processes)
}

/// Finds the base address of a module loaded in another process.
///
/// Matches `module_name` (e.g. `cloak_payload.dll`) case-insensitively
/// against the module's base name.
pub fn module_base(pid: u32, module_name: &str) -> CloakResult<Option<usize>> {
    // SAFETY: the snapshot handle is owned by the guard.
    let snapshot = HandleGuard(unsafe {
        CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)?
    });

    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };

    // SAFETY: entry is a properly sized MODULEENTRY32W.
    unsafe {
        if Module32FirstW(snapshot.0, &mut entry).is_err() {
            return Ok(None);
        }
        loop {
            if wide_to_string(&entry.szModule).eq_ignore_ascii_case(module_name) {
                return Ok(Some(entry.modBaseAddr as usize));
            }
            if Module32NextW(snapshot.0, &mut entry).is_err() {
                return Ok(None);
            }
        }
    }
}

/// Converts a NUL-terminated UTF-16 buffer to a `String`.
pub(crate) fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
