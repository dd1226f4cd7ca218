//! Capability module loaded into a target process.
//!
//! Display affinity can only be changed by the process that owns the
//! window, so these exports run inside the target on a thread started by
//! the controller. Nothing here allocates or touches state beyond the
//! windows being toggled.

#![cfg(windows)]

use std::ffi::c_void;

use windows::Win32::Foundation::{HMODULE, HWND, LPARAM};
use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;
use windows::Win32::System::Threading::GetCurrentProcessId;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, IsWindow, IsWindowVisible, SetWindowDisplayAffinity,
    WDA_EXCLUDEFROMCAPTURE, WDA_NONE, WINDOW_DISPLAY_AFFINITY,
};
use windows::core::BOOL;

/// Affinity applied for a hide or show request.
pub fn affinity_for(hide: bool) -> WINDOW_DISPLAY_AFFINITY {
    if hide { WDA_EXCLUDEFROMCAPTURE } else { WDA_NONE }
}

/// Excludes one window from capture, or restores normal capture.
///
/// Returns `TRUE` on success, `FALSE` if the handle is not a window or the
/// system refused the change.
#[unsafe(no_mangle)]
pub extern "system" fn set_window_visibility(hwnd: HWND, hide: BOOL) -> BOOL {
    // SAFETY: both calls validate the handle themselves.
    unsafe {
        if !IsWindow(Some(hwnd)).as_bool() {
            return BOOL(0);
        }
        SetWindowDisplayAffinity(hwnd, affinity_for(hide.as_bool())).is_ok().into()
    }
}

/// Thread entry point: toggles every visible top-level window owned by
/// the host process.
///
/// `param` is the hide flag (nonzero hides). Returns how many windows
/// were changed, which becomes the thread's exit code.
#[unsafe(no_mangle)]
pub extern "system" fn hide_all_windows_of_host_process(param: *mut c_void) -> u32 {
    let mut sweep = Sweep {
        // SAFETY: no preconditions.
        pid: unsafe { GetCurrentProcessId() },
        hide: !param.is_null(),
        changed: 0,
    };

    // SAFETY: EnumWindows runs synchronously and `sweep` outlives it.
    let _ = unsafe { EnumWindows(Some(sweep_callback), LPARAM(&mut sweep as *mut _ as isize)) };

    sweep.changed
}

struct Sweep {
    pid: u32,
    hide: bool,
    changed: u32,
}

unsafe extern "system" fn sweep_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the Sweep owned by hide_all_windows_of_host_process.
    let sweep = unsafe { &mut *(lparam.0 as *mut Sweep) };

    let mut owner = 0u32;
    // SAFETY: queries on a handle supplied by EnumWindows.
    let visible = unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut owner));
        IsWindowVisible(hwnd).as_bool()
    };

    if owner == sweep.pid && visible && set_window_visibility(hwnd, sweep.hide.into()).as_bool() {
        sweep.changed += 1;
    }
    BOOL(1)
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
extern "system" fn DllMain(module: HMODULE, reason: u32, _reserved: *mut c_void) -> BOOL {
    if reason == DLL_PROCESS_ATTACH {
        // SAFETY: called with our own module handle during attach.
        let _ = unsafe { DisableThreadLibraryCalls(module) };
    }
    BOOL(1)
}
