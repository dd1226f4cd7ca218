use cloak_core::WindowHandle;

use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{EnumWindows, GetWindowThreadProcessId, IsWindowVisible};
use windows::core::BOOL;

/// Callback state: the pid we want and the windows found so far.
struct Search {
    pid: u32,
    found: Vec<WindowHandle>,
}

/// Enumerates the visible top-level windows owned by `pid`.
///
/// Order is whatever `EnumWindows` yields; callers may only rely on the
/// first entry existing. Enumeration failures yield an empty list.
pub fn visible_windows(pid: u32) -> Vec<WindowHandle> {
    let mut search = Search {
        pid,
        found: Vec::new(),
    };

    // SAFETY: EnumWindows calls our callback for each top-level window.
    // We pass a pointer to our Search as LPARAM. This is safe because
    // EnumWindows runs synchronously and `search` outlives the call.
    let result = unsafe {
        EnumWindows(
            Some(enum_window_callback),
            LPARAM(&mut search as *mut _ as isize),
        )
    };
    if let Err(e) = result {
        cloak_core::log_warn!("EnumWindows failed for PID {pid}: {e}");
    }

    search.found
}

/// Callback invoked by `EnumWindows` for each top-level window.
///
/// Returns `TRUE` to continue enumeration.
unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is a pointer to the Search owned by visible_windows().
    let search = unsafe { &mut *(lparam.0 as *mut Search) };

    let mut owner: u32 = 0;
    // SAFETY: simple queries on a window handle supplied by EnumWindows.
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut owner));
        if owner == search.pid && IsWindowVisible(hwnd).as_bool() {
            search.found.push(WindowHandle(hwnd.0 as usize));
        }
    }

    BOOL(1) // continue enumerating
}
