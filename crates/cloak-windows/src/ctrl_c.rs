//! Console control handler using `SetConsoleCtrlHandler`.
//!
//! Raises a stop flag so the supervisor loop can finish its current
//! wait slice and exit cleanly.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use cloak_core::CloakResult;

use windows::Win32::System::Console::{
    CTRL_BREAK_EVENT, CTRL_C_EVENT, CTRL_CLOSE_EVENT, SetConsoleCtrlHandler,
};

/// Global flag, written once by `install`, read by the callback.
static STOP: OnceLock<&'static AtomicBool> = OnceLock::new();

/// Registers a handler that sets `stop` on Ctrl+C, Ctrl+Break or console
/// close.
pub fn install(stop: &'static AtomicBool) -> CloakResult<()> {
    STOP.set(stop)
        .map_err(|_| "console control handler already registered")?;
    unsafe { SetConsoleCtrlHandler(Some(handler), true) }?;
    Ok(())
}

unsafe extern "system" fn handler(ctrl_type: u32) -> windows::core::BOOL {
    let handled = matches!(ctrl_type, CTRL_C_EVENT | CTRL_BREAK_EVENT | CTRL_CLOSE_EVENT);
    if handled && let Some(stop) = STOP.get() {
        stop.store(true, Ordering::SeqCst);
    }
    windows::core::BOOL(handled as i32)
}
