//! Named kernel mutexes.
//!
//! The supervisor holds one to stay single-instance per session, and
//! probes the app's to detect that it is alive.

use cloak_core::CloakResult;

use windows::Win32::Foundation::{ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
use windows::Win32::System::Threading::{CreateMutexW, OpenMutexW, SYNCHRONIZATION_SYNCHRONIZE};
use windows::core::HSTRING;

use crate::process::HandleGuard;

/// An owned named mutex marking this process as the only instance.
///
/// Released when dropped.
pub struct SingleInstance {
    _handle: HandleGuard,
}

impl SingleInstance {
    /// Creates and owns the named mutex.
    ///
    /// Returns `Ok(None)` when another process already holds it.
    pub fn acquire(name: &str) -> CloakResult<Option<Self>> {
        let wide = HSTRING::from(name);

        // SAFETY: CreateMutexW creates or opens a named mutex. The handle
        // is owned by the guard either way.
        let handle: HANDLE = unsafe { CreateMutexW(None, true, &wide)? };
        // SAFETY: read immediately after the call that set it.
        let already_exists = unsafe { GetLastError() } == ERROR_ALREADY_EXISTS;
        let guard = HandleGuard(handle);

        if already_exists {
            drop(guard);
            return Ok(None);
        }
        Ok(Some(Self { _handle: guard }))
    }
}

/// Returns whether a mutex with this name exists in the session.
pub fn mutex_exists(name: &str) -> bool {
    let wide = HSTRING::from(name);

    // SAFETY: OpenMutexW only opens an existing object; the handle is
    // closed immediately.
    match unsafe { OpenMutexW(SYNCHRONIZATION_SYNCHRONIZE, false, &wide) } {
        Ok(handle) => {
            drop(HandleGuard(handle));
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_reports_existing_instance() {
        // Arrange
        let name = format!("CloakTestMutex-{}", std::process::id());
        let first = SingleInstance::acquire(&name).unwrap();

        // Act
        let second = SingleInstance::acquire(&name).unwrap();

        // Assert
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(mutex_exists(&name));
    }

    #[test]
    fn unknown_mutex_does_not_exist() {
        assert!(!mutex_exists("CloakTestMutex-never-created"));
    }
}
