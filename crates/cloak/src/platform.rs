//! Selects the live backend for the current target.

#[cfg(windows)]
pub type Backend = cloak_windows::Win32Injector;

#[cfg(not(windows))]
pub type Backend = cloak_core::UnsupportedBackend;

pub fn backend() -> Backend {
    Backend::default()
}
