#![cfg(windows)]

/// Ctrl+C handling for the console supervisor.
pub mod ctrl_c;

/// Top-level window enumeration by owning process.
pub mod enumerate;

/// Win32 implementation of the supervisor's host services.
pub mod host;

/// Remote module loading and remote entry-point invocation.
pub mod injector;

/// Named mutexes (single instance, liveness probe).
pub mod mutex;

/// Toolhelp32 process and module snapshots.
pub mod process;

pub use host::Win32Host;
pub use injector::Win32Injector;
pub use mutex::SingleInstance;
