pub mod config;
pub mod ipc;
pub mod lock;
pub mod log;
pub mod process;
pub mod supervisor;
pub mod visibility;

pub use ipc::{Command, Response, ResponseStatus};
pub use lock::{LockDir, MarkerKind};
pub use process::{ProcessInspector, ProcessRecord, WindowHandle};
pub use supervisor::{CycleOutcome, Supervisor, SupervisorHost};
pub use visibility::{InjectionBackend, RemoteModule, UnsupportedBackend, VisibilityController};

/// A boxed error type for fallible operations.
///
/// Public operations on the controller and the supervisor never surface
/// this to their callers; they log and degrade to `false`/`0` instead.
pub type CloakResult<T> = Result<T, Box<dyn std::error::Error>>;
