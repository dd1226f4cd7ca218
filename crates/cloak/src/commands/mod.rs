pub mod hide;
pub mod lock;
pub mod serve;
pub mod status;
pub mod windows;

use cloak_core::VisibilityController;
use cloak_core::config::{self, Config};

use crate::platform::{self, Backend};

/// Builds a controller pointed at the payload next to this executable.
///
/// The controller is returned uninitialized when the payload is missing;
/// callers decide whether that is fatal.
pub fn controller(config: &Config) -> VisibilityController<Backend> {
    let mut controller = VisibilityController::new(platform::backend());
    match config::exe_dir() {
        Ok(dir) => {
            controller.initialize(&dir.join(&config.visibility.payload_file));
        }
        Err(e) => cloak_core::log_error!("Cannot locate the executable directory: {e}"),
    }
    controller
}
