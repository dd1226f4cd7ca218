use cloak_core::config::{self, Config};

/// Opens `file_name` in the data directory as the process log.
///
/// Logging is skipped when the data directory can't be created.
pub fn init(config: &Config, file_name: &str) {
    match config::ensure_data_dir() {
        Ok(dir) => cloak_core::log::init(&config.logging, &dir.join(file_name)),
        Err(e) => eprintln!("Warning: logging disabled: {e}"),
    }
}
