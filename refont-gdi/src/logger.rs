//! Process-wide logger, dispatching to a file next to the module.

use std::path::Path;
use std::time::SystemTime;

pub use log::LevelFilter;
use parking_lot::Once;

pub struct GlobalLogger {}

static LOGGER_INITIALIZED: Once = Once::new();

impl GlobalLogger {
    /// Initializes the fern dispatch exactly once. Starts at `Info`;
    /// [`GlobalLogger::enable_debug`] raises the level once the settings
    /// say so. Failure to set up logging is swallowed - diagnostics are
    /// best-effort and must never stop the attach.
    pub fn init(log_path: &Path) {
        LOGGER_INITIALIZED.call_once(|| {
            if let Err(err) = Self::setup(log_path) {
                let _ = std::fs::write(
                    log_path.with_extension("log.err"),
                    format!("failed to initialize logger: {err:?}"),
                );
            }
        });
    }

    /// Turns on the per-call interception records.
    pub fn enable_debug() {
        log::set_max_level(LevelFilter::Debug);
    }

    fn setup(log_path: &Path) -> Result<(), fern::InitError> {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{} {} {}] {}",
                    humantime::format_rfc3339_seconds(SystemTime::now()),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(LevelFilter::Debug)
            .chain(fern::log_file(log_path)?)
            .apply()?;

        log::set_max_level(LevelFilter::Info);

        Ok(())
    }
}
