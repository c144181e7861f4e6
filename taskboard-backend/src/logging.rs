use env_logger::{Builder, Env};
use log::SetLoggerError;

/// Install the process-wide logger. `RUST_LOG` overrides the `info` default.
pub fn init() -> Result<(), SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
}
