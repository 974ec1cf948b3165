mod config;
mod error;
mod format;
mod log;

pub use config::{LoggerConfig, QUIET_DEPENDENCIES};
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the global subscriber described by `cfg` and return the filter
/// directive that ended up in effect.
pub fn logger_init(cfg: &LoggerConfig) -> Result<String, LoggerError> {
    let directive = cfg.directive();
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg, &directive)?,
        LoggerFormat::Json => log::Logger::json(cfg, &directive)?,
        LoggerFormat::Journald => log::Logger::journald(&directive)?,
    }
    Ok(directive)
}
