use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("logging.format '{0}' is not one of text, json, journald")]
    InvalidFormat(String),
    #[error("logging.format = journald needs a linux build with the `journald` feature")]
    JournaldNotSupported,
    #[error("a global log subscriber is already installed")]
    AlreadyInitialized,
    #[error("log subscriber setup failed: {0}")]
    InitializationFailed(String),
    #[error("logging.level '{level}' is not a valid filter: {reason}")]
    InvalidLogLevel { level: String, reason: String },
}
