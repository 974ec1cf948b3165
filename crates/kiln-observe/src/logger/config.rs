use std::io::IsTerminal;

use serde::Deserialize;

use crate::logger::format::LoggerFormat;

/// HTTP stack crates held at `warn` unless the level names them explicitly.
pub const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// The `[logging]` section of the daemon config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `kiln_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Keep the Jenkins and OpenStack HTTP clients' internals out of the log.
    pub quiet_dependencies: bool,
    /// Buffered supervisor events before the journal starts dropping them.
    pub event_queue: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
            quiet_dependencies: true,
            event_queue: 1024,
        }
    }
}

impl LoggerConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// The filter directive to install: `level` plus a `warn` cap for each
    /// quiet dependency it does not mention.
    pub fn directive(&self) -> String {
        let level = self.level.trim().trim_end_matches(',');
        if !self.quiet_dependencies {
            return level.to_string();
        }
        let named: Vec<&str> = level
            .split(',')
            .filter_map(|d| d.split_once('=').map(|(target, _)| target.trim()))
            .collect();
        let mut parts = vec![level.to_string()];
        for &dep in QUIET_DEPENDENCIES {
            let module = format!("{dep}::");
            if !named.iter().any(|&t| t == dep || t.starts_with(&module)) {
                parts.push(format!("{dep}=warn"));
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join(",")
    }
}
