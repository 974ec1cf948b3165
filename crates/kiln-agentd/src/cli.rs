use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kilnd", version, about = "Autoscaling controller for CI build agents")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "KILN_CONFIG", default_value = "/etc/kiln/kiln.toml")]
    pub config: PathBuf,

    /// Overrides `[logging] level`.
    #[arg(long, env = "KILN_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start the reconcile loops (default).
    Run,
    /// Print the node type a blocked reason resolves to, without contacting Jenkins.
    Resolve {
        /// Blocked reason as shown in the Jenkins queue.
        reason: String,
    },
    /// Validate the configuration and exit.
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default() {
        let cli = Cli::try_parse_from(["kilnd", "--config", "/tmp/kiln.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/kiln.toml"));
        assert_eq!(cli.command, None);
    }

    #[test]
    fn resolve_takes_the_reason() {
        let cli = Cli::try_parse_from([
            "kilnd",
            "resolve",
            "Waiting for next available executor on centos7",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Resolve {
                reason: "Waiting for next available executor on centos7".into()
            })
        );
    }
}
