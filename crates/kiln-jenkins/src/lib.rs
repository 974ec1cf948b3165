//! Jenkins implementation of the CI gateway.

mod client;
pub use client::JenkinsClient;

mod config;
pub use config::JenkinsConfig;

mod errors;
pub use errors::JenkinsError;

mod xml;
