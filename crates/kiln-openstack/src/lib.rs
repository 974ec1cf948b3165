//! OpenStack implementation of the provider gateway.
//!
//! Talks to Keystone (v3 password auth), Nova, Glance and Cinder over their HTTP APIs.

mod auth;

mod config;
pub use config::OpenStackConfig;

mod errors;
pub use errors::OpenStackError;

mod provider;
pub use provider::OpenStackProvider;
