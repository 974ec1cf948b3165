//! Data model shared by the kiln controller crates.
//!
//! Everything here is plain data: node type catalog entries, queue snapshots, registry records.
//! No I/O happens in this crate.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;

pub mod naming;
pub use naming::{NAME_SEPARATOR, agent_name, id_from_name, is_managed_name};

mod time_serde;
