//! Local dev stack supervisor: starts, stops, and inspects a fixed
//! set of services bound to known TCP ports. Liveness is always
//! derived from port occupancy; the on-disk pid ledger exists only
//! for cleanup across supervisor restarts.

pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod locator;
pub mod probe;
pub mod process;
pub mod status;
pub mod supervisor;

pub use error::{Error, Result};
