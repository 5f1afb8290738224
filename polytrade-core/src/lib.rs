#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Ambient stack shared by every `polytrade-*` crate: the error taxonomy,
//! logging setup, and per-venue configuration types.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ReconnectConfig, VenueCredentials, WorkerConfig};
pub use error::WorkerError;
