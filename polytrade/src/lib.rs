#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

//! Facade over the polytrade ecosystem crates: pull in this one dependency
//! to get the store, transport, execution pipeline, venue adapters,
//! strategy engines, and the worker that wires them together.

pub use polytrade_core as core;
pub use polytrade_execution as execution;
pub use polytrade_store as store;
pub use polytrade_strategy as strategy;
pub use polytrade_transport as transport;
pub use polytrade_venues as venues;
pub use polytrade_worker as worker;

pub use polytrade_core::{ReconnectConfig, VenueCredentials, WorkerConfig, WorkerError};
pub use polytrade_store::{Command, Path, Store};
pub use polytrade_venues::adapter::VenueAdapter;
pub use polytrade_worker::{Worker, WorkerCommand, WorkerEvent, WorkerHandle};
