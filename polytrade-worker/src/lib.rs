#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! The per-venue exchange worker: state machine, command/event dispatch,
//! and the wiring that turns a [`polytrade_venues::VenueAdapter`] plus a
//! [`polytrade_store::Store`] into a running task.

pub mod command;
pub mod event;
pub mod mock;
pub mod worker;

pub use command::{OrderSpec, OrderUpdateSpec, RequestId, WorkerCommand};
pub use event::WorkerEvent;
pub use mock::MockVenueAdapter;
pub use worker::{SubmissionBatch, Worker, WorkerHandle, WorkerState};
