#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! TWAP and Chase execution strategy engines, and the `StrategyHost` seam
//! they call back into — implemented by a worker, not the reverse, so
//! this crate never depends on one.

pub mod chase;
pub mod host;
pub mod lots;
pub mod twap;

pub use chase::{target_price, ChaseControl, ChaseEngine, ChaseOpts};
pub use host::{StrategyHost, StrategyOrderRequest};
pub use lots::{base_interval_ms, compute_lots, next_fire_at_ms};
pub use twap::{TwapControl, TwapEngine, TwapOpts};
