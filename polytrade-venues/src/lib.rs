#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Concrete venue adapters: the seam a worker calls into for every
//! network-facing operation, and the four wire formats of §1's venue
//! kinds (CEX derivatives, DEX perp, prediction-market CLOB, DEX
//! aggregator).

pub mod adapter;
pub mod cex_derivatives;
pub mod clob_pm;
pub mod dex_aggregator;
pub mod dex_perp;

pub use adapter::{
    AccountHydration, OrderRequest, OrderUpdateRequest, PositionMetadata, PublicSnapshot,
    VenueAdapter,
};
pub use cex_derivatives::CexDerivativesAdapter;
pub use clob_pm::ClobPmAdapter;
pub use dex_aggregator::{DexAggregatorAdapter, Route};
pub use dex_perp::DexPerpAdapter;
