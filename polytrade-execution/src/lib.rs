#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Order submission pipeline: per-account rate-limited queue with priority
//! preemption, batch chunking, venue signing, and request/response
//! correlation by opaque request ids.

pub mod queue;
pub mod resolver;
pub mod signer;

pub use queue::{chunk_into_batches, drain, submission_interval, OrderQueue, QueuedBatch};
pub use resolver::{RequestId, ResolverMap, VenueResponse};
pub use signer::{AccountSigner, Signer};
