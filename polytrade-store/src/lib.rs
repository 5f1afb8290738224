#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! Path-addressed mutation protocol and in-memory store: the only channel
//! through which worker state may change, and the data model it carries.

pub mod command;
pub mod model;
pub mod path;
pub mod store;

pub use command::{Command, StoreError};
pub use path::{Path, PathSegment};
pub use store::Store;
