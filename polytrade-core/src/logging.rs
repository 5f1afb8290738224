//! # Logging configuration
//!
//! Standardized logging setup shared by every binary/test harness in the
//! workspace. `RUST_LOG` controls the filter; defaults to `info`.
//!
//! ```rust,ignore
//! use polytrade_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("runtime started");
//! }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize human-readable logging to stdout.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Initialize JSON logging, for shipping to a log aggregator.
pub fn init_json_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .try_init();
}
