//! Backoff schedule for reconnect attempts.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportOpts {
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
    pub backoff_factor: f64,
}

impl Default for TransportOpts {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            connection_timeout_ms: 5_000,
            backoff_factor: 2.0,
        }
    }
}

/// `min(retryDelay * backoffFactor^retryCount, maxRetryDelay)`, per the
/// reconnect schedule in the runtime's transport design.
pub fn next_delay(retry_count: u32, opts: &TransportOpts) -> Duration {
    let scaled = opts.retry_delay_ms as f64 * opts.backoff_factor.powi(retry_count as i32);
    let capped = scaled.min(opts.max_retry_delay_ms as f64);
    Duration::from_millis(capped.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt_within_cap() {
        let opts = TransportOpts::default();
        assert_eq!(next_delay(0, &opts), Duration::from_millis(1_000));
        assert_eq!(next_delay(1, &opts), Duration::from_millis(2_000));
        assert_eq!(next_delay(2, &opts), Duration::from_millis(4_000));
    }

    #[test]
    fn backoff_saturates_at_max_retry_delay() {
        let opts = TransportOpts::default();
        assert_eq!(next_delay(10, &opts), Duration::from_millis(30_000));
        assert_eq!(next_delay(100, &opts), Duration::from_millis(30_000));
    }
}
