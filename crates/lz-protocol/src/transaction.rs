//! The unit of work written to a device

use std::time::Duration;

/// Default confirmation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// One write to a device plus its delivery policy
///
/// A transaction is immutable once built. The writer makes at most
/// `retry_count + 1` attempts, waiting up to `timeout` for a confirmation
/// after each one when `expect_confirmation` is set, and pauses for
/// `post_write_delay` after every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    payload: Vec<u8>,
    expect_confirmation: bool,
    timeout: Duration,
    retry_count: u32,
    post_write_delay: Duration,
}

impl Transaction {
    /// Fire-and-forget transaction with default timing
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            expect_confirmation: false,
            timeout: DEFAULT_TIMEOUT,
            retry_count: 0,
            post_write_delay: Duration::ZERO,
        }
    }

    /// Require a device confirmation before the attempt counts as sent
    pub fn with_confirmation(mut self) -> Self {
        self.expect_confirmation = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_post_write_delay(mut self, delay: Duration) -> Self {
        self.post_write_delay = delay;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn expect_confirmation(&self) -> bool {
        self.expect_confirmation
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Total number of write attempts the writer may make
    pub fn attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    pub fn post_write_delay(&self) -> Duration {
        self.post_write_delay
    }
}
