/// Fixed-interval gate for reconnection attempts.
#[derive(Debug, Clone)]
pub struct RetryThrottle {
    last_attempt_ms: Option<u64>,
    interval_ms: u64,
}

impl RetryThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self { last_attempt_ms: None, interval_ms }
    }

    /// Never attempted, or at least one interval since the last attempt.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            Some(t) => now_ms.saturating_sub(t) >= self.interval_ms,
            None => true,
        }
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
    }

    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }
}
