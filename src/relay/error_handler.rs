use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// What the loop does when a fetch fails
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPolicy {
    /// First failure ends the relay
    Fatal,
    /// Back off and retry; fatal once retries run out
    Retry {
        initial_delay: Duration,
        max_delay: Duration,
        max_retries: u32,
    },
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy::Fatal
    }
}

impl FetchPolicy {
    /// Backoff state for this policy, `None` when failures are fatal
    pub fn backoff(&self) -> Option<ExponentialBackoff> {
        match self {
            FetchPolicy::Fatal => None,
            FetchPolicy::Retry {
                initial_delay,
                max_delay,
                max_retries,
            } => Some(ExponentialBackoff::new(*initial_delay, *max_delay, *max_retries)),
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, before jitter: `initial * 2^attempt`, capped at max
    pub fn base_delay(&self) -> Duration {
        let factor = 2_u32.saturating_pow(self.current_attempt);
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Consume one attempt and return how long to wait before it
    ///
    /// Adds up to 10% random jitter on top of the base delay, never exceeding max.
    pub fn next_delay(&mut self) -> Result<Duration, MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let base = self.base_delay();
        let jitter_ms = (base.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };

        self.current_attempt += 1;
        Ok(std::cmp::min(base + jitter, self.max_delay.max(base)))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay()?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {:.1}s",
            self.current_attempt,
            self.max_retries,
            delay.as_secs_f64()
        );

        sleep(delay).await;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
