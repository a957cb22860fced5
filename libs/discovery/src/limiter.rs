//! Allocation pacing for allocate-style providers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::DiscoveryError;

/// Enforces a minimum spacing between allocation calls.
///
/// Each caller reserves the next free slot under a mutex and then waits
/// out its computed delay, or aborts when its cancellation fires.
pub struct AllocationLimiter {
    min_interval: Duration,
    next_allocate: Mutex<Option<Instant>>,
}

impl AllocationLimiter {
    pub fn new(min_interval: Duration) -> Self {
        AllocationLimiter {
            min_interval,
            next_allocate: Mutex::new(None),
        }
    }

    /// Reserve the next allocation slot, returning how long the caller
    /// must wait before using it.
    fn reserve(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }
        let mut next = self.next_allocate.lock().expect("limiter lock");
        let now = Instant::now();
        let wait = match *next {
            Some(at) if at > now => at - now,
            _ => Duration::ZERO,
        };
        *next = Some(now + wait + self.min_interval);
        wait
    }

    /// Wait for an allocation slot or abort on cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), DiscoveryError> {
        let delay = self.reserve();
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(DiscoveryError::AllocationCanceled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reservation_is_immediate() {
        let limiter = AllocationLimiter::new(Duration::from_secs(1));
        assert_eq!(limiter.reserve(), Duration::ZERO);
    }

    #[test]
    fn subsequent_reservations_space_out() {
        let limiter = AllocationLimiter::new(Duration::from_millis(100));
        assert_eq!(limiter.reserve(), Duration::ZERO);
        let second = limiter.reserve();
        assert!(second > Duration::from_millis(50));
        let third = limiter.reserve();
        assert!(third > second);
    }

    #[test]
    fn zero_interval_never_waits() {
        let limiter = AllocationLimiter::new(Duration::ZERO);
        for _ in 0..5 {
            assert_eq!(limiter.reserve(), Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let limiter = AllocationLimiter::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        cancel.cancel();
        let err = limiter.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::AllocationCanceled));
    }
}
