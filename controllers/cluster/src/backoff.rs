//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff for requeueing clusters whose reconcile
//! pass failed. It grows more slowly than exponential backoff, so a store that
//! is briefly unavailable is retried soon without hammering the API server
//! during a longer outage.
//!
//! With the default bounds of 5s and 300s the sequence is
//! 5s, 5s, 10s, 15s, 25s, 40s, 65s, 105s, 170s, 275s, 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds
    ///
    /// `min` is returned twice before the sequence starts growing.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(5), Duration::from_secs(300));

        let sequence: Vec<u64> = (0..11).map(|_| secs(&mut backoff)).collect();
        assert_eq!(sequence, [5, 5, 10, 15, 25, 40, 65, 105, 170, 275, 300]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(10));

        for _ in 0..6 {
            backoff.next_backoff();
        }
        // 1, 1, 2, 3, 5, 8 consumed; 13 is capped
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 10);
    }
}
