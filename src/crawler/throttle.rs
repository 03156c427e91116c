//! Global minimum-interval request gate
//!
//! One gate is shared by every request a fetcher issues. Callers are admitted
//! one at a time; each admission waits until `interval` has passed since the
//! later of the previous admission and the previous completion.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct GateState {
    last: Option<Instant>,
    interval: Duration,
}

/// Shared rate gate with a runtime-adjustable interval
#[derive(Debug)]
pub struct RateGate {
    state: Mutex<GateState>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                last: None,
                interval,
            }),
        }
    }

    /// Waits for this caller's turn and returns the recorded admission time
    ///
    /// The lock is held through the sleep so concurrent callers queue up
    /// behind each other instead of all waking at the same deadline.
    pub async fn wait(&self) -> Instant {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last {
            let ready_at = last + state.interval;
            let now = Instant::now();
            if ready_at > now {
                debug!("Rate gate sleeping {:?}", ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let admitted = Instant::now();
        state.last = Some(admitted);
        admitted
    }

    /// Records that the admitted request has returned
    pub async fn mark_complete(&self) {
        let mut state = self.state.lock().await;
        state.last = Some(Instant::now());
    }

    /// Doubles the interval, capped at `ceiling`, and returns the new value
    pub async fn widen(&self, ceiling: Duration) -> Duration {
        let mut state = self.state.lock().await;
        state.interval = state.interval.saturating_mul(2).min(ceiling);
        state.interval
    }

    pub async fn interval(&self) -> Duration {
        self.state.lock().await.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let gate = RateGate::new(Duration::from_secs(10));
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_consecutive_starts_respect_interval() {
        let interval = Duration::from_millis(60);
        let gate = RateGate::new(interval);

        let mut starts = Vec::new();
        for _ in 0..3 {
            starts.push(gate.wait().await);
            gate.mark_complete().await;
        }

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test]
    async fn test_gate_is_global_across_tasks() {
        let interval = Duration::from_millis(40);
        let gate = Arc::new(RateGate::new(interval));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.wait().await }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test]
    async fn test_widen_doubles_and_caps() {
        let gate = RateGate::new(Duration::from_secs(2));
        assert_eq!(gate.widen(Duration::from_secs(30)).await, Duration::from_secs(4));
        assert_eq!(gate.widen(Duration::from_secs(30)).await, Duration::from_secs(8));
        assert_eq!(gate.widen(Duration::from_secs(5)).await, Duration::from_secs(5));
        assert_eq!(gate.interval().await, Duration::from_secs(5));
    }
}
