//! Per-provider admission control.
//!
//! A limiter built from a requests-per-minute budget enforces two sliding
//! windows at once: the full budget over any 60 s span, and a per-second
//! slice of `max(1, rpm / 60)` over any 1 s span. The second window is what
//! stops a fresh budget from being spent in one burst.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

const MINUTE: Duration = Duration::from_secs(60);
const SECOND: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    windows: Option<Mutex<Windows>>,
    /// Kept outside the mutex, which a waiter holds while it sleeps.
    burst: Option<usize>,
}

#[derive(Debug)]
struct Windows {
    per_minute: usize,
    per_second: usize,
    minute: VecDeque<Instant>,
    second: VecDeque<Instant>,
}

impl RateLimiter {
    /// A limiter that never delays.
    pub fn unbounded() -> Self {
        Self {
            windows: None,
            burst: None,
        }
    }

    pub fn per_minute(rpm: u32) -> Self {
        let per_minute = rpm.max(1) as usize;
        let per_second = (per_minute / 60).max(1);
        Self {
            windows: Some(Mutex::new(Windows {
                per_minute,
                per_second,
                minute: VecDeque::with_capacity(per_minute),
                second: VecDeque::with_capacity(per_second),
            })),
            burst: Some(per_second),
        }
    }

    /// Unbounded when no budget is configured.
    pub fn from_budget(max_rpm: Option<u32>) -> Self {
        max_rpm.map_or_else(Self::unbounded, Self::per_minute)
    }

    /// Permits allowed in any one-second window, if bounded.
    pub fn burst(&self) -> Option<usize> {
        self.burst
    }

    /// Waits until one more request may be sent, then records it.
    ///
    /// Callers queue on a FIFO mutex, so under contention permits are handed
    /// out in arrival order.
    pub async fn acquire(&self) {
        let Some(windows) = &self.windows else {
            return;
        };
        let mut windows = windows.lock().await;
        loop {
            let now = Instant::now();
            match windows.next_opening(now) {
                None => {
                    windows.grant(now);
                    return;
                }
                Some(at) => sleep_until(at).await,
            }
        }
    }
}

impl Windows {
    /// `None` when a grant is allowed at `now`, else the earliest instant
    /// at which both windows have room.
    fn next_opening(&mut self, now: Instant) -> Option<Instant> {
        prune(&mut self.minute, now, MINUTE);
        prune(&mut self.second, now, SECOND);

        let minute_wait = full_until(&self.minute, self.per_minute, MINUTE);
        let second_wait = full_until(&self.second, self.per_second, SECOND);
        minute_wait.max(second_wait)
    }

    fn grant(&mut self, now: Instant) {
        self.minute.push_back(now);
        self.second.push_back(now);
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while window
        .front()
        .is_some_and(|&granted| now.duration_since(granted) >= span)
    {
        window.pop_front();
    }
}

fn full_until(window: &VecDeque<Instant>, capacity: usize, span: Duration) -> Option<Instant> {
    if window.len() < capacity {
        return None;
    }
    window.front().map(|&oldest| oldest + span)
}
