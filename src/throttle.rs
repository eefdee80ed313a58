//! Poll-based throttles for display repaints and status updates.
//!
//! The runner is driven by a caller-owned pump rather than a timer
//! callback, so both throttles are small state machines that take the
//! current instant explicitly: `request`/`arm` on the producing side,
//! `poll` from the pump to fire trailing edges.

use std::time::{Duration, Instant};

/// Bounds repaint frequency to at most one per interval.
///
/// The first request inside a quiet period repaints immediately and opens
/// a window; requests during the window coalesce into a single pending
/// flag; polling past the window fires at most one trailing repaint. No
/// request is ever dropped outright — the last one before the window
/// closes always produces a flush.
#[derive(Debug)]
pub struct RenderThrottle {
    interval: Duration,
    window_ends: Option<Instant>,
    pending: bool,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_ends: None,
            pending: false,
        }
    }

    /// Returns true when the caller should repaint right now.
    pub fn request(&mut self, now: Instant) -> bool {
        match self.window_ends {
            Some(ends) if now < ends => {
                self.pending = true;
                false
            }
            _ => {
                self.window_ends = Some(now + self.interval);
                self.pending = false;
                true
            }
        }
    }

    /// Returns true when a coalesced trailing repaint is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.window_ends {
            Some(ends) if now >= ends => {
                if self.pending {
                    self.pending = false;
                    self.window_ends = Some(now + self.interval);
                    true
                } else {
                    self.window_ends = None;
                    false
                }
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.window_ends = None;
        self.pending = false;
    }
}

/// Trailing-edge throttle for progress reports while buffering.
///
/// Arming sets a deadline only if none is pending; polling past the
/// deadline fires once and clears it, so a burst of buffered lines
/// produces at most one status update per interval.
#[derive(Debug)]
pub struct StatusThrottle {
    interval: Duration,
    deadline: Option<Instant>,
}

impl StatusThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_first_request_fires_immediately() {
        let t0 = Instant::now();
        let mut throttle = RenderThrottle::new(Duration::from_millis(50));
        assert!(throttle.request(t0));
        assert!(!throttle.request(t0 + Duration::from_millis(10)));
        assert!(!throttle.request(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn render_coalesces_into_one_trailing_flush() {
        let t0 = Instant::now();
        let mut throttle = RenderThrottle::new(Duration::from_millis(50));
        assert!(throttle.request(t0));
        assert!(!throttle.request(t0 + Duration::from_millis(5)));
        // Not yet due
        assert!(!throttle.poll(t0 + Duration::from_millis(40)));
        // Due: exactly one trailing flush
        assert!(throttle.poll(t0 + Duration::from_millis(55)));
        assert!(!throttle.poll(t0 + Duration::from_millis(56)));
    }

    #[test]
    fn render_window_closes_without_pending_requests() {
        let t0 = Instant::now();
        let mut throttle = RenderThrottle::new(Duration::from_millis(50));
        assert!(throttle.request(t0));
        assert!(!throttle.poll(t0 + Duration::from_millis(60)));
        // Window closed, next request is immediate again
        assert!(throttle.request(t0 + Duration::from_millis(61)));
    }

    #[test]
    fn render_rearms_after_trailing_flush() {
        let t0 = Instant::now();
        let mut throttle = RenderThrottle::new(Duration::from_millis(50));
        assert!(throttle.request(t0));
        assert!(!throttle.request(t0 + Duration::from_millis(1)));
        assert!(throttle.poll(t0 + Duration::from_millis(51)));
        // Re-armed: a request inside the new window coalesces again
        assert!(!throttle.request(t0 + Duration::from_millis(60)));
        assert!(throttle.poll(t0 + Duration::from_millis(102)));
    }

    #[test]
    fn status_fires_once_per_interval() {
        let t0 = Instant::now();
        let mut throttle = StatusThrottle::new(Duration::from_millis(250));
        throttle.arm(t0);
        throttle.arm(t0 + Duration::from_millis(10));
        assert!(!throttle.poll(t0 + Duration::from_millis(100)));
        assert!(throttle.poll(t0 + Duration::from_millis(251)));
        // Cleared until armed again
        assert!(!throttle.poll(t0 + Duration::from_millis(600)));
        throttle.arm(t0 + Duration::from_millis(601));
        assert!(throttle.poll(t0 + Duration::from_millis(852)));
    }
}
