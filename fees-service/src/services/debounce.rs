use std::time::Duration;

use tokio::time::Instant;

/// Coalesces bursts of recompute triggers into one deadline.
///
/// The first trigger arms a deadline one window ahead; triggers that land
/// while armed are absorbed without pushing the deadline back, so a steady
/// stream of events still recomputes once per window instead of never.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm after the deadline has been acted on.
    pub fn fire(&mut self) {
        self.deadline = None;
    }
}
