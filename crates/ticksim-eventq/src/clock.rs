use crate::Tick;

/// Simulated time of one timeline.
///
/// Only the owning [`EventQueue`](crate::EventQueue) moves the clock, and only forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Clock {
    now: Tick,
}

impl Clock {
    pub const fn new() -> Self {
        Self { now: Tick::ZERO }
    }

    /// Returns the current simulated time.
    #[inline]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Moves the clock to `tick`.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is earlier than the current time. The queue never asks for that; a
    /// failure here means the pending set was corrupted.
    #[inline]
    pub(crate) fn advance_to(&mut self, tick: Tick) {
        assert!(
            tick >= self.now,
            "simulated clock cannot rewind from {} to {tick}",
            self.now
        );
        self.now = tick;
    }

    /// Sets the current time while restoring a checkpoint into an empty queue.
    #[inline]
    pub(crate) fn restore(&mut self, tick: Tick) {
        self.now = tick;
    }
}
