use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// A point in simulated time, measured in the smallest simulated unit.
///
/// Ticks are never derived from wall-clock time. Zero is the start of the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);
    pub const MAX: Tick = Tick(u64::MAX);

    #[inline]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn checked_add(self, delta: u64) -> Option<Tick> {
        self.0.checked_add(delta).map(Tick)
    }

    #[inline]
    pub fn saturating_add(self, delta: u64) -> Tick {
        Tick(self.0.saturating_add(delta))
    }

    /// Number of ticks from `earlier` to `self`, or `None` if `earlier` is later.
    #[inline]
    pub fn checked_since(self, earlier: Tick) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<u64> for Tick {
    fn from(ticks: u64) -> Self {
        Tick(ticks)
    }
}

impl From<Tick> for u64 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

/// Offsets a tick by a duration in ticks.
///
/// # Panics
///
/// Panics if the result overflows `u64`.
impl Add<u64> for Tick {
    type Output = Tick;

    #[inline]
    fn add(self, delta: u64) -> Tick {
        self.checked_add(delta)
            .expect("simulated tick overflowed u64::MAX")
    }
}

impl AddAssign<u64> for Tick {
    #[inline]
    fn add_assign(&mut self, delta: u64) {
        *self = *self + delta;
    }
}

/// Duration between two ticks.
///
/// # Panics
///
/// Panics if `rhs` is later than `self`.
impl Sub<Tick> for Tick {
    type Output = u64;

    #[inline]
    fn sub(self, rhs: Tick) -> u64 {
        self.checked_since(rhs)
            .expect("tick subtraction went below zero")
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Tick;

    #[test]
    fn arithmetic_is_plain_duration_math() {
        let t = Tick::new(10) + 5;
        assert_eq!(t, Tick::new(15));
        assert_eq!(t - Tick::new(3), 12);
        assert_eq!(Tick::new(3).checked_since(t), None);
        assert_eq!(Tick::MAX.checked_add(1), None);
        assert_eq!(Tick::MAX.saturating_add(1), Tick::MAX);
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn add_overflow_panics() {
        let _ = Tick::MAX + 1;
    }
}
