use core::fmt;

/// Tie-break between work items due on the same tick. Lower values run first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Priority(pub i16);

impl Priority {
    pub const MINIMUM: Priority = Priority(i16::MIN);
    /// Debugger breakpoints fire before anything else on their tick.
    pub const DEBUG_BREAK: Priority = Priority(-100);
    /// CPU model switch-over must observe the tick before any CPU has ticked.
    pub const CPU_SWITCH: Priority = Priority(-31);
    /// Writebacks delayed from the previous tick drain before regular work.
    pub const DELAYED_WRITEBACK: Priority = Priority(-1);
    pub const DEFAULT: Priority = Priority(0);
    /// Pipeline clock edges run after device completions on the same tick.
    pub const CPU_TICK: Priority = Priority(50);
    /// Statistics dumps see the final state of a tick.
    pub const STATS: Priority = Priority(90);
    /// Exit requests run after all other work on their tick.
    pub const SIM_EXIT: Priority = Priority(100);
    pub const MAXIMUM: Priority = Priority(i16::MAX);

    #[inline]
    pub const fn get(self) -> i16 {
        self.0
    }
}

impl From<i16> for Priority {
    fn from(value: i16) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
