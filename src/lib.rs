//! Tick-accurate discrete-event scheduling for hardware simulation.
//!
//! - [`eventq`]: the per-timeline scheduling kernel.
//! - [`snapshot`]: the on-disk checkpoint container for queue snapshots.

pub use ticksim_eventq as eventq;
pub use ticksim_snapshot as snapshot;
