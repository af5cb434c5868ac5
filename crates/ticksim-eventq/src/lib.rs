//! Discrete-event scheduling kernel for tick-accurate simulation.
//!
//! Every simulated subsystem (pipeline stages, DMA engines, interrupt controllers, periodic
//! device polls) expresses its future work as a [`WorkItem`] scheduled on an [`EventQueue`]. The
//! queue keeps the pending set ordered by `(due tick, priority, sequence number)` and its service
//! loop advances the timeline's [`Clock`] to the next due tick and runs everything due there,
//! including work scheduled for that same tick by the items it runs.
//!
//! # Ownership
//!
//! Items live in a generation-checked arena inside the queue and are referred to by [`ItemId`].
//! An item is either [`Ownership::QueueOwned`] (reclaimed by the queue after it runs or when it
//! is descheduled) or [`Ownership::CallerOwned`] (kept until [`EventQueue::destroy`]).
//!
//! # Errors
//!
//! Misuse of the scheduling API (see [`Violation`]) is fatal. Failures at the checkpoint boundary
//! and on the cross-timeline path are ordinary `Result`s.
//!
//! # Timelines
//!
//! Each queue is one single-threaded timeline. Other timelines reach it through a
//! [`Remote`](handoff::Remote); see [`handoff`].

mod clock;
mod config;
mod error;
mod item;
mod priority;
mod queue;
mod stats;
mod tick;

pub mod callback;
pub mod checkpoint;
pub mod handoff;

pub use crate::checkpoint::{FactoryRegistry, ItemFactory, KindTag, PendingRecord, QueueSnapshot};
pub use crate::clock::Clock;
pub use crate::config::QueueConfig;
pub use crate::error::{CheckpointError, HandoffError, Violation};
pub use crate::handoff::{Inbox, Remote};
pub use crate::item::{Action, ItemId, ItemState, Ownership, WorkItem};
pub use crate::priority::Priority;
pub use crate::queue::{EventQueue, PendingItem, RunOutcome};
pub use crate::stats::QueueStats;
pub use crate::tick::Tick;

#[cfg(test)]
mod tests;
