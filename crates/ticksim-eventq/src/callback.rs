//! Adapters turning "call method M on target O" into a [`WorkItem`].
//!
//! The adapters only build the action closure. Ownership is always an explicit argument and
//! the result is a plain [`WorkItem`], so `.named(..)` and `.checkpointed(..)` chain as usual.
//!
//! Targets are reached without back-references from the queue:
//! - [`method`] projects the target out of the simulation state `C`;
//! - [`indexed`] resolves a consumer-side arena handle at invocation time;
//! - [`shared`] holds a reference-counted target.
//!
//! ```
//! use ticksim_eventq::{callback, EventQueue, Ownership, Priority, QueueConfig, Tick};
//!
//! #[derive(Default)]
//! struct Nic {
//!     kicks: u32,
//! }
//!
//! impl Nic {
//!     fn rx_kick(&mut self, _queue: &mut EventQueue<Sim>) {
//!         self.kicks += 1;
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Sim {
//!     nic: Nic,
//! }
//!
//! let mut sim = Sim::default();
//! let mut queue = EventQueue::new(QueueConfig::default());
//! let kick = callback::method(Ownership::QueueOwned, |sim: &mut Sim| &mut sim.nic, Nic::rx_kick);
//! queue.schedule_new(kick.named("nic.rx_kick"), Tick::new(3), Priority::DEFAULT);
//! queue.run(&mut sim);
//! assert_eq!(sim.nic.kicks, 1);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::{EventQueue, Ownership, WorkItem};

/// Invokes `method` on the part of the simulation state selected by `select`.
pub fn method<C, T>(
    ownership: Ownership,
    select: fn(&mut C) -> &mut T,
    method: fn(&mut T, &mut EventQueue<C>),
) -> WorkItem<C>
where
    C: 'static,
    T: 'static,
{
    WorkItem::new(ownership, move |ctx: &mut C, queue: &mut EventQueue<C>| {
        method(select(ctx), queue)
    })
}

/// Invokes `method` on the target `handle` resolves to when the item runs.
///
/// If the target has been removed from its arena by then, the call is skipped.
pub fn indexed<C, T, H>(
    ownership: Ownership,
    handle: H,
    select: fn(&mut C, H) -> Option<&mut T>,
    method: fn(&mut T, &mut EventQueue<C>),
) -> WorkItem<C>
where
    C: 'static,
    T: 'static,
    H: Copy + fmt::Debug + 'static,
{
    WorkItem::new(ownership, move |ctx: &mut C, queue: &mut EventQueue<C>| {
        match select(ctx, handle) {
            Some(target) => method(target, queue),
            None => debug!(?handle, queue = queue.name(), "callback target is gone; skipping"),
        }
    })
}

/// Invokes `method` on a shared target.
///
/// # Panics
///
/// The target is mutably borrowed for the duration of the call; the action panics if it is
/// already borrowed at that point.
pub fn shared<C, T>(
    ownership: Ownership,
    target: Rc<RefCell<T>>,
    method: fn(&mut T, &mut EventQueue<C>),
) -> WorkItem<C>
where
    C: 'static,
    T: 'static,
{
    WorkItem::new(ownership, move |_: &mut C, queue: &mut EventQueue<C>| {
        method(&mut target.borrow_mut(), queue)
    })
}
