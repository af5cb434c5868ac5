//! Cross-timeline scheduling.
//!
//! Each queue is single-threaded. Work aimed at a queue from another timeline (possibly running
//! on another host thread) travels as a message through a [`Remote`] into that queue's [`Inbox`].
//! The target drains its inbox on its own thread at every insertion point of the service loop,
//! so hand-offs never race with the service loop and the local fast path takes no lock.
//!
//! A handed-off item joins the target's in-flight batch only while the target clock still sits
//! on its due tick. Arriving after the target clock has moved past the due tick is a causality
//! violation, exactly as for a local `schedule`.

use std::borrow::Cow;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::{EventQueue, HandoffError, ItemId, Priority, Tick};

pub(crate) type SendAction<C> = Box<dyn FnMut(&mut C, &mut EventQueue<C>) + Send>;

pub(crate) enum Handoff<C> {
    Insert {
        name: Cow<'static, str>,
        action: SendAction<C>,
        due: Tick,
        priority: Priority,
    },
    Schedule {
        item: ItemId,
        due: Tick,
        priority: Priority,
    },
    Deschedule {
        item: ItemId,
    },
    Reschedule {
        item: ItemId,
        due: Tick,
        priority: Priority,
        force_if_idle: bool,
    },
    Squash {
        item: ItemId,
    },
    Exit {
        reason: String,
    },
}

/// Creates a hand-off channel for the timeline called `timeline`.
///
/// Give the [`Inbox`] to [`EventQueue::with_inbox`] on the thread that will run the queue and
/// hand clones of the [`Remote`] to other timelines.
pub fn channel<C>(timeline: impl Into<String>) -> (Remote<C>, Inbox<C>) {
    let timeline: Arc<str> = Arc::from(timeline.into());
    let (tx, rx) = crossbeam_channel::unbounded();
    let remote = Remote {
        tx: tx.clone(),
        timeline: timeline.clone(),
    };
    (remote, Inbox { rx, tx, timeline })
}

/// Receiving end of a timeline's hand-off channel. Owned by the target queue.
pub struct Inbox<C> {
    rx: Receiver<Handoff<C>>,
    tx: Sender<Handoff<C>>,
    timeline: Arc<str>,
}

impl<C> Inbox<C> {
    pub(crate) fn try_next(&self) -> Option<Handoff<C>> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn remote(&self) -> Remote<C> {
        Remote {
            tx: self.tx.clone(),
            timeline: self.timeline.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Sending handle to another timeline's queue. Cheap to clone and `Send`.
pub struct Remote<C> {
    tx: Sender<Handoff<C>>,
    timeline: Arc<str>,
}

impl<C> Clone for Remote<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            timeline: self.timeline.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Remote<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("timeline", &self.timeline)
            .finish()
    }
}

impl<C> Remote<C> {
    pub fn timeline(&self) -> &str {
        &self.timeline
    }

    fn send(&self, msg: Handoff<C>) -> Result<(), HandoffError> {
        self.tx.send(msg).map_err(|_| HandoffError::Disconnected {
            timeline: self.timeline.to_string(),
        })
    }

    /// Creates a queue-owned item on the target timeline and schedules it there.
    pub fn schedule_new<F>(
        &self,
        name: impl Into<Cow<'static, str>>,
        due: Tick,
        priority: Priority,
        action: F,
    ) -> Result<(), HandoffError>
    where
        F: FnMut(&mut C, &mut EventQueue<C>) + Send + 'static,
    {
        self.send(Handoff::Insert {
            name: name.into(),
            action: Box::new(action),
            due,
            priority,
        })
    }

    /// Schedules an item that already lives on the target timeline.
    pub fn schedule(&self, item: ItemId, due: Tick, priority: Priority) -> Result<(), HandoffError> {
        self.send(Handoff::Schedule {
            item,
            due,
            priority,
        })
    }

    pub fn deschedule(&self, item: ItemId) -> Result<(), HandoffError> {
        self.send(Handoff::Deschedule { item })
    }

    pub fn reschedule(
        &self,
        item: ItemId,
        due: Tick,
        priority: Priority,
        force_if_idle: bool,
    ) -> Result<(), HandoffError> {
        self.send(Handoff::Reschedule {
            item,
            due,
            priority,
            force_if_idle,
        })
    }

    pub fn squash(&self, item: ItemId) -> Result<(), HandoffError> {
        self.send(Handoff::Squash { item })
    }

    /// Asks the target's service loop to stop at its next insertion point.
    pub fn request_exit(&self, reason: impl Into<String>) -> Result<(), HandoffError> {
        self.send(Handoff::Exit {
            reason: reason.into(),
        })
    }
}
