//! Deferred work items and the handles used to refer to them.

use std::borrow::Cow;
use std::fmt;

use crate::checkpoint::KindTag;
use crate::EventQueue;

/// Who reclaims an item's storage. Fixed when the item is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ownership {
    /// The queue reclaims the item right after its action runs (unless the action re-armed it)
    /// or when it is descheduled.
    QueueOwned,
    /// The item lives until its owner calls [`EventQueue::destroy`].
    CallerOwned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemState {
    Idle,
    Pending,
    Executing,
}

/// Stable handle to a work item stored in an [`EventQueue`].
///
/// Handles are generation-checked: once an item is reclaimed its handle never resolves again,
/// even if the slot is reused. A handle only resolves on the queue that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId {
    pub(crate) queue: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ItemId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}.{}@q{}", self.index, self.generation, self.queue)
    }
}

/// The behaviour of a work item. It receives the embedding simulation state and the queue that
/// is servicing it.
pub type Action<C> = Box<dyn FnMut(&mut C, &mut EventQueue<C>)>;

pub(crate) struct CheckpointBinding<C> {
    pub(crate) kind: KindTag,
    pub(crate) save: Box<dyn Fn(&C) -> Vec<u8>>,
}

/// A deferred unit of work, not yet handed to a queue.
///
/// Pass it to [`EventQueue::create`] (Idle) or [`EventQueue::schedule_new`] (Pending).
pub struct WorkItem<C> {
    pub(crate) ownership: Ownership,
    pub(crate) name: Cow<'static, str>,
    pub(crate) action: Action<C>,
    pub(crate) checkpoint: Option<CheckpointBinding<C>>,
}

impl<C> WorkItem<C> {
    pub fn new<F>(ownership: Ownership, action: F) -> Self
    where
        F: FnMut(&mut C, &mut EventQueue<C>) + 'static,
    {
        Self {
            ownership,
            name: Cow::Borrowed("anonymous"),
            action: Box::new(action),
            checkpoint: None,
        }
    }

    pub fn queue_owned<F>(action: F) -> Self
    where
        F: FnMut(&mut C, &mut EventQueue<C>) + 'static,
    {
        Self::new(Ownership::QueueOwned, action)
    }

    pub fn caller_owned<F>(action: F) -> Self
    where
        F: FnMut(&mut C, &mut EventQueue<C>) + 'static,
    {
        Self::new(Ownership::CallerOwned, action)
    }

    /// Name shown in traces and fatal diagnostics.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes the item survive checkpoints.
    ///
    /// `kind` selects the factory that rebuilds the item on restore; `save` produces the
    /// consumer-defined payload handed back to that factory.
    pub fn checkpointed<S>(mut self, kind: KindTag, save: S) -> Self
    where
        S: Fn(&C) -> Vec<u8> + 'static,
    {
        self.checkpoint = Some(CheckpointBinding {
            kind,
            save: Box::new(save),
        });
        self
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checkpoint_kind(&self) -> Option<KindTag> {
        self.checkpoint.as_ref().map(|binding| binding.kind)
    }
}

impl<C> fmt::Debug for WorkItem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("ownership", &self.ownership)
            .field("name", &self.name)
            .field("checkpoint_kind", &self.checkpoint_kind())
            .finish_non_exhaustive()
    }
}
