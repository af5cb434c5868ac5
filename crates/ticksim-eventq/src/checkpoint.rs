//! Save/restore boundary for the pending set.
//!
//! The queue only defines the envelope of a checkpoint: which items were pending, in which order,
//! with which due tick and priority. What an item *is* travels as an opaque payload next to a
//! consumer-chosen [`KindTag`]; on restore, an [`ItemFactory`] keyed by that tag rebuilds the
//! item and its action binding.
//!
//! Squashed items are left out of a snapshot since they would never run.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::queue::{entry_in, OrderKey};
use crate::{CheckpointError, EventQueue, ItemId, Priority, Tick, Violation, WorkItem};

/// Consumer-chosen four-character code naming the kind of a checkpointed item.
///
/// Keep a tag stable once checkpoints using it exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KindTag(pub [u8; 4]);

impl KindTag {
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    pub const fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            for &b in &self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", u32::from_be_bytes(self.0))
        }
    }
}

/// One pending item as captured by [`EventQueue::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingRecord {
    pub kind: KindTag,
    pub due: Tick,
    pub priority: Priority,
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl PendingRecord {
    pub(crate) fn order_key(&self) -> OrderKey {
        OrderKey {
            due: self.due,
            priority: self.priority,
            seq: self.seq,
        }
    }
}

/// The pending set of one queue at a save point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueSnapshot {
    pub now: Tick,
    pub next_seq: u64,
    /// Sorted by `(due, priority, seq)`.
    pub records: Vec<PendingRecord>,
}

impl QueueSnapshot {
    /// Checks the ordering and range invariants a restore relies on.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        let mut previous: Option<OrderKey> = None;
        for (index, record) in self.records.iter().enumerate() {
            if record.due < self.now {
                return Err(CheckpointError::DueBeforeCheckpoint {
                    index,
                    due: record.due,
                    now: self.now,
                });
            }
            if record.seq >= self.next_seq {
                return Err(CheckpointError::SequenceOutOfRange {
                    index,
                    seq: record.seq,
                    next_seq: self.next_seq,
                });
            }
            let key = record.order_key();
            if previous.is_some_and(|prev| prev >= key || prev.seq == key.seq) {
                return Err(CheckpointError::OutOfOrder { index });
            }
            previous = Some(key);
        }
        Ok(())
    }
}

/// Rebuilds checkpointed items on restore.
pub trait ItemFactory<C> {
    fn rebuild(&mut self, record: &PendingRecord, ctx: &mut C)
        -> Result<WorkItem<C>, CheckpointError>;
}

type RebuildFn<C> = Box<dyn FnMut(&PendingRecord, &mut C) -> Result<WorkItem<C>, CheckpointError>>;

/// An [`ItemFactory`] dispatching on [`KindTag`].
pub struct FactoryRegistry<C> {
    factories: BTreeMap<KindTag, RebuildFn<C>>,
}

impl<C> FactoryRegistry<C> {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers the rebuild function for `kind`, replacing any earlier one.
    pub fn register<F>(&mut self, kind: KindTag, rebuild: F) -> &mut Self
    where
        F: FnMut(&PendingRecord, &mut C) -> Result<WorkItem<C>, CheckpointError> + 'static,
    {
        self.factories.insert(kind, Box::new(rebuild));
        self
    }

    pub fn with<F>(mut self, kind: KindTag, rebuild: F) -> Self
    where
        F: FnMut(&PendingRecord, &mut C) -> Result<WorkItem<C>, CheckpointError> + 'static,
    {
        self.register(kind, rebuild);
        self
    }

    pub fn contains(&self, kind: KindTag) -> bool {
        self.factories.contains_key(&kind)
    }
}

impl<C> Default for FactoryRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ItemFactory<C> for FactoryRegistry<C> {
    fn rebuild(
        &mut self,
        record: &PendingRecord,
        ctx: &mut C,
    ) -> Result<WorkItem<C>, CheckpointError> {
        match self.factories.get_mut(&record.kind) {
            Some(rebuild) => rebuild(record, ctx),
            None => Err(CheckpointError::UnknownKind(record.kind)),
        }
    }
}

impl<C> EventQueue<C> {
    /// Captures every pending item, in service order.
    ///
    /// Fails if a pending, non-squashed item was built without
    /// [`WorkItem::checkpointed`]. Must not be called from inside an action.
    pub fn snapshot(&self, ctx: &C) -> Result<QueueSnapshot, CheckpointError> {
        self.enter("snapshot");
        let mut records = Vec::with_capacity(self.pending.len());
        for (key, &id) in &self.pending {
            let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
                self.fatal(Violation::UnknownItem { item: id });
            };
            if entry.squashed {
                continue;
            }
            let Some(binding) = &entry.checkpoint else {
                return Err(CheckpointError::NotCheckpointable {
                    item: id,
                    name: entry.name.to_string(),
                });
            };
            records.push(PendingRecord {
                kind: binding.kind,
                due: key.due,
                priority: key.priority,
                seq: key.seq,
                payload: (binding.save)(ctx),
            });
        }

        debug!(queue = %self.name(), now = %self.now(), records = records.len(), "snapshot taken");
        Ok(QueueSnapshot {
            now: self.now(),
            next_seq: self.next_seq,
            records,
        })
    }

    /// Rebuilds the pending set from `snapshot`.
    ///
    /// The queue must have nothing pending. Its clock is set to the checkpoint tick and every
    /// record is re-inserted with its recorded due tick, priority and sequence number, so the
    /// future service order matches the saved one. Returns the new handles in record order.
    ///
    /// Nothing is inserted unless every record validates and rebuilds.
    pub fn restore<F>(
        &mut self,
        snapshot: &QueueSnapshot,
        factory: &mut F,
        ctx: &mut C,
    ) -> Result<Vec<ItemId>, CheckpointError>
    where
        F: ItemFactory<C> + ?Sized,
    {
        self.enter("restore");
        if !self.pending.is_empty() {
            return Err(CheckpointError::QueueNotEmpty {
                pending: self.pending.len(),
            });
        }
        snapshot.validate()?;

        let mut items = Vec::with_capacity(snapshot.records.len());
        for record in &snapshot.records {
            items.push(factory.rebuild(record, ctx)?);
        }

        self.clock.restore(snapshot.now);
        self.next_seq = snapshot.next_seq;
        let ids = items
            .into_iter()
            .zip(&snapshot.records)
            .map(|(item, record)| {
                let id = self.create(item);
                self.link_at(id, record.order_key());
                id
            })
            .collect::<Vec<_>>();

        debug!(queue = %self.name(), now = %self.now(), records = ids.len(), "snapshot restored");
        Ok(ids)
    }
}
