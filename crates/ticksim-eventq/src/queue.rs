use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::handoff::{self, Handoff, Inbox, Remote};
use crate::item::{Action, CheckpointBinding};
use crate::{
    Clock, ItemId, ItemState, Ownership, Priority, QueueConfig, QueueStats, Tick, Violation,
    WorkItem,
};

/// Position of a pending item. The derived ordering is the service order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct OrderKey {
    pub(crate) due: Tick,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
}

pub(crate) struct Entry<C> {
    pub(crate) ownership: Ownership,
    pub(crate) name: Cow<'static, str>,
    pub(crate) state: ItemState,
    /// Set exactly while the item is pending.
    pub(crate) key: Option<OrderKey>,
    pub(crate) squashed: bool,
    /// Taken out while the action runs.
    pub(crate) action: Option<Action<C>>,
    pub(crate) checkpoint: Option<CheckpointBinding<C>>,
}

pub(crate) struct Slot<C> {
    generation: u32,
    entry: Option<Entry<C>>,
}

/// Source of the per-queue tag carried by every [`ItemId`].
static NEXT_QUEUE_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) fn entry_in<C>(slots: &[Slot<C>], queue: u32, id: ItemId) -> Option<&Entry<C>> {
    if id.queue != queue {
        return None;
    }
    let slot = slots.get(id.index as usize)?;
    if slot.generation != id.generation {
        return None;
    }
    slot.entry.as_ref()
}

fn entry_in_mut<C>(slots: &mut [Slot<C>], queue: u32, id: ItemId) -> Option<&mut Entry<C>> {
    if id.queue != queue {
        return None;
    }
    let slot = slots.get_mut(id.index as usize)?;
    if slot.generation != id.generation {
        return None;
    }
    slot.entry.as_mut()
}

/// Why a run call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending work is left on this timeline.
    Drained { now: Tick },
    /// Everything due at or before the limit ran and the clock now sits on the limit.
    LimitReached { now: Tick },
    /// An action (or another timeline) asked the loop to stop.
    Exited { now: Tick, reason: String },
}

impl RunOutcome {
    pub fn now(&self) -> Tick {
        match self {
            RunOutcome::Drained { now }
            | RunOutcome::LimitReached { now }
            | RunOutcome::Exited { now, .. } => *now,
        }
    }
}

/// Read-only view of one pending item, as yielded by [`EventQueue::pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem<'a> {
    pub id: ItemId,
    pub name: &'a str,
    pub due: Tick,
    pub priority: Priority,
    pub seq: u64,
    pub squashed: bool,
}

/// The scheduling kernel of one simulated timeline.
///
/// Holds the pending set ordered by `(due, priority, sequence)` and the service loop that moves
/// the timeline's [`Clock`] and runs due items. `C` is the embedding simulation state handed to
/// every action.
///
/// Every precondition failure (see [`Violation`]) is fatal: it is logged and then panics.
pub struct EventQueue<C> {
    name: Arc<str>,
    /// Tags every handle this queue hands out; handles from other queues never resolve here.
    pub(crate) queue_id: u32,
    pub(crate) clock: Clock,
    pub(crate) slots: Vec<Slot<C>>,
    free: Vec<u32>,
    pub(crate) pending: BTreeMap<OrderKey, ItemId>,
    pub(crate) next_seq: u64,
    inbox: Inbox<C>,
    in_action: bool,
    current: Option<ItemId>,
    exit: Option<String>,
    stats: QueueStats,
}

impl<C> EventQueue<C> {
    pub fn new(config: QueueConfig) -> Self {
        let (_, inbox) = handoff::channel(config.name.clone());
        Self::with_inbox(config, inbox)
    }

    /// Builds a queue that receives cross-timeline work through `inbox`.
    pub fn with_inbox(config: QueueConfig, inbox: Inbox<C>) -> Self {
        Self {
            name: Arc::from(config.name),
            queue_id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            clock: Clock::new(),
            slots: Vec::with_capacity(config.capacity_hint),
            free: Vec::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
            inbox,
            in_action: false,
            current: None,
            exit: None,
            stats: QueueStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current simulated time of this timeline.
    #[inline]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// A handle other timelines use to hand work to this queue.
    pub fn remote(&self) -> Remote<C> {
        self.inbox.remote()
    }

    /// Operation counters. These are not rolled back when a deschedule undoes a schedule.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Due tick of the earliest pending item.
    pub fn next_due(&self) -> Option<Tick> {
        self.pending.keys().next().map(|key| key.due)
    }

    /// Items currently stored by the queue, pending or not.
    pub fn live_items(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Pending items in service order.
    pub fn pending(&self) -> impl Iterator<Item = PendingItem<'_>> + '_ {
        self.pending.iter().filter_map(move |(key, &id)| {
            let entry = entry_in(&self.slots, self.queue_id, id)?;
            Some(PendingItem {
                id,
                name: &entry.name,
                due: key.due,
                priority: key.priority,
                seq: key.seq,
                squashed: entry.squashed,
            })
        })
    }

    /// The item whose action is running right now.
    ///
    /// Lets an action re-arm, deschedule or destroy its own item.
    pub fn current(&self) -> Option<ItemId> {
        self.current
    }

    /// Lifecycle state of `id`, or `None` once the item has been reclaimed.
    pub fn state(&self, id: ItemId) -> Option<ItemState> {
        entry_in(&self.slots, self.queue_id, id).map(|entry| entry.state)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        entry_in(&self.slots, self.queue_id, id).is_some()
    }

    pub fn is_scheduled(&self, id: ItemId) -> bool {
        self.state(id) == Some(ItemState::Pending)
    }

    pub fn due_of(&self, id: ItemId) -> Option<Tick> {
        entry_in(&self.slots, self.queue_id, id).and_then(|entry| entry.key.map(|key| key.due))
    }

    pub fn is_squashed(&self, id: ItemId) -> bool {
        entry_in(&self.slots, self.queue_id, id).is_some_and(|entry| entry.squashed)
    }

    pub fn ownership(&self, id: ItemId) -> Option<Ownership> {
        entry_in(&self.slots, self.queue_id, id).map(|entry| entry.ownership)
    }

    pub fn item_name(&self, id: ItemId) -> Option<&str> {
        entry_in(&self.slots, self.queue_id, id).map(|entry| &*entry.name)
    }

    /// Stores `item` in the queue without scheduling it.
    pub fn create(&mut self, item: WorkItem<C>) -> ItemId {
        let WorkItem {
            ownership,
            name,
            action,
            checkpoint,
        } = item;
        let entry = Entry {
            ownership,
            name,
            state: ItemState::Idle,
            key: None,
            squashed: false,
            action: Some(action),
            checkpoint,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ItemId {
                    queue: self.queue_id,
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .expect("event queue slot index overflowed u32");
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ItemId {
                    queue: self.queue_id,
                    index,
                    generation: 0,
                }
            }
        };
        trace!(queue = %self.name, item = %id, ?ownership, "created");
        id
    }

    /// Stores `item` and schedules it in one step.
    pub fn schedule_new(&mut self, item: WorkItem<C>, due: Tick, priority: Priority) -> ItemId {
        let id = self.create(item);
        self.schedule(id, due, priority);
        id
    }

    /// Makes `id` pending at `due`.
    ///
    /// The item must not already be pending (an executing item may re-arm itself) and `due`
    /// must not be earlier than [`now`](Self::now).
    #[track_caller]
    pub fn schedule(&mut self, id: ItemId, due: Tick, priority: Priority) {
        let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        if let Some(key) = entry.key {
            self.fatal(Violation::DoubleSchedule {
                item: id,
                name: entry.name.to_string(),
                due: key.due,
            });
        }
        if due < self.clock.now() {
            self.fatal(Violation::Causality {
                item: id,
                name: entry.name.to_string(),
                due,
            });
        }

        self.link(id, due, priority);
        self.stats.scheduled += 1;
    }

    /// Removes pending `id` from the order. Queue-owned items are reclaimed by this call.
    #[track_caller]
    pub fn deschedule(&mut self, id: ItemId) {
        let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        let Some(key) = entry.key else {
            self.fatal(Violation::NotPending {
                item: id,
                name: entry.name.to_string(),
                state: entry.state,
            });
        };

        self.unlink(key);
        self.stats.descheduled += 1;

        let mut ownership = Ownership::CallerOwned;
        if let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) {
            entry.key = None;
            entry.state = ItemState::Idle;
            entry.squashed = false;
            ownership = entry.ownership;
        }
        trace!(queue = %self.name, item = %id, due = %key.due, "descheduled");

        if ownership == Ownership::QueueOwned {
            self.reclaim(id);
        }
    }

    /// Moves `id` to a new position in one step.
    ///
    /// A pending item is never reclaimed on the way. A non-pending item is scheduled when
    /// `force_if_idle` is set and is a fatal error otherwise.
    #[track_caller]
    pub fn reschedule(&mut self, id: ItemId, due: Tick, priority: Priority, force_if_idle: bool) {
        let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        let previous = entry.key;
        if previous.is_none() && !force_if_idle {
            self.fatal(Violation::NotPending {
                item: id,
                name: entry.name.to_string(),
                state: entry.state,
            });
        }
        if due < self.clock.now() {
            self.fatal(Violation::Causality {
                item: id,
                name: entry.name.to_string(),
                due,
            });
        }

        match previous {
            Some(key) => {
                self.unlink(key);
                self.stats.rescheduled += 1;
            }
            None => self.stats.scheduled += 1,
        }
        self.link(id, due, priority);
    }

    /// Keeps pending `id` in the order but skips its action when it comes due.
    #[track_caller]
    pub fn squash(&mut self, id: ItemId) {
        let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        if entry.key.is_none() {
            self.fatal(Violation::NotPending {
                item: id,
                name: entry.name.to_string(),
                state: entry.state,
            });
        }
        if let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) {
            entry.squashed = true;
        }
        trace!(queue = %self.name, item = %id, "squashed");
    }

    /// Releases an item that is not pending. Queue-owned items may only be released before
    /// their first schedule; after that the queue reclaims them itself.
    #[track_caller]
    pub fn destroy(&mut self, id: ItemId) {
        let Some(entry) = entry_in(&self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        if entry.ownership == Ownership::QueueOwned && entry.state != ItemState::Idle {
            self.fatal(Violation::NotCallerOwned {
                item: id,
                name: entry.name.to_string(),
            });
        }
        if let Some(key) = entry.key {
            self.fatal(Violation::DanglingCallerOwned {
                item: id,
                name: entry.name.to_string(),
                due: key.due,
            });
        }
        self.free_slot(id);
        trace!(queue = %self.name, item = %id, "destroyed");
    }

    /// Asks the service loop to stop once the running action returns.
    ///
    /// The first request wins until a run call reports it.
    pub fn request_exit(&mut self, reason: impl Into<String>) {
        if self.exit.is_none() {
            let reason = reason.into();
            debug!(queue = %self.name, now = %self.clock.now(), %reason, "exit requested");
            self.exit = Some(reason);
        }
    }

    pub fn exit_requested(&self) -> Option<&str> {
        self.exit.as_deref()
    }

    /// Clears a pending exit request, returning its reason.
    pub fn take_exit_request(&mut self) -> Option<String> {
        self.exit.take()
    }

    /// Schedules a queue-owned item that requests an exit after all other work due on `due`.
    pub fn schedule_exit(&mut self, due: Tick, reason: impl Into<String>) -> ItemId {
        let reason = reason.into();
        let item = WorkItem::queue_owned(move |_: &mut C, queue: &mut EventQueue<C>| {
            queue.request_exit(reason.clone());
        })
        .named("exit");
        self.schedule_new(item, due, Priority::SIM_EXIT)
    }

    /// Runs the single earliest pending item, advancing the clock to its due tick.
    ///
    /// Returns the tick it ran at, or `None` if nothing is pending.
    pub fn service_one(&mut self, ctx: &mut C) -> Option<Tick> {
        self.enter("service_one");
        self.drain_inbox();
        let (key, id) = self.pending.first_entry()?.remove_entry();
        self.clock.advance_to(key.due);
        self.invoke(ctx, key, id);
        Some(key.due)
    }

    /// Advances to the next due tick and runs everything due on it, including work scheduled
    /// for that same tick while the batch runs.
    ///
    /// Returns the serviced tick, or `None` when nothing is pending or an exit request is
    /// outstanding. An exit requested mid-batch leaves the rest of the batch pending.
    pub fn run_batch(&mut self, ctx: &mut C) -> Option<Tick> {
        self.enter("run_batch");
        self.drain_inbox();
        if self.exit.is_some() {
            return None;
        }
        let tick = self.next_due()?;
        self.clock.advance_to(tick);
        debug!(queue = %self.name, %tick, pending = self.pending.len(), "servicing batch");

        while self.exit.is_none() {
            self.drain_inbox();
            let Some((key, id)) = self.pop_due(tick) else {
                break;
            };
            self.invoke(ctx, key, id);
        }
        Some(tick)
    }

    /// Services batches until nothing is pending or an exit is requested.
    pub fn run(&mut self, ctx: &mut C) -> RunOutcome {
        self.enter("run");
        loop {
            if let Some(reason) = self.exit.take() {
                return RunOutcome::Exited {
                    now: self.clock.now(),
                    reason,
                };
            }
            if self.run_batch(ctx).is_none() && self.exit.is_none() {
                return RunOutcome::Drained {
                    now: self.clock.now(),
                };
            }
        }
    }

    /// Services every batch due at or before `limit`, then moves the clock to `limit`.
    pub fn run_until(&mut self, ctx: &mut C, limit: Tick) -> RunOutcome {
        self.enter("run_until");
        loop {
            if let Some(reason) = self.exit.take() {
                return RunOutcome::Exited {
                    now: self.clock.now(),
                    reason,
                };
            }
            self.drain_inbox();
            match self.next_due() {
                Some(due) if due <= limit && self.exit.is_none() => {
                    self.run_batch(ctx);
                }
                _ if self.exit.is_some() => {}
                _ => break,
            }
        }
        if limit > self.clock.now() {
            self.clock.advance_to(limit);
        }
        RunOutcome::LimitReached {
            now: self.clock.now(),
        }
    }

    fn pop_due(&mut self, tick: Tick) -> Option<(OrderKey, ItemId)> {
        let first = self.pending.first_entry()?;
        if first.key().due != tick {
            return None;
        }
        Some(first.remove_entry())
    }

    fn invoke(&mut self, ctx: &mut C, key: OrderKey, id: ItemId) {
        let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) else {
            self.fatal(Violation::UnknownItem { item: id });
        };
        entry.key = None;
        entry.state = ItemState::Executing;
        self.stats.serviced += 1;

        if std::mem::take(&mut entry.squashed) {
            self.stats.squashed += 1;
            trace!(queue = %self.name, item = %id, due = %key.due, "skipping squashed item");
        } else {
            let Some(mut action) = entry.action.take() else {
                unreachable!("pending {id} has no action");
            };
            trace!(
                queue = %self.name,
                item = %id,
                name = %entry.name,
                due = %key.due,
                priority = %key.priority,
                seq = key.seq,
                "servicing"
            );

            self.in_action = true;
            self.current = Some(id);
            action(ctx, self);
            self.current = None;
            self.in_action = false;

            // The action may have destroyed its own item.
            if let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) {
                entry.action = Some(action);
            }
        }

        let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) else {
            return;
        };
        if entry.state != ItemState::Executing {
            // Re-armed by its own action.
            return;
        }
        if entry.ownership == Ownership::CallerOwned {
            entry.state = ItemState::Idle;
        } else {
            self.reclaim(id);
        }
    }

    fn link(&mut self, id: ItemId, due: Tick, priority: Priority) {
        let key = OrderKey {
            due,
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.link_at(id, key);
    }

    pub(crate) fn link_at(&mut self, id: ItemId, key: OrderKey) {
        let previous = self.pending.insert(key, id);
        debug_assert!(previous.is_none(), "order key {key:?} reused");
        if let Some(entry) = entry_in_mut(&mut self.slots, self.queue_id, id) {
            entry.key = Some(key);
            entry.state = ItemState::Pending;
            entry.squashed = false;
            trace!(
                queue = %self.name,
                item = %id,
                name = %entry.name,
                due = %key.due,
                priority = %key.priority,
                seq = key.seq,
                "scheduled"
            );
        }
    }

    fn unlink(&mut self, key: OrderKey) {
        self.pending.remove(&key);
        // Hand the newest sequence number back so a schedule/deschedule pair leaves no trace.
        if key.seq + 1 == self.next_seq {
            self.next_seq = key.seq;
        }
    }

    fn reclaim(&mut self, id: ItemId) {
        self.free_slot(id);
        self.stats.reclaimed += 1;
        trace!(queue = %self.name, item = %id, "reclaimed");
    }

    fn free_slot(&mut self, id: ItemId) {
        let slot = &mut self.slots[id.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    fn drain_inbox(&mut self) {
        while let Some(msg) = self.inbox.try_next() {
            self.stats.handoffs += 1;
            match msg {
                Handoff::Insert {
                    name,
                    action,
                    due,
                    priority,
                } => {
                    let action: Action<C> = action;
                    let id = self.create(WorkItem {
                        ownership: Ownership::QueueOwned,
                        name,
                        action,
                        checkpoint: None,
                    });
                    debug!(queue = %self.name, item = %id, %due, now = %self.clock.now(), "hand-off insert");
                    self.schedule(id, due, priority);
                }
                Handoff::Schedule {
                    item,
                    due,
                    priority,
                } => self.schedule(item, due, priority),
                Handoff::Deschedule { item } => self.deschedule(item),
                Handoff::Reschedule {
                    item,
                    due,
                    priority,
                    force_if_idle,
                } => self.reschedule(item, due, priority, force_if_idle),
                Handoff::Squash { item } => self.squash(item),
                Handoff::Exit { reason } => self.request_exit(reason),
            }
        }
    }

    #[track_caller]
    pub(crate) fn enter(&self, operation: &'static str) {
        if self.in_action {
            self.fatal(Violation::ReentrantService { operation });
        }
    }

    #[cold]
    #[track_caller]
    pub(crate) fn fatal(&self, violation: Violation) -> ! {
        let now = self.clock.now();
        error!(queue = %self.name, %now, %violation, "event queue precondition failed");
        panic!("event queue `{}` at tick {now}: {violation}", self.name);
    }
}

impl<C> fmt::Debug for EventQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("name", &self.name)
            .field("now", &self.clock.now())
            .field("pending", &self.pending.len())
            .field("live_items", &self.live_items())
            .finish_non_exhaustive()
    }
}
