/// Running counters for one queue.
///
/// Every field counts operations performed, so a schedule followed by a deschedule of the
/// same item leaves the pending set and sequence counter as they were but still bumps
/// `scheduled` and `descheduled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub scheduled: u64,
    pub descheduled: u64,
    pub rescheduled: u64,
    /// Items popped by the service loop, squashed ones included.
    pub serviced: u64,
    /// Items popped whose action was skipped because they were squashed.
    pub squashed: u64,
    /// Queue-owned items whose storage the queue reclaimed.
    pub reclaimed: u64,
    /// Operations received through the cross-timeline hand-off path.
    pub handoffs: u64,
}
