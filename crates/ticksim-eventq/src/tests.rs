use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::{
    EventQueue, HandoffError, ItemState, KindTag, Ownership, Priority, QueueConfig, RunOutcome,
    Tick, WorkItem,
};

type Log = Vec<(&'static str, Tick)>;
type Queue = EventQueue<Log>;

fn t(ticks: u64) -> Tick {
    Tick::new(ticks)
}

fn logged(ownership: Ownership, name: &'static str) -> WorkItem<Log> {
    WorkItem::new(ownership, move |log: &mut Log, queue: &mut Queue| {
        log.push((name, queue.now()))
    })
    .named(name)
}

fn names(log: &Log) -> Vec<&'static str> {
    log.iter().map(|(name, _)| *name).collect()
}

struct DropCounter(Rc<Cell<u32>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn due_then_priority_then_call_order() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();

    queue.schedule_new(logged(Ownership::QueueOwned, "A"), t(10), Priority(5));
    queue.schedule_new(logged(Ownership::QueueOwned, "B"), t(10), Priority(1));
    queue.schedule_new(logged(Ownership::QueueOwned, "C"), t(5), Priority(0));

    let outcome = queue.run(&mut log);
    assert_eq!(log, vec![("C", t(5)), ("B", t(10)), ("A", t(10))]);
    assert_eq!(outcome, RunOutcome::Drained { now: t(10) });
    assert_eq!(queue.now(), t(10));
}

#[test]
fn equal_due_and_priority_run_in_schedule_order() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    for name in ["first", "second", "third"] {
        queue.schedule_new(logged(Ownership::QueueOwned, name), t(3), Priority::DEFAULT);
    }
    queue.run(&mut log);
    assert_eq!(names(&log), vec!["first", "second", "third"]);
}

#[test]
fn queue_owned_item_is_reclaimed_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let guard = DropCounter(drops.clone());
    let mut queue = Queue::new(QueueConfig::default());
    let d = queue.schedule_new(
        WorkItem::queue_owned(move |_: &mut Log, _: &mut Queue| {
            let _keep = &guard;
        })
        .named("D"),
        t(1),
        Priority::DEFAULT,
    );

    assert_eq!(queue.run_batch(&mut Log::new()), Some(t(1)));
    assert!(!queue.contains(d));
    assert_eq!(queue.state(d), None);
    assert_eq!(queue.live_items(), 0);
    assert_eq!(queue.stats().reclaimed, 1);
    assert_eq!(drops.get(), 1);

    drop(queue);
    assert_eq!(drops.get(), 1);
}

#[test]
fn work_scheduled_for_now_joins_the_running_batch() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    let f = queue.create(logged(Ownership::CallerOwned, "F"));
    queue.schedule_new(
        WorkItem::queue_owned(move |log: &mut Log, queue: &mut Queue| {
            log.push(("E", queue.now()));
            queue.schedule(f, queue.now(), Priority::DEFAULT);
        })
        .named("E"),
        t(1),
        Priority::DEFAULT,
    );
    queue.schedule_new(logged(Ownership::QueueOwned, "G"), t(2), Priority::DEFAULT);

    assert_eq!(queue.run_batch(&mut log), Some(t(1)));
    assert_eq!(log, vec![("E", t(1)), ("F", t(1))]);
    assert_eq!(queue.now(), t(1));
    assert_eq!(queue.state(f), Some(ItemState::Idle));
    assert_eq!(queue.next_due(), Some(t(2)));
}

#[test]
fn same_tick_insertions_follow_the_total_order() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    queue.schedule_new(
        WorkItem::queue_owned(|log: &mut Log, queue: &mut Queue| {
            log.push(("trigger", queue.now()));
            let now = queue.now();
            queue.schedule_new(logged(Ownership::QueueOwned, "urgent"), now, Priority(-5));
            queue.schedule_new(logged(Ownership::QueueOwned, "tail"), now, Priority::DEFAULT);
        }),
        t(4),
        Priority::DEFAULT,
    );
    queue.schedule_new(logged(Ownership::QueueOwned, "queued"), t(4), Priority::DEFAULT);

    queue.run(&mut log);
    assert_eq!(names(&log), vec!["trigger", "urgent", "queued", "tail"]);
    assert!(log.iter().all(|&(_, tick)| tick == t(4)));
}

#[test]
fn schedule_then_deschedule_leaves_no_trace() {
    let mut queue = Queue::new(QueueConfig::default());
    let log = Log::new();
    let kind = KindTag::new(*b"TEST");
    let x = queue.create(logged(Ownership::CallerOwned, "x").checkpointed(kind, |_| Vec::new()));
    let y = queue.create(logged(Ownership::CallerOwned, "y").checkpointed(kind, |_| Vec::new()));
    queue.schedule(x, t(5), Priority::DEFAULT);

    let before = queue.snapshot(&log).unwrap();
    let pending_before: Vec<_> = queue.pending().map(|p| (p.id, p.due, p.seq)).collect();

    queue.schedule(y, t(3), Priority(-1));
    queue.deschedule(y);

    assert_eq!(queue.snapshot(&log).unwrap(), before);
    let pending_after: Vec<_> = queue.pending().map(|p| (p.id, p.due, p.seq)).collect();
    assert_eq!(pending_after, pending_before);
    assert_eq!(queue.state(y), Some(ItemState::Idle));
    assert_eq!(queue.next_due(), Some(t(5)));
    assert_eq!(queue.live_items(), 2);
    assert_eq!(queue.now(), Tick::ZERO);
    // Counters record the operations even though the queryable state is unchanged.
    assert_eq!(queue.stats().scheduled, 2);
    assert_eq!(queue.stats().descheduled, 1);
}

#[test]
fn reschedule_matches_deschedule_then_schedule() {
    fn build(queue: &mut Queue) -> crate::ItemId {
        queue.schedule_new(logged(Ownership::QueueOwned, "a"), t(2), Priority::DEFAULT);
        let e = queue.schedule_new(logged(Ownership::CallerOwned, "e"), t(1), Priority::DEFAULT);
        queue.schedule_new(logged(Ownership::QueueOwned, "b"), t(6), Priority(3));
        queue.schedule_new(logged(Ownership::QueueOwned, "c"), t(6), Priority(3));
        e
    }

    let mut atomic = Queue::new(QueueConfig::default());
    let e = build(&mut atomic);
    atomic.reschedule(e, t(6), Priority(3), false);

    let mut split = Queue::new(QueueConfig::default());
    let e2 = build(&mut split);
    split.deschedule(e2);
    split.schedule(e2, t(6), Priority(3));

    let (mut log_a, mut log_b) = (Log::new(), Log::new());
    atomic.run(&mut log_a);
    split.run(&mut log_b);
    assert_eq!(log_a, log_b);
    assert_eq!(names(&log_a), vec!["a", "b", "c", "e"]);
}

#[test]
fn reschedule_never_reclaims_a_queue_owned_item() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::QueueOwned, "q"), t(3), Priority::DEFAULT);
    queue.reschedule(id, t(8), Priority::DEFAULT, false);
    assert_eq!(queue.due_of(id), Some(t(8)));
    assert_eq!(queue.stats().reclaimed, 0);
}

#[test]
fn reschedule_with_force_schedules_an_idle_item() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.create(logged(Ownership::CallerOwned, "idle"));
    queue.reschedule(id, t(2), Priority::DEFAULT, true);
    assert!(queue.is_scheduled(id));
}

#[test]
fn periodic_item_rearms_itself() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    let id = queue.schedule_new(
        WorkItem::queue_owned(|log: &mut Log, queue: &mut Queue| {
            log.push(("tick", queue.now()));
            if log.len() < 4 {
                let me = queue.current().expect("running item");
                queue.schedule(me, queue.now() + 10, Priority::CPU_TICK);
            }
        }),
        t(0),
        Priority::CPU_TICK,
    );

    queue.run(&mut log);
    assert_eq!(
        log.iter().map(|&(_, tick)| tick).collect::<Vec<_>>(),
        vec![t(0), t(10), t(20), t(30)]
    );
    assert!(!queue.contains(id));
    assert_eq!(queue.stats().reclaimed, 1);
}

#[test]
fn caller_owned_item_may_destroy_itself_while_running() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(
        WorkItem::caller_owned(|_: &mut Log, queue: &mut Queue| {
            let me = queue.current().expect("running item");
            assert_eq!(queue.state(me), Some(ItemState::Executing));
            queue.destroy(me);
        }),
        t(1),
        Priority::DEFAULT,
    );
    queue.run(&mut Log::new());
    assert!(!queue.contains(id));
    assert_eq!(queue.live_items(), 0);
}

#[test]
fn descheduling_a_queue_owned_item_reclaims_it() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::QueueOwned, "gone"), t(5), Priority::DEFAULT);
    queue.deschedule(id);
    assert!(!queue.contains(id));
    assert!(queue.is_empty());
    assert_eq!(queue.live_items(), 0);
}

#[test]
fn reclaimed_slots_are_reused_under_a_new_generation() {
    let mut queue = Queue::new(QueueConfig::default());
    let first = queue.schedule_new(logged(Ownership::QueueOwned, "first"), t(1), Priority::DEFAULT);
    queue.run(&mut Log::new());
    let second = queue.create(logged(Ownership::CallerOwned, "second"));
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert_eq!(queue.state(first), None);
    assert_eq!(queue.item_name(second), Some("second"));
}

#[test]
fn squashed_items_keep_their_slot_but_skip_the_action() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    let a = queue.schedule_new(logged(Ownership::QueueOwned, "a"), t(2), Priority::DEFAULT);
    let c = queue.schedule_new(logged(Ownership::CallerOwned, "c"), t(2), Priority::DEFAULT);
    queue.schedule_new(logged(Ownership::QueueOwned, "b"), t(2), Priority::DEFAULT);

    queue.squash(a);
    queue.squash(c);
    assert!(queue.is_squashed(a));
    queue.reschedule(c, t(3), Priority::DEFAULT, false);
    assert!(!queue.is_squashed(c));

    queue.run(&mut log);
    assert_eq!(names(&log), vec!["b", "c"]);
    assert!(!queue.contains(a));
    assert_eq!(queue.stats().squashed, 1);
    assert_eq!(queue.stats().serviced, 3);
}

#[test]
fn exit_request_stops_after_the_current_item() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    queue.schedule_new(
        WorkItem::queue_owned(|log: &mut Log, queue: &mut Queue| {
            log.push(("halt", queue.now()));
            queue.request_exit("guest halted");
        }),
        t(3),
        Priority::DEFAULT,
    );
    queue.schedule_new(logged(Ownership::QueueOwned, "same-tick"), t(3), Priority(1));

    assert_eq!(
        queue.run(&mut log),
        RunOutcome::Exited {
            now: t(3),
            reason: "guest halted".to_string()
        }
    );
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(queue.exit_requested(), None);

    assert_eq!(queue.run(&mut log), RunOutcome::Drained { now: t(3) });
    assert_eq!(names(&log), vec!["halt", "same-tick"]);
}

#[test]
fn scheduled_exit_runs_after_other_work_on_its_tick() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    queue.schedule_exit(t(5), "limit");
    queue.schedule_new(logged(Ownership::QueueOwned, "late-prio"), t(5), Priority::STATS);
    queue.schedule_new(logged(Ownership::QueueOwned, "after"), t(9), Priority::DEFAULT);

    let outcome = queue.run(&mut log);
    assert_eq!(outcome.now(), t(5));
    assert!(matches!(outcome, RunOutcome::Exited { ref reason, .. } if reason == "limit"));
    assert_eq!(names(&log), vec!["late-prio"]);
    assert_eq!(queue.next_due(), Some(t(9)));
}

#[test]
fn run_until_services_up_to_the_limit_then_moves_the_clock() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    for due in [2, 4, 8] {
        queue.schedule_new(logged(Ownership::QueueOwned, "x"), t(due), Priority::DEFAULT);
    }

    assert_eq!(queue.run_until(&mut log, t(5)), RunOutcome::LimitReached { now: t(5) });
    assert_eq!(log.len(), 2);
    assert_eq!(queue.next_due(), Some(t(8)));

    assert_eq!(queue.run_until(&mut log, t(3)), RunOutcome::LimitReached { now: t(5) });
    assert_eq!(queue.run_until(&mut log, t(8)), RunOutcome::LimitReached { now: t(8) });
    assert_eq!(log.len(), 3);
}

#[test]
fn service_one_runs_a_single_item() {
    let mut queue = Queue::new(QueueConfig::default());
    let mut log = Log::new();
    queue.schedule_new(logged(Ownership::QueueOwned, "one"), t(3), Priority::DEFAULT);
    queue.schedule_new(logged(Ownership::QueueOwned, "two"), t(3), Priority::DEFAULT);

    assert_eq!(queue.service_one(&mut log), Some(t(3)));
    assert_eq!(names(&log), vec!["one"]);
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(queue.service_one(&mut log), Some(t(3)));
    assert_eq!(queue.service_one(&mut log), None);
}

#[test]
fn local_remote_hands_work_into_the_running_batch() {
    let mut queue = Queue::new(QueueConfig::named("cpu0"));
    let mut log = Log::new();
    let remote = queue.remote();
    assert_eq!(remote.timeline(), "cpu0");

    queue.schedule_new(
        WorkItem::queue_owned(move |log: &mut Log, queue: &mut Queue| {
            log.push(("sender", queue.now()));
            remote
                .schedule_new(
                    "handed-off",
                    queue.now(),
                    Priority::DEFAULT,
                    |log: &mut Log, queue: &mut Queue| log.push(("handed-off", queue.now())),
                )
                .unwrap();
        }),
        t(2),
        Priority::DEFAULT,
    );
    queue.schedule_new(logged(Ownership::QueueOwned, "later"), t(3), Priority::DEFAULT);

    assert_eq!(queue.run_batch(&mut log), Some(t(2)));
    assert_eq!(log, vec![("sender", t(2)), ("handed-off", t(2))]);
    assert_eq!(queue.stats().handoffs, 1);
}

#[test]
fn remote_reports_a_dropped_timeline() {
    let queue = Queue::new(QueueConfig::named("gone"));
    let remote = queue.remote();
    drop(queue);
    assert_eq!(
        remote.request_exit("bye"),
        Err(HandoffError::Disconnected {
            timeline: "gone".to_string()
        })
    );
}

#[test]
#[should_panic(expected = "causality violation")]
fn scheduling_in_the_past_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    queue.schedule_new(logged(Ownership::QueueOwned, "x"), t(10), Priority::DEFAULT);
    queue.run(&mut Log::new());
    queue.schedule_new(logged(Ownership::QueueOwned, "late"), t(9), Priority::DEFAULT);
}

#[test]
#[should_panic(expected = "double schedule")]
fn double_schedule_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::CallerOwned, "x"), t(1), Priority::DEFAULT);
    queue.schedule(id, t(2), Priority::DEFAULT);
}

#[test]
#[should_panic(expected = "invalid deschedule")]
fn descheduling_an_idle_item_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.create(logged(Ownership::CallerOwned, "x"));
    queue.deschedule(id);
}

#[test]
#[should_panic(expected = "invalid deschedule")]
fn rescheduling_an_idle_item_without_force_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.create(logged(Ownership::CallerOwned, "x"));
    queue.reschedule(id, t(1), Priority::DEFAULT, false);
}

#[test]
#[should_panic(expected = "dangling caller-owned item")]
fn destroying_a_pending_caller_owned_item_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::CallerOwned, "x"), t(1), Priority::DEFAULT);
    queue.destroy(id);
}

#[test]
#[should_panic(expected = "cannot be destroyed by its caller")]
fn destroying_a_scheduled_queue_owned_item_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::QueueOwned, "x"), t(4), Priority::DEFAULT);
    queue.destroy(id);
}

#[test]
fn never_scheduled_queue_owned_item_can_be_destroyed() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.create(logged(Ownership::QueueOwned, "x"));
    assert_eq!(queue.live_items(), 1);

    queue.destroy(id);
    assert!(!queue.contains(id));
    assert_eq!(queue.live_items(), 0);
    assert_eq!(queue.stats().reclaimed, 0);
}

#[test]
#[should_panic(expected = "unknown work item")]
fn handle_from_another_queue_is_fatal() {
    let mut a = Queue::new(QueueConfig::named("a"));
    let mut b = Queue::new(QueueConfig::named("b"));
    let a_id = a.schedule_new(logged(Ownership::QueueOwned, "on-a"), t(5), Priority::DEFAULT);
    let b_id = b.schedule_new(logged(Ownership::QueueOwned, "on-b"), t(5), Priority::DEFAULT);
    // Both live in slot 0 under generation 0; only the queue tag tells them apart.
    assert_ne!(a_id, b_id);
    assert!(!b.contains(a_id));
    assert_eq!(b.state(a_id), None);

    b.deschedule(a_id);
}

#[test]
#[should_panic(expected = "causality violation")]
fn late_handoff_is_fatal() {
    let mut queue = Queue::new(QueueConfig::named("target"));
    let mut log = Log::new();
    queue.schedule_new(logged(Ownership::QueueOwned, "advance"), t(5), Priority::DEFAULT);
    assert_eq!(queue.run(&mut log), RunOutcome::Drained { now: t(5) });

    queue
        .remote()
        .schedule_new("late", t(3), Priority::DEFAULT, |_: &mut Log, _: &mut Queue| {})
        .unwrap();
    queue.run_batch(&mut log);
}

#[test]
#[should_panic(expected = "unknown work item")]
fn using_a_reclaimed_handle_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    let id = queue.schedule_new(logged(Ownership::QueueOwned, "x"), t(1), Priority::DEFAULT);
    queue.run(&mut Log::new());
    queue.schedule(id, t(2), Priority::DEFAULT);
}

#[test]
#[should_panic(expected = "re-entrant run")]
fn running_the_queue_from_an_action_is_fatal() {
    let mut queue = Queue::new(QueueConfig::default());
    queue.schedule_new(
        WorkItem::queue_owned(|log: &mut Log, queue: &mut Queue| {
            queue.run(log);
        }),
        t(1),
        Priority::DEFAULT,
    );
    queue.run(&mut Log::new());
}

#[test]
#[should_panic(expected = "event queue `main` at tick 7")]
fn fatal_diagnostic_names_queue_and_tick() {
    let mut queue = Queue::new(QueueConfig::default());
    queue.schedule_new(logged(Ownership::QueueOwned, "x"), t(7), Priority::DEFAULT);
    queue.run(&mut Log::new());
    queue.schedule_new(logged(Ownership::QueueOwned, "y"), t(1), Priority::DEFAULT);
}
