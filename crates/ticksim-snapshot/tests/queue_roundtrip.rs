#![cfg(not(target_arch = "wasm32"))]

use std::io::Cursor;

use pretty_assertions::assert_eq;
use ticksim_eventq::{
    CheckpointError, EventQueue, FactoryRegistry, KindTag, PendingRecord, Priority, QueueConfig,
    Tick, WorkItem,
};
use ticksim_snapshot::{load_timelines, save_timelines, SaveOptions, TimelineState};

const PERIODIC: KindTag = KindTag::new(*b"PERI");
const ONE_SHOT: KindTag = KindTag::new(*b"ONES");

type Fired = Vec<(String, Tick)>;
type Queue = EventQueue<Fired>;

fn periodic(label: &str, period: u64) -> WorkItem<Fired> {
    let saved = format!("{period}:{label}");
    let label = label.to_string();
    WorkItem::queue_owned(move |fired: &mut Fired, queue: &mut Queue| {
        fired.push((label.clone(), queue.now()));
        let me = queue.current().expect("running item");
        queue.schedule(me, queue.now() + period, Priority::CPU_TICK);
    })
    .checkpointed(PERIODIC, move |_| saved.clone().into_bytes())
}

fn one_shot(label: &str) -> WorkItem<Fired> {
    let saved = label.as_bytes().to_vec();
    let label = label.to_string();
    WorkItem::queue_owned(move |fired: &mut Fired, queue: &mut Queue| {
        fired.push((label.clone(), queue.now()))
    })
    .checkpointed(ONE_SHOT, move |_| saved.clone())
}

fn bad_payload(record: &PendingRecord, reason: &str) -> CheckpointError {
    CheckpointError::Rebuild {
        kind: record.kind,
        reason: reason.to_string(),
    }
}

fn factories() -> FactoryRegistry<Fired> {
    FactoryRegistry::new()
        .with(PERIODIC, |record: &PendingRecord, _: &mut Fired| {
            let text = std::str::from_utf8(&record.payload).map_err(|_| bad_payload(record, "utf-8"))?;
            let (period, label) = text
                .split_once(':')
                .ok_or_else(|| bad_payload(record, "missing period"))?;
            let period = period
                .parse()
                .map_err(|_| bad_payload(record, "bad period"))?;
            Ok(periodic(label, period))
        })
        .with(ONE_SHOT, |record: &PendingRecord, _: &mut Fired| {
            let label = std::str::from_utf8(&record.payload).map_err(|_| bad_payload(record, "utf-8"))?;
            Ok(one_shot(label))
        })
}

fn machine() -> (Queue, Queue) {
    let mut cpu = Queue::new(QueueConfig::named("cpu0"));
    cpu.schedule_new(periodic("lapic", 10), Tick::new(0), Priority::CPU_TICK);
    cpu.schedule_new(one_shot("ipi"), Tick::new(37), Priority::DEFAULT);

    let mut io = Queue::new(QueueConfig::named("io"));
    io.schedule_new(periodic("pit", 25), Tick::new(5), Priority::CPU_TICK);
    io.schedule_new(periodic("rtc", 64), Tick::new(64), Priority::CPU_TICK);
    io.schedule_new(one_shot("disk-irq"), Tick::new(40), Priority(-1));
    (cpu, io)
}

fn advance(queue: &mut Queue, fired: &mut Fired, steps: &[u64]) {
    for &step in steps {
        let limit = queue.now() + step;
        queue.run_until(fired, limit);
    }
}

#[test]
fn checkpoint_bytes_are_deterministic() {
    let (cpu, io) = machine();
    let timelines = [
        TimelineState::capture(&io, &Fired::new()).unwrap(),
        TimelineState::capture(&cpu, &Fired::new()).unwrap(),
    ];

    let mut first = Cursor::new(Vec::new());
    save_timelines(&mut first, &timelines, SaveOptions::default()).unwrap();
    let mut second = Cursor::new(Vec::new());
    save_timelines(&mut second, &timelines, SaveOptions::default()).unwrap();
    assert_eq!(first.into_inner(), second.into_inner());
}

#[test]
fn restored_timelines_produce_the_same_future() {
    let (mut cpu, mut io) = machine();
    let (mut cpu_fired, mut io_fired) = (Fired::new(), Fired::new());

    let pre_steps = [7, 13, 29, 3]; // -> now=52
    advance(&mut cpu, &mut cpu_fired, &pre_steps);
    advance(&mut io, &mut io_fired, &pre_steps);

    let mut file = Cursor::new(Vec::new());
    save_timelines(
        &mut file,
        &[
            TimelineState::capture(&cpu, &cpu_fired).unwrap(),
            TimelineState::capture(&io, &io_fired).unwrap(),
        ],
        SaveOptions::default(),
    )
    .unwrap();

    let post_steps = [1, 2, 3, 5, 8, 13, 21, 34];
    cpu_fired.clear();
    io_fired.clear();
    advance(&mut cpu, &mut cpu_fired, &post_steps);
    advance(&mut io, &mut io_fired, &post_steps);

    let loaded = load_timelines(&mut Cursor::new(file.into_inner())).unwrap();
    let names: Vec<_> = loaded.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["cpu0", "io"]);

    let mut restored_fired = Vec::new();
    for timeline in &loaded {
        let mut queue = Queue::new(QueueConfig::named(timeline.name.clone()));
        let mut fired = Fired::new();
        queue
            .restore(&timeline.snapshot, &mut factories(), &mut fired)
            .unwrap();
        assert_eq!(queue.now(), Tick::new(52));
        advance(&mut queue, &mut fired, &post_steps);
        restored_fired.push(fired);
    }

    assert_eq!(restored_fired, vec![cpu_fired, io_fired]);
}
