//! Versioned binary container for event-queue checkpoints.
//!
//! A checkpoint holds one `TIMELINE` section per event queue, each carrying the queue's
//! [`QueueSnapshot`]. Item payloads stay opaque; they are only (optionally) compressed.

mod error;
mod format;
mod io;
mod payload;

pub use crate::error::{Result, SnapshotError};
pub use crate::format::{
    SectionId, CHECKPOINT_ENDIANNESS_LITTLE, CHECKPOINT_MAGIC, CHECKPOINT_VERSION_V1,
};
pub use crate::payload::{Compression, MAX_PAYLOAD_LEN};

use std::collections::BTreeSet;
use std::io::{Read, Seek, SeekFrom, Write};

use ticksim_eventq::{
    CheckpointError, EventQueue, KindTag, PendingRecord, Priority, QueueSnapshot, Tick,
};
use tracing::debug;

use crate::io::{ReadLeExt, WriteLeExt};

const MAX_TIMELINES: u32 = 4096;
const MAX_RECORDS_PER_TIMELINE: u32 = 1 << 20;
const MAX_TIMELINE_NAME_LEN: usize = 256;

/// The saved pending set of one named timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineState {
    pub name: String,
    pub snapshot: QueueSnapshot,
}

impl TimelineState {
    /// Snapshots `queue`, naming the timeline after the queue.
    pub fn capture<C>(
        queue: &EventQueue<C>,
        ctx: &C,
    ) -> std::result::Result<Self, CheckpointError> {
        Ok(Self {
            name: queue.name().to_string(),
            snapshot: queue.snapshot(ctx)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub compression: Compression,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Lz4,
        }
    }
}

/// Writes a checkpoint holding `timelines`.
///
/// Timelines are written sorted by name so equal inputs produce identical bytes.
pub fn save_timelines<W: Write + Seek>(
    w: &mut W,
    timelines: &[TimelineState],
    options: SaveOptions,
) -> Result<()> {
    let mut sorted: Vec<&TimelineState> = timelines.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(SnapshotError::DuplicateTimeline(pair[0].name.clone()));
    }
    let count: u32 = sorted
        .len()
        .try_into()
        .ok()
        .filter(|&count| count <= MAX_TIMELINES)
        .ok_or(SnapshotError::Corrupt("too many timelines"))?;

    write_file_header(w)?;
    write_section(w, SectionId::META, 1, 0, |w| w.write_u32_le(count))?;
    for timeline in sorted {
        timeline.snapshot.validate()?;
        write_section(w, SectionId::TIMELINE, 1, 0, |w| {
            encode_timeline(w, timeline, options)
        })?;
        debug!(
            timeline = %timeline.name,
            now = %timeline.snapshot.now,
            records = timeline.snapshot.records.len(),
            "timeline saved"
        );
    }
    Ok(())
}

/// Reads every timeline from a checkpoint, in the order they were written.
///
/// Each returned snapshot has passed [`QueueSnapshot::validate`].
pub fn load_timelines<R: Read>(r: &mut R) -> Result<Vec<TimelineState>> {
    read_file_header(r)?;

    let mut expected: Option<u32> = None;
    let mut names = BTreeSet::new();
    let mut timelines = Vec::new();

    while let Some(header) = read_section_header(r)? {
        let mut section_reader = r.take(header.len);
        match header.id {
            id if id == SectionId::META => {
                if header.version == 1 {
                    if expected.is_some() {
                        return Err(SnapshotError::Corrupt("duplicate META section"));
                    }
                    let count = section_reader.read_u32_le()?;
                    if count > MAX_TIMELINES {
                        return Err(SnapshotError::Corrupt("too many timelines"));
                    }
                    expected = Some(count);
                }
            }
            id if id == SectionId::TIMELINE => {
                if header.version == 1 {
                    if timelines.len() >= MAX_TIMELINES as usize {
                        return Err(SnapshotError::Corrupt("too many timelines"));
                    }
                    let timeline = decode_timeline(&mut section_reader)?;
                    if !names.insert(timeline.name.clone()) {
                        return Err(SnapshotError::DuplicateTimeline(timeline.name));
                    }
                    debug!(
                        timeline = %timeline.name,
                        now = %timeline.snapshot.now,
                        records = timeline.snapshot.records.len(),
                        "timeline loaded"
                    );
                    timelines.push(timeline);
                }
            }
            _ => {
                // Unknown section; skip.
            }
        }

        // Consume any trailing bytes (forward-compatible additions inside known sections).
        std::io::copy(&mut section_reader, &mut std::io::sink())?;
        if section_reader.limit() != 0 {
            return Err(SnapshotError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated section payload",
            )));
        }
    }

    let expected = expected.ok_or(SnapshotError::Corrupt("missing META section"))?;
    let found = timelines.len() as u32;
    if found != expected {
        return Err(SnapshotError::TimelineCountMismatch { expected, found });
    }
    Ok(timelines)
}

fn encode_timeline<W: Write>(
    w: &mut W,
    timeline: &TimelineState,
    options: SaveOptions,
) -> Result<()> {
    if timeline.name.len() > MAX_TIMELINE_NAME_LEN {
        return Err(SnapshotError::Corrupt("timeline name too long"));
    }
    let snapshot = &timeline.snapshot;
    let count: u32 = snapshot
        .records
        .len()
        .try_into()
        .ok()
        .filter(|&count| count <= MAX_RECORDS_PER_TIMELINE)
        .ok_or(SnapshotError::Corrupt("too many pending records"))?;

    w.write_string_u32(&timeline.name)?;
    w.write_u64_le(snapshot.now.get())?;
    w.write_u64_le(snapshot.next_seq)?;
    w.write_u32_le(count)?;
    for record in &snapshot.records {
        w.write_bytes(&record.kind.as_bytes())?;
        w.write_u64_le(record.due.get())?;
        w.write_i16_le(record.priority.get())?;
        w.write_u64_le(record.seq)?;
        payload::encode_payload(w, options.compression, &record.payload)?;
    }
    Ok(())
}

fn decode_timeline<R: Read>(r: &mut R) -> Result<TimelineState> {
    let name = r.read_string_u32(MAX_TIMELINE_NAME_LEN)?;
    let now = Tick::new(r.read_u64_le()?);
    let next_seq = r.read_u64_le()?;
    let count = r.read_u32_le()?;
    if count > MAX_RECORDS_PER_TIMELINE {
        return Err(SnapshotError::Corrupt("too many pending records"));
    }

    let mut records = Vec::with_capacity((count as usize).min(64));
    for _ in 0..count {
        let mut kind = [0u8; 4];
        r.read_exact(&mut kind)?;
        let due = Tick::new(r.read_u64_le()?);
        let priority = Priority(r.read_i16_le()?);
        let seq = r.read_u64_le()?;
        let payload = payload::decode_payload(r)?;
        records.push(PendingRecord {
            kind: KindTag::new(kind),
            due,
            priority,
            seq,
            payload,
        });
    }

    let snapshot = QueueSnapshot {
        now,
        next_seq,
        records,
    };
    snapshot.validate()?;
    Ok(TimelineState { name, snapshot })
}

#[derive(Debug, Clone, Copy)]
struct SectionHeader {
    id: SectionId,
    version: u16,
    len: u64,
}

fn write_file_header<W: Write>(w: &mut W) -> Result<()> {
    w.write_bytes(CHECKPOINT_MAGIC)?;
    w.write_u16_le(CHECKPOINT_VERSION_V1)?;
    w.write_u8(CHECKPOINT_ENDIANNESS_LITTLE)?;
    w.write_u8(0)?; // reserved
    w.write_u32_le(0)?; // flags/reserved
    Ok(())
}

fn read_file_header<R: Read>(r: &mut R) -> Result<()> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != CHECKPOINT_MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }
    let version = r.read_u16_le()?;
    if version != CHECKPOINT_VERSION_V1 {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let endianness = r.read_u8()?;
    if endianness != CHECKPOINT_ENDIANNESS_LITTLE {
        return Err(SnapshotError::InvalidEndianness(endianness));
    }
    let _reserved = r.read_u8()?;
    let _flags = r.read_u32_le()?;
    Ok(())
}

fn write_section<W: Write + Seek>(
    w: &mut W,
    id: SectionId,
    version: u16,
    flags: u16,
    f: impl FnOnce(&mut W) -> Result<()>,
) -> Result<()> {
    let header_pos = w.stream_position()?;
    w.write_u32_le(id.0)?;
    w.write_u16_le(version)?;
    w.write_u16_le(flags)?;
    w.write_u64_le(0)?; // placeholder len

    let payload_start = w.stream_position()?;
    f(w)?;
    let payload_end = w.stream_position()?;

    let len = payload_end
        .checked_sub(payload_start)
        .ok_or(SnapshotError::Corrupt("stream position underflow"))?;

    w.seek(SeekFrom::Start(header_pos + 8))?;
    w.write_u64_le(len)?;
    w.seek(SeekFrom::Start(payload_end))?;
    Ok(())
}

fn read_section_header<R: Read>(r: &mut R) -> Result<Option<SectionHeader>> {
    let mut first = [0u8; 1];
    match r.read(&mut first)? {
        0 => return Ok(None),
        1 => {}
        _ => unreachable!("read() with 1-byte buffer"),
    }
    let mut tag_bytes = [0u8; 4];
    tag_bytes[0] = first[0];
    r.read_exact(&mut tag_bytes[1..])?;
    let id = SectionId(u32::from_le_bytes(tag_bytes));
    let version = r.read_u16_le()?;
    let _flags = r.read_u16_le()?;
    let len = r.read_u64_le()?;
    Ok(Some(SectionHeader { id, version, len }))
}
