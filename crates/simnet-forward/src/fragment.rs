//! Packet fragmentation and fragment-train reassembly.
//!
//! Simulator convention: fragments are size-only bookkeeping except for
//! the offset-zero piece, which carries the captured original body. A
//! reassembled packet is handed up only when its declared original size
//! is known and the received-range accounting covers it without gaps.

use std::collections::HashMap;

use simnet_core::{Address, Body, Packet, PacketFlags, ProtocolId};
use tracing::{trace, warn};

use crate::error::FragmentError;
use crate::timer::TimerQueue;

/// Split an oversized packet into fragments fitting `mtu`.
///
/// The fragment count is `ceil(S / (M - H))` for body size `S`, MTU `M`
/// and header size `H`. The packet's own sequence id is reused for every
/// fragment; re-fragmenting an existing fragment never mints a new id,
/// and its offsets accumulate on top of the packet's own offset. A header
/// that does not fit the MTU aborts with no partial output.
pub fn fragment(packet: &Packet, mtu: usize) -> Result<Vec<Packet>, FragmentError> {
    let header = packet.header_len;
    if header >= mtu {
        return Err(FragmentError::HeaderExceedsMtu { header, mtu });
    }

    let chunk = mtu - header;
    let total = packet.payload_len;
    if total <= chunk {
        return Ok(vec![packet.clone()]);
    }

    let count = total.div_ceil(chunk);
    let mut fragments = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let len = chunk.min(total - offset);
        let mut piece = packet.clone();
        piece.frag_offset = packet.frag_offset + offset;
        piece.payload_len = len;
        // The last piece inherits the packet's own more-fragments flag,
        // so re-fragmenting a middle fragment keeps the train open.
        piece.flags.more_fragments = i + 1 < count || packet.flags.more_fragments;
        if i > 0 {
            piece.body = Body::Empty;
        }
        offset += len;
        fragments.push(piece);
    }
    trace!(seq = packet.seq, count, "fragmented packet");
    Ok(fragments)
}

/// Identity of a fragment train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub source: Address,
    pub destination: Address,
    pub protocol: ProtocolId,
    pub seq: u64,
}

impl FragmentKey {
    fn of(packet: &Packet) -> Self {
        Self {
            source: packet.source,
            destination: packet.destination,
            protocol: packet.protocol,
            seq: packet.seq,
        }
    }
}

/// Sorted, coalesced set of received byte ranges.
#[derive(Debug, Default)]
struct RangeSet {
    ranges: Vec<(usize, usize)>,
}

impl RangeSet {
    /// Mark `[start, end)` as received.
    fn insert(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let at = self.ranges.partition_point(|r| r.0 < start);
        self.ranges.insert(at, (start, end));
        // Coalesce overlapping and adjacent neighbors.
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }

    /// Whether `[0, total)` is covered without gaps.
    fn covers(&self, total: usize) -> bool {
        matches!(self.ranges.first(), Some(&(0, end)) if end >= total)
    }
}

struct ReassemblyRecord {
    ranges: RangeSet,
    /// Original body, captured when the offset-zero fragment arrives.
    body: Option<Body>,
    /// Flags of the offset-zero fragment (tunnel marker travels there).
    head_flags: Option<PacketFlags>,
    /// Declared original size, fixed by the no-more-fragments fragment.
    total: Option<usize>,
    /// Template for the reconstructed packet, refreshed per fragment.
    last: Packet,
    timer: crate::timer::TimerToken,
}

impl ReassemblyRecord {
    fn complete(&self) -> bool {
        self.total.is_some_and(|t| self.ranges.covers(t))
    }
}

/// Reconstructs fragment trains, keyed by
/// `(source, destination, protocol, sequence id)`.
///
/// Records exist only while incomplete: completion and timeout both
/// remove them, and both cancel the record's timer idempotently.
#[must_use]
pub struct ReassemblyEngine {
    records: HashMap<FragmentKey, ReassemblyRecord>,
    timers: TimerQueue<FragmentKey>,
    /// Seconds an incomplete record may linger.
    record_ttl: f64,
}

impl ReassemblyEngine {
    pub fn new(record_ttl: f64) -> Self {
        Self {
            records: HashMap::new(),
            timers: TimerQueue::new(),
            record_ttl,
        }
    }

    /// Absorb one fragment. Returns the reassembled packet once the train
    /// is complete, `None` while more data is needed.
    ///
    /// Non-fragment packets pass straight through.
    pub fn feed(&mut self, packet: Packet, now: f64) -> Option<Packet> {
        if !packet.is_fragment() {
            return Some(packet);
        }

        let key = FragmentKey::of(&packet);
        if !self.records.contains_key(&key) {
            trace!(?key, "new reassembly record");
            let timer = self.timers.schedule(now + self.record_ttl, key);
            self.records.insert(
                key,
                ReassemblyRecord {
                    ranges: RangeSet::default(),
                    body: None,
                    head_flags: None,
                    total: None,
                    last: packet.clone(),
                    timer,
                },
            );
        }
        let record = self.records.get_mut(&key)?;

        record
            .ranges
            .insert(packet.frag_offset, packet.frag_offset + packet.payload_len);
        if packet.frag_offset == 0 {
            record.head_flags = Some(packet.flags);
            record.body = Some(packet.body.clone());
        }
        if !packet.flags.more_fragments {
            record.total = Some(packet.frag_offset + packet.payload_len);
        }
        record.last = packet;

        if !record.complete() {
            return None;
        }

        let record = self.records.remove(&key)?;
        self.timers.cancel(record.timer);

        let mut whole = record.last;
        whole.flags = record.head_flags.unwrap_or(whole.flags);
        whole.flags.more_fragments = false;
        whole.frag_offset = 0;
        whole.payload_len = record.total?;
        whole.body = record.body.unwrap_or_default();
        trace!(?key, size = whole.payload_len, "reassembly complete");
        Some(whole)
    }

    /// Drop records whose timeout has passed, reporting their keys.
    pub fn expire(&mut self, now: f64) -> Vec<FragmentKey> {
        let mut expired = Vec::new();
        for (token, key) in self.timers.poll(now) {
            let Some(record) = self.records.get(&key) else {
                continue;
            };
            if record.timer != token {
                continue;
            }
            self.records.remove(&key);
            warn!(?key, "fragment timed out");
            expired.push(key);
        }
        expired
    }

    /// Virtual time of the next pending record timeout, if any.
    #[must_use]
    pub fn next_deadline(&mut self) -> Option<f64> {
        self.timers.next_deadline()
    }

    /// Number of incomplete reassembly records.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.records.len()
    }
}
