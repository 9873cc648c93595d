//! The routing table: ground truth for forwarding decisions.
//!
//! Entries are stored under masked [`RouteKey`] patterns and evicted by
//! per-entry timers on the host's virtual clock. Every mutating call
//! reports what it actually changed as [`RouteEvent`]s; true no-ops are
//! silent.

use std::collections::HashMap;

use simnet_core::{Address, InterfaceId, InterfaceSet};
use tracing::debug;

use crate::timer::TimerQueue;

use super::entry::{RouteEntry, RouteEvent, RouteEventKind, RouteExtension, RouteUpdate};
use super::key::{MatchKind, RouteKey};

/// Key→entry store with exact, longest, all and wildcard matching and
/// timer-driven eviction.
#[must_use]
pub struct RoutingTable {
    entries: HashMap<RouteKey, RouteEntry>,
    timers: TimerQueue<RouteKey>,
    next_seq: u64,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            timers: TimerQueue::new(),
            next_seq: 0,
        }
    }

    /// Insert or merge an entry.
    ///
    /// Only the fields set in `update` overwrite an existing entry.
    /// `timeout` is relative seconds from `now`; `None` leaves the expiry
    /// of an existing entry unchanged and means "never" for a new one.
    /// Returns `Added` for a new entry, `Modified` when a merge changed
    /// anything observable (including the expiry), and `None` for a true
    /// no-op.
    pub fn add(
        &mut self,
        key: RouteKey,
        update: RouteUpdate,
        timeout: Option<f64>,
        now: f64,
    ) -> Option<RouteEvent> {
        let new_expiry = timeout.map(|t| now + t);

        if let Some(entry) = self.entries.get_mut(&key) {
            let mut changed = false;
            if let Some(out) = update.out_interfaces {
                if entry.out_interfaces != out {
                    entry.out_interfaces = out;
                    changed = true;
                }
            }
            if let Some(next_hop) = update.next_hop {
                if entry.next_hop != next_hop {
                    entry.next_hop = next_hop;
                    changed = true;
                }
            }
            if let Some(extension) = update.extension {
                let same = entry
                    .extension
                    .as_ref()
                    .is_some_and(|old| std::sync::Arc::ptr_eq(old, &extension));
                if !same {
                    entry.extension = Some(extension);
                    changed = true;
                }
            }
            if timeout.is_some() && entry.expires != new_expiry {
                // Expiry moved in either direction: the timer is
                // rescheduled, never left stale.
                if let Some(token) = entry.timer.take() {
                    self.timers.cancel(token);
                }
                entry.expires = new_expiry;
                entry.timer = new_expiry.map(|at| self.timers.schedule(at, key));
                changed = true;
            }
            if !changed {
                return None;
            }
            let snapshot = entry.clone();
            debug!(key = ?key, "route modified");
            return Some(RouteEvent {
                kind: RouteEventKind::Modified,
                key,
                entry: snapshot,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let timer = new_expiry.map(|at| self.timers.schedule(at, key));
        let entry = RouteEntry {
            key,
            out_interfaces: update.out_interfaces.unwrap_or_default(),
            next_hop: update.next_hop.unwrap_or(Address::NULL),
            extension: update.extension,
            expires: new_expiry,
            seq,
            timer,
        };
        let snapshot = entry.clone();
        self.entries.insert(key, entry);
        debug!(key = ?key, expires = ?new_expiry, "route added");
        Some(RouteEvent {
            kind: RouteEventKind::Added,
            key,
            entry: snapshot,
        })
    }

    /// Look up the entry registered under exactly this key pattern.
    #[must_use]
    pub fn get_exact(&self, key: &RouteKey) -> Option<&RouteEntry> {
        self.entries.get(key)
    }

    /// Mutable access to an entry registered under exactly this key pattern.
    pub fn get_mut(&mut self, key: &RouteKey) -> Option<&mut RouteEntry> {
        self.entries.get_mut(key)
    }

    /// Most specific entry matching a concrete triple.
    ///
    /// Among equally specific keys the earliest-inserted entry wins.
    #[must_use]
    pub fn get_longest(
        &self,
        source: Address,
        destination: Address,
        incoming: Option<InterfaceId>,
    ) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in self.entries.values() {
            if !entry.key.matches(source, destination, incoming) {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => {
                    let (es, bs) = (entry.key.specificity(), b.key.specificity());
                    es > bs || (es == bs && entry.seq < b.seq)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        best
    }

    /// All entries matching a concrete triple, most specific first.
    #[must_use]
    pub fn get_all(
        &self,
        source: Address,
        destination: Address,
        incoming: Option<InterfaceId>,
    ) -> Vec<&RouteEntry> {
        let mut matches: Vec<&RouteEntry> = self
            .entries
            .values()
            .filter(|e| e.key.matches(source, destination, incoming))
            .collect();
        matches.sort_by(|a, b| {
            b.key
                .specificity()
                .cmp(&a.key.specificity())
                .then(a.seq.cmp(&b.seq))
        });
        matches
    }

    /// All entries whose key overlaps a (possibly wildcarded) pattern.
    #[must_use]
    pub fn get_wildcard(&self, pattern: &RouteKey) -> Vec<&RouteEntry> {
        let mut matches: Vec<&RouteEntry> = self
            .entries
            .values()
            .filter(|e| e.key.overlaps(pattern))
            .collect();
        matches.sort_by_key(|e| e.seq);
        matches
    }

    /// Unified lookup used by the control surface.
    ///
    /// `Exact` and `Longest` yield at most one entry. A `Longest` or `All`
    /// query against a key whose address patterns are not exact is an
    /// invalid request and echoes back empty; lookups never fail.
    #[must_use]
    pub fn get(&self, key: &RouteKey, kind: MatchKind) -> Vec<&RouteEntry> {
        match kind {
            MatchKind::Exact => self.get_exact(key).into_iter().collect(),
            MatchKind::Longest => match Self::concrete_triple(key) {
                Some((src, dst)) => self
                    .get_longest(src, dst, key.incoming)
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            },
            MatchKind::All => match Self::concrete_triple(key) {
                Some((src, dst)) => self.get_all(src, dst, key.incoming),
                None => Vec::new(),
            },
            MatchKind::Wildcard => self.get_wildcard(key),
        }
    }

    /// Delete entries selected by `kind`, cancelling their timers.
    ///
    /// Removing an absent key is a no-op, not an error.
    pub fn remove(&mut self, key: &RouteKey, kind: MatchKind) -> Vec<RouteEvent> {
        let victims: Vec<RouteKey> = self.get(key, kind).iter().map(|e| e.key).collect();
        let mut events = Vec::with_capacity(victims.len());
        for victim in victims {
            if let Some(entry) = self.entries.remove(&victim) {
                if let Some(token) = entry.timer {
                    self.timers.cancel(token);
                }
                debug!(key = ?victim, "route removed");
                events.push(RouteEvent {
                    kind: RouteEventKind::Removed,
                    key: victim,
                    entry,
                });
            }
        }
        events
    }

    /// OR `interfaces` into the exact-matched entry's outgoing set.
    ///
    /// No-op if the key is absent; emits `Modified` only when the set,
    /// extension or expiry actually changed.
    pub fn graft(
        &mut self,
        key: &RouteKey,
        interfaces: &InterfaceSet,
        extension: Option<RouteExtension>,
        timeout: Option<f64>,
        now: f64,
    ) -> Option<RouteEvent> {
        self.adjust(key, interfaces, extension, timeout, now, true)
    }

    /// Subtract `interfaces` from the exact-matched entry's outgoing set.
    pub fn prune(
        &mut self,
        key: &RouteKey,
        interfaces: &InterfaceSet,
        extension: Option<RouteExtension>,
        timeout: Option<f64>,
        now: f64,
    ) -> Option<RouteEvent> {
        self.adjust(key, interfaces, extension, timeout, now, false)
    }

    fn adjust(
        &mut self,
        key: &RouteKey,
        interfaces: &InterfaceSet,
        extension: Option<RouteExtension>,
        timeout: Option<f64>,
        now: f64,
        grow: bool,
    ) -> Option<RouteEvent> {
        let entry = self.entries.get_mut(key)?;
        let mut changed = if grow {
            entry.out_interfaces.union_with(interfaces)
        } else {
            entry.out_interfaces.subtract(interfaces)
        };
        if let Some(extension) = extension {
            let same = entry
                .extension
                .as_ref()
                .is_some_and(|old| std::sync::Arc::ptr_eq(old, &extension));
            if !same {
                entry.extension = Some(extension);
                changed = true;
            }
        }
        if let Some(t) = timeout {
            let new_expiry = Some(now + t);
            if entry.expires != new_expiry {
                if let Some(token) = entry.timer.take() {
                    self.timers.cancel(token);
                }
                entry.expires = new_expiry;
                entry.timer = Some(self.timers.schedule(now + t, *key));
                changed = true;
            }
        }
        if !changed {
            return None;
        }
        let snapshot = entry.clone();
        debug!(key = ?key, grow, "route adjusted");
        Some(RouteEvent {
            kind: RouteEventKind::Modified,
            key: *key,
            entry: snapshot,
        })
    }

    /// Fire due eviction timers.
    ///
    /// A firing timer re-validates the stored expiry against `now` before
    /// deleting: if the entry was refreshed since the timer was armed, it
    /// is re-armed at the new expiry instead of being deleted.
    pub fn advance(&mut self, now: f64) -> Vec<RouteEvent> {
        let mut events = Vec::new();
        for (token, key) in self.timers.poll(now) {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if entry.timer != Some(token) {
                // Stale timer: the entry was rescheduled after this fired.
                continue;
            }
            match entry.expires {
                Some(expires) if expires > now => {
                    entry.timer = Some(self.timers.schedule(expires, key));
                }
                Some(_) => {
                    if let Some(entry) = self.entries.remove(&key) {
                        debug!(key = ?key, "route expired");
                        events.push(RouteEvent {
                            kind: RouteEventKind::Removed,
                            key,
                            entry,
                        });
                    }
                }
                None => {
                    entry.timer = None;
                }
            }
        }
        events
    }

    /// Virtual time of the next pending eviction, if any.
    #[must_use]
    pub fn next_deadline(&mut self) -> Option<f64> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    fn concrete_triple(key: &RouteKey) -> Option<(Address, Address)> {
        Some((key.source.as_exact()?, key.destination.as_exact()?))
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        // Overlapping keys of differing specificity: LONGEST always picks
        // the most specific one matching the queried triple.
        #[test]
        fn longest_beats_wider_keys(
            src in 1..1000u64,
            dst in 1..1000u64,
            iface in 0..8u32,
        ) {
            let mut table = RoutingTable::new();
            let wide = RouteKey::for_destination(Address(dst));
            let narrow = RouteKey::concrete(Address(src), Address(dst), InterfaceId(iface));

            let _ = table.add(wide, RouteUpdate::interfaces([InterfaceId(1)].into_iter().collect()), None, 0.0);
            let _ = table.add(narrow, RouteUpdate::interfaces([InterfaceId(2)].into_iter().collect()), None, 0.0);

            let hit = table
                .get_longest(Address(src), Address(dst), Some(InterfaceId(iface)))
                .unwrap();
            prop_assert_eq!(hit.key, narrow);
        }

        // An entry added with timeout T is gone at any time past T and
        // present at any time before it.
        #[test]
        fn timeout_boundary(timeout in 0.001..1000.0f64, probe in 0.0..2000.0f64) {
            let mut table = RoutingTable::new();
            let _ = table.add(
                RouteKey::for_destination(Address(9)),
                RouteUpdate::default(),
                Some(timeout),
                0.0,
            );
            table.advance(probe);
            let present = table.get_exact(&RouteKey::for_destination(Address(9))).is_some();
            prop_assert_eq!(present, probe < timeout);
        }
    }
}
