//! Best-effort shortcut over routing table lookups.
//!
//! The cache is advisory: the routing table stays ground truth, and the
//! cache is never proactively invalidated when the table changes. Entries
//! are kept sorted by destination for binary search; when the cache
//! overflows its fixed capacity a pseudo-randomly chosen entry is evicted.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use simnet_core::{Address, InterfaceId, InterfaceSet};

/// Default number of cached resolutions.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry {
    source: Address,
    destination: Address,
    incoming: Option<InterfaceId>,
    out_interfaces: InterfaceSet,
}

/// Bounded, destination-sorted cache of resolved outgoing interface sets.
#[must_use]
pub struct RouteCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    rng: SmallRng,
}

impl RouteCache {
    /// Create a cache with the given capacity and eviction seed.
    ///
    /// The seed keeps eviction order reproducible across simulation runs.
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Look up a cached resolution for `(source, destination, incoming)`.
    #[must_use]
    pub fn lookup(
        &self,
        source: Address,
        destination: Address,
        incoming: Option<InterfaceId>,
    ) -> Option<&InterfaceSet> {
        let probe = self
            .entries
            .binary_search_by(|e| e.destination.cmp(&destination))
            .ok()?;

        // Binary search lands on an arbitrary entry for this destination;
        // scan the neighbors sharing it for the exact (source, incoming).
        let matches = |e: &CacheEntry| e.source == source && e.incoming == incoming;
        let mut left = probe;
        while left > 0 && self.entries[left - 1].destination == destination {
            left -= 1;
        }
        for entry in &self.entries[left..] {
            if entry.destination != destination {
                break;
            }
            if matches(entry) {
                return Some(&entry.out_interfaces);
            }
        }
        None
    }

    /// Insert a resolution, evicting a random entry on overflow.
    pub fn insert(
        &mut self,
        source: Address,
        destination: Address,
        incoming: Option<InterfaceId>,
        out_interfaces: InterfaceSet,
    ) {
        let at = self
            .entries
            .partition_point(|e| e.destination < destination);
        self.entries.insert(
            at,
            CacheEntry {
                source,
                destination,
                incoming,
                out_interfaces,
            },
        );
        if self.entries.len() > self.capacity {
            let victim = self.rng.gen_range(0..self.entries.len());
            self.entries.remove(victim);
        }
    }

    /// Drop every cached resolution.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
