//! The entry registry: the single authority over slot-range routing.
//!
//! Two maps move in lockstep: `last_partitions` is the last reconciled
//! cluster view keyed by slot range, and `entries` binds each of those
//! ranges to the [`MasterEntry`] serving it. Between reconciliation ticks
//! the key sets are identical, and for every range the bound entry's
//! master address equals the partition's.
//!
//! All methods are synchronous map operations; the manager wraps the
//! registry in a lock and never holds it across I/O.

use std::collections::HashMap;
use std::sync::Arc;

use coral_cluster::{NodeAddr, Partition, SlotRange};

use crate::entry::MasterEntry;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    last_partitions: HashMap<SlotRange, Partition>,
    entries: HashMap<SlotRange, Arc<MasterEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.last_partitions.is_empty()
    }

    // -- bindings --

    /// Binds a range to an entry; the entry's own range set gains it too.
    pub fn add_entry(&mut self, range: SlotRange, entry: Arc<MasterEntry>) {
        entry.add_slot_range(range);
        self.entries.insert(range, entry);
    }

    /// Detaches a range from its entry, returning the entry so the caller
    /// can decide whether to decommission it.
    pub fn remove_master(&mut self, range: &SlotRange) -> Option<Arc<MasterEntry>> {
        let entry = self.entries.remove(range)?;
        entry.remove_slot_range(range);
        Some(entry)
    }

    pub fn insert_partition(&mut self, range: SlotRange, partition: Partition) {
        self.last_partitions.insert(range, partition);
    }

    pub fn remove_partition(&mut self, range: &SlotRange) -> Option<Partition> {
        self.last_partitions.remove(range)
    }

    /// Applies `f` to every stored copy of the partition with `node_id`.
    ///
    /// The same logical partition is stored once per slot range it serves,
    /// so point updates (master address, slave set) must touch all copies.
    pub fn update_partitions<F: FnMut(&mut Partition)>(&mut self, node_id: &str, mut f: F) {
        for partition in self.last_partitions.values_mut() {
            if partition.node_id == node_id {
                f(partition);
            }
        }
    }

    // -- lookups --

    pub fn ranges(&self) -> Vec<SlotRange> {
        self.last_partitions.keys().copied().collect()
    }

    pub fn entry_for_range(&self, range: &SlotRange) -> Option<Arc<MasterEntry>> {
        self.entries.get(range).cloned()
    }

    pub fn entry_for_slot(&self, slot: u16) -> Option<Arc<MasterEntry>> {
        self.entries
            .iter()
            .find(|(range, _)| range.contains(slot))
            .map(|(_, entry)| entry.clone())
    }

    /// Finds an entry by the master's network address, not node id;
    /// this is how slot additions reuse a live entry after a failover
    /// changed which node id serves an address.
    pub fn entry_for_addr(&self, addr: &NodeAddr) -> Option<Arc<MasterEntry>> {
        self.entries
            .values()
            .find(|entry| entry.master_addr().as_ref() == Some(addr))
            .cloned()
    }

    pub fn partition_for_range(&self, range: &SlotRange) -> Option<Partition> {
        self.last_partitions.get(range).cloned()
    }

    pub fn partition_for_slot(&self, slot: u16) -> Option<Partition> {
        self.last_partitions
            .iter()
            .find(|(range, _)| range.contains(slot))
            .map(|(_, partition)| partition.clone())
    }

    /// One copy of each distinct partition, ordered by node id.
    pub fn distinct_partitions(&self) -> Vec<Partition> {
        let mut seen: Vec<Partition> = Vec::new();
        for partition in self.last_partitions.values() {
            if !seen.iter().any(|p| p.node_id == partition.node_id) {
                seen.push(partition.clone());
            }
        }
        seen.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        seen
    }

    /// One handle per distinct entry.
    pub fn distinct_entries(&self) -> Vec<Arc<MasterEntry>> {
        let mut seen: Vec<Arc<MasterEntry>> = Vec::new();
        for entry in self.entries.values() {
            if !seen.iter().any(|e| Arc::ptr_eq(e, entry)) {
                seen.push(entry.clone());
            }
        }
        seen
    }

    /// Probe candidates for a reconciliation tick: every member address of
    /// every distinct partition, master first within each.
    pub fn probe_candidates(&self) -> Vec<NodeAddr> {
        let mut candidates = Vec::new();
        for partition in self.distinct_partitions() {
            for addr in partition.all_addrs() {
                if !candidates.contains(&addr) {
                    candidates.push(addr);
                }
            }
        }
        candidates
    }

    /// Snapshot of both maps for inspection: `(range, partition, entry)`
    /// triples sorted by range start.
    pub fn snapshot(&self) -> Vec<(SlotRange, Option<Partition>, Option<Arc<MasterEntry>>)> {
        let mut ranges: Vec<SlotRange> = self
            .last_partitions
            .keys()
            .chain(self.entries.keys())
            .copied()
            .collect();
        ranges.sort_by_key(|r| (r.start, r.end));
        ranges.dedup();

        ranges
            .into_iter()
            .map(|range| {
                (
                    range,
                    self.last_partitions.get(&range).cloned(),
                    self.entries.get(&range).cloned(),
                )
            })
            .collect()
    }
}
