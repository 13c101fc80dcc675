//! Partitions: node records folded into one unit per logical master.
//!
//! A partition groups a master with the slaves replicating it and the slot
//! ranges they serve. The reconciliation diffs in `coral-client` operate on
//! partitions, never on raw node lines.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::nodes::{NodeAddr, NodeInfo};
use crate::slots::SlotRange;

/// One logical master: its address, replica set, slot ranges, and fail flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// The master's node id (slaves collapse into their master's partition).
    pub node_id: String,
    /// Absent while only slave lines for this master have been seen, or when
    /// the listing never names the master.
    pub master_addr: Option<NodeAddr>,
    pub slave_addrs: BTreeSet<NodeAddr>,
    pub slot_ranges: HashSet<SlotRange>,
    /// True when the master itself carries the FAIL flag. A failed slave
    /// does not taint its partition.
    pub master_fail: bool,
}

impl Partition {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            master_addr: None,
            slave_addrs: BTreeSet::new(),
            slot_ranges: HashSet::new(),
            master_fail: false,
        }
    }

    /// Returns true if any of this partition's ranges contains `slot`.
    pub fn serves_slot(&self, slot: u16) -> bool {
        self.slot_ranges.iter().any(|r| r.contains(slot))
    }

    /// All member addresses, master first. This is the probe order used when
    /// reconciler looks for a reachable node.
    pub fn all_addrs(&self) -> Vec<NodeAddr> {
        let mut addrs = Vec::with_capacity(1 + self.slave_addrs.len());
        if let Some(master) = &self.master_addr {
            addrs.push(master.clone());
        }
        addrs.extend(self.slave_addrs.iter().cloned());
        addrs
    }
}

/// Folds parsed node records into partitions, one per logical master.
///
/// Nodes flagged `noaddr` are skipped entirely. The partition key is the
/// node's own id for masters and `master_id` for slaves; slaves with no
/// `master_id` cannot be attributed and are dropped. First-seen order of
/// partition keys is preserved.
pub fn build_partitions(nodes: &[NodeInfo]) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for node in nodes {
        if node.flags.noaddr {
            continue;
        }

        let key = if node.flags.slave {
            match &node.master_id {
                Some(id) => id.clone(),
                None => continue,
            }
        } else {
            node.node_id.clone()
        };

        let idx = *index.entry(key.clone()).or_insert_with(|| {
            partitions.push(Partition::new(key));
            partitions.len() - 1
        });
        let partition = &mut partitions[idx];

        if node.flags.slave {
            partition.slave_addrs.insert(node.addr.clone());
        } else {
            partition.master_addr = Some(node.addr.clone());
            partition.slot_ranges.extend(node.slot_ranges.iter().copied());
            if node.flags.fail {
                partition.master_fail = true;
            }
        }
    }

    partitions
}

/// The union of all slot ranges across `partitions`.
pub fn slots_of(partitions: &[Partition]) -> HashSet<SlotRange> {
    partitions
        .iter()
        .flat_map(|p| p.slot_ranges.iter().copied())
        .collect()
}

/// Finds the partition whose range set contains `range` as an atomic unit.
pub fn find_owner<'a>(partitions: &'a [Partition], range: &SlotRange) -> Option<&'a Partition> {
    partitions.iter().find(|p| p.slot_ranges.contains(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::parse_cluster_nodes;

    fn partitions_for(body: &str) -> Vec<Partition> {
        build_partitions(&parse_cluster_nodes(body))
    }

    const THREE_MASTERS_ONE_SLAVE: &str = "\
aaa 10.0.0.1:6379 master - 0 0 1 connected 0-5460
bbb 10.0.0.2:6379 master - 0 0 2 connected 5461-10922
ccc 10.0.0.3:6379 master - 0 0 3 connected 10923-16383
ddd 10.0.0.4:6379 slave aaa 0 0 1 connected
";

    #[test]
    fn slaves_fold_into_master_partition() {
        let partitions = partitions_for(THREE_MASTERS_ONE_SLAVE);
        assert_eq!(partitions.len(), 3);

        let a = &partitions[0];
        assert_eq!(a.node_id, "aaa");
        assert_eq!(a.master_addr, Some(NodeAddr::new("10.0.0.1", 6379)));
        assert!(a.slave_addrs.contains(&NodeAddr::new("10.0.0.4", 6379)));
        assert_eq!(a.slot_ranges, HashSet::from([SlotRange::new(0, 5460)]));
    }

    #[test]
    fn slave_line_before_master_line() {
        let body = "\
ddd 10.0.0.4:6379 slave aaa 0 0 1 connected
aaa 10.0.0.1:6379 master - 0 0 1 connected 0-16383
";
        let partitions = partitions_for(body);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].node_id, "aaa");
        assert_eq!(
            partitions[0].master_addr,
            Some(NodeAddr::new("10.0.0.1", 6379))
        );
        assert_eq!(partitions[0].slave_addrs.len(), 1);
    }

    #[test]
    fn noaddr_nodes_skipped() {
        let body = "\
aaa 10.0.0.1:6379 master,noaddr - 0 0 1 connected 0-16383
bbb 10.0.0.2:6379 master - 0 0 2 connected
";
        let partitions = partitions_for(body);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].node_id, "bbb");
    }

    #[test]
    fn failed_master_sets_master_fail() {
        let body = "aaa 10.0.0.1:6379 master,fail - 0 0 1 disconnected\n";
        let partitions = partitions_for(body);
        assert!(partitions[0].master_fail);
    }

    #[test]
    fn failed_slave_does_not_taint_partition() {
        let body = "\
aaa 10.0.0.1:6379 master - 0 0 1 connected 0-16383
ddd 10.0.0.4:6379 slave,fail aaa 0 0 1 disconnected
";
        let partitions = partitions_for(body);
        assert_eq!(partitions.len(), 1);
        assert!(!partitions[0].master_fail);
        // the failed slave is still a member; freezing it is the
        // reconciler's call, not the parser's
        assert!(partitions[0]
            .slave_addrs
            .contains(&NodeAddr::new("10.0.0.4", 6379)));
    }

    #[test]
    fn serves_slot_and_all_addrs() {
        let partitions = partitions_for(THREE_MASTERS_ONE_SLAVE);
        let a = &partitions[0];
        assert!(a.serves_slot(0));
        assert!(a.serves_slot(5460));
        assert!(!a.serves_slot(5461));

        let addrs = a.all_addrs();
        assert_eq!(addrs[0], NodeAddr::new("10.0.0.1", 6379));
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn slots_of_unions_ranges() {
        let partitions = partitions_for(THREE_MASTERS_ONE_SLAVE);
        let slots = slots_of(&partitions);
        assert_eq!(slots.len(), 3);
        assert!(slots.contains(&SlotRange::new(5461, 10922)));
    }

    #[test]
    fn find_owner_matches_atomic_ranges() {
        let partitions = partitions_for(THREE_MASTERS_ONE_SLAVE);
        let owner = find_owner(&partitions, &SlotRange::new(5461, 10922)).unwrap();
        assert_eq!(owner.node_id, "bbb");
        // ranges are atomic units; a sub-range is not a match
        assert!(find_owner(&partitions, &SlotRange::new(5461, 6000)).is_none());
    }
}
