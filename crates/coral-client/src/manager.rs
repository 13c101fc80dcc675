//! The cluster topology manager.
//!
//! [`ClusterManager`] discovers the cluster from a seed list, keeps a live
//! slot-range → entry routing table, and runs a background reconciler that
//! periodically re-fetches `CLUSTER NODES` and applies the minimal diff:
//! master failovers first, then slave-set changes, then slot movement.
//! That order matters: master reassignment must land before slave
//! reconciliation so freezes hit the right entry, and slot moves must see
//! the post-failover topology.
//!
//! Nothing inside a tick can fail the schedule: every error is logged and
//! the next tick retries against whatever the cluster reports then.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use coral_cluster::{
    build_partitions, cluster_state, find_owner, key_slot, parse_cluster_nodes, slots_of,
    ClusterHealth, NodeAddr, Partition, SlotRange,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::connection::{Client, Connection};
use crate::entry::{FreezeReason, MasterEntry};
use crate::error::{ClusterError, ConnectionError};
use crate::registry::Registry;

/// A point-in-time copy of the routing table, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    /// `last_partitions`: the reconciled cluster view per slot range.
    pub partitions: Vec<(SlotRange, Option<Partition>)>,
    /// The master address each bound entry currently targets.
    pub entries: Vec<(SlotRange, Option<NodeAddr>)>,
}

/// Client-side manager for a sharded cluster's topology.
///
/// Cheap to clone; all clones share one registry and one reconciler.
#[derive(Debug, Clone)]
pub struct ClusterManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    config: ClusterConfig,
    /// The routing table. Guards are held only across pure map mutations,
    /// never across an await; the diffs read, compute, and write at
    /// discrete points so command dispatch is never blocked on I/O.
    registry: RwLock<Registry>,
    /// Probe connections reused across ticks, keyed by address. A cache
    /// hit is returned without a liveness re-check; callers that discover
    /// a dead connection simply don't put it back.
    probes: Mutex<HashMap<NodeAddr, Connection>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Recovers a read guard even if a writer panicked mid-update.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ClusterManager {
    /// Bootstraps the routing table from the configured seeds and starts
    /// the reconciler.
    ///
    /// Seeds are tried in order; the first one that yields a non-empty
    /// partition set wins. Fails with [`ClusterError::NoSeedsReachable`]
    /// when no seed produces a single registered slot range.
    pub async fn connect(config: ClusterConfig) -> Result<Self, ClusterError> {
        let inner = Arc::new(ManagerInner {
            config,
            registry: RwLock::new(Registry::new()),
            probes: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
        });

        for seed in inner.config.node_addresses.clone() {
            let Some(mut conn) = inner.probe_take(&seed, true).await else {
                continue;
            };
            let body = match conn.cluster_nodes().await {
                Ok(body) => {
                    inner.probe_put(conn).await;
                    body
                }
                Err(err) => {
                    debug!("seed {seed} failed to list cluster nodes: {err}");
                    continue;
                }
            };

            let partitions = build_partitions(&parse_cluster_nodes(&body));
            if partitions.is_empty() {
                continue;
            }

            for partition in partitions {
                inner.add_master_entry(partition, true).await;
            }
            break;
        }

        if read(&inner.registry).is_empty() {
            return Err(ClusterError::NoSeedsReachable);
        }

        let monitor = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                loop {
                    tokio::time::sleep(inner.config.scan_interval).await;
                    inner.tick().await;
                }
            }
        });
        *inner.monitor.lock().await = Some(monitor);

        Ok(Self { inner })
    }

    /// Maps a key to its hash slot.
    pub fn calc_slot(key: &[u8]) -> u16 {
        key_slot(key)
    }

    /// The entry currently serving `slot`, if the local view covers it.
    pub fn entry_for_slot(&self, slot: u16) -> Option<Arc<MasterEntry>> {
        read(&self.inner.registry).entry_for_slot(slot)
    }

    /// The entry currently serving `key`'s slot.
    pub fn entry_for_key(&self, key: &[u8]) -> Option<Arc<MasterEntry>> {
        self.entry_for_slot(key_slot(key))
    }

    /// The reconciled partition covering `slot`, if any.
    pub fn partition_for_slot(&self, slot: u16) -> Option<Partition> {
        read(&self.inner.registry).partition_for_slot(slot)
    }

    /// Copies out the current routing table.
    pub fn snapshot(&self) -> TopologySnapshot {
        let rows = read(&self.inner.registry).snapshot();
        TopologySnapshot {
            partitions: rows.iter().map(|(r, p, _)| (*r, p.clone())).collect(),
            entries: rows
                .iter()
                .map(|(r, _, e)| (*r, e.as_ref().and_then(|e| e.master_addr())))
                .collect(),
        }
    }

    /// Stops the reconciler, shuts down every entry's master connection,
    /// and closes all cached probe connections. Teardowns run in the
    /// background and need no ordering between entries.
    pub async fn shutdown(&self) {
        if let Some(monitor) = self.inner.monitor.lock().await.take() {
            monitor.abort();
        }

        let entries = read(&self.inner.registry).distinct_entries();
        for entry in entries {
            entry.shutdown_master_async();
        }

        let mut probes = self.inner.probes.lock().await;
        for (_, conn) in probes.drain() {
            conn.close_async();
        }
    }
}

impl ManagerInner {
    // -- probe connection cache --

    /// Takes a probe connection for `addr`: the cached one if present
    /// (without re-checking liveness), otherwise a fresh dial. Returns
    /// `None` on failure, with logging suppressed during bootstrap.
    async fn probe_take(&self, addr: &NodeAddr, suppress_logs: bool) -> Option<Connection> {
        if let Some(conn) = self.probes.lock().await.remove(addr) {
            return Some(conn);
        }

        let client = Client::new(addr.clone(), self.config.connect_options());
        match client.connect().await {
            Ok(conn) if conn.is_active() => Some(conn),
            Ok(conn) => {
                if !suppress_logs {
                    warn!("connection to {addr} is not active");
                }
                conn.close_async();
                None
            }
            Err(err) => {
                if !suppress_logs {
                    warn!("failed to connect to cluster node {addr}: {err}");
                }
                None
            }
        }
    }

    /// Returns a probe connection to the cache. Dead connections are
    /// discarded instead, which is how eviction happens.
    async fn probe_put(&self, conn: Connection) {
        if conn.is_active() {
            self.probes.lock().await.insert(conn.addr().clone(), conn);
        } else {
            conn.close_async();
        }
    }

    // -- reconciliation --

    /// One reconciliation tick: find a reachable member, fetch the fresh
    /// listing, and apply the diffs. Never propagates an error.
    async fn tick(self: &Arc<Self>) {
        let candidates = read(&self.registry).probe_candidates();

        for addr in candidates {
            let Some(mut conn) = self.probe_take(&addr, false).await else {
                continue;
            };
            let result = self.refresh_topology(&mut conn).await;
            self.probe_put(conn).await;
            if let Err(err) = result {
                warn!("cluster topology refresh via {addr} failed: {err}");
            }
            return;
        }

        warn!("no cluster node reachable; keeping last known topology");
    }

    async fn refresh_topology(
        self: &Arc<Self>,
        conn: &mut Connection,
    ) -> Result<(), ConnectionError> {
        let body = conn.cluster_nodes().await?;
        debug!("cluster nodes state from {}:\n{}", conn.addr(), body);

        let new_partitions = build_partitions(&parse_cluster_nodes(&body));
        if new_partitions.is_empty() {
            debug!("empty cluster nodes listing; no update this tick");
            return Ok(());
        }

        self.check_masters_change(&new_partitions);
        self.check_slaves_change(&new_partitions);
        self.check_slots_change(&new_partitions);
        Ok(())
    }

    /// Master-failover diff: a known master now flagged FAIL hands each of
    /// its slot ranges to whichever partition owns that range in the new
    /// listing. A range the new listing no longer mentions at all is left
    /// alone; the slots diff will deal with it.
    fn check_masters_change(&self, new_partitions: &[Partition]) {
        let currents = read(&self.registry).distinct_partitions();

        for new_part in new_partitions {
            if !new_part.master_fail || new_part.master_addr.is_none() {
                continue;
            }
            let Some(current) = currents
                .iter()
                .find(|c| c.master_addr == new_part.master_addr)
            else {
                continue;
            };
            let Some(mut current_addr) = current.master_addr.clone() else {
                continue;
            };

            for range in &current.slot_ranges {
                let Some(owner) = find_owner(new_partitions, range) else {
                    continue;
                };
                let Some(owner_addr) = owner.master_addr.clone() else {
                    continue;
                };
                if owner_addr == current_addr {
                    continue;
                }

                info!(
                    "changing master from {} to {} for {}",
                    current_addr, owner_addr, range
                );

                if let Some(entry) = read(&self.registry).entry_for_range(range) {
                    entry.change_master(owner_addr.clone());
                    entry.slave_down(&current_addr, FreezeReason::Manager);
                }
                write(&self.registry).update_partitions(&current.node_id, |p| {
                    p.master_addr = Some(owner_addr.clone());
                });
                current_addr = owner_addr;
            }
        }
    }

    /// Slave-set diff: pairwise by master address, freeze slaves that left
    /// the listing and activate ones that joined.
    fn check_slaves_change(&self, new_partitions: &[Partition]) {
        let currents = read(&self.registry).distinct_partitions();

        for new_part in new_partitions {
            if new_part.master_addr.is_none() {
                continue;
            }
            let Some(current) = currents
                .iter()
                .find(|c| c.master_addr == new_part.master_addr)
            else {
                continue;
            };

            let removed: Vec<NodeAddr> = current
                .slave_addrs
                .difference(&new_part.slave_addrs)
                .cloned()
                .collect();
            let added: Vec<NodeAddr> = new_part
                .slave_addrs
                .difference(&current.slave_addrs)
                .cloned()
                .collect();
            if removed.is_empty() && added.is_empty() {
                continue;
            }

            let Some(master_addr) = &current.master_addr else {
                continue;
            };
            let Some(entry) = read(&self.registry).entry_for_addr(master_addr) else {
                continue;
            };

            for addr in removed {
                write(&self.registry).update_partitions(&current.node_id, |p| {
                    p.slave_addrs.remove(&addr);
                });
                entry.slave_down(&addr, FreezeReason::Manager);
                info!("slave {addr} removed for master {master_addr}");
            }

            for addr in added {
                write(&self.registry).update_partitions(&current.node_id, |p| {
                    p.slave_addrs.insert(addr.clone());
                });
                entry.add_slave(addr.clone());
                entry.slave_up(&addr, FreezeReason::Manager);
                info!("slave {addr} added for master {master_addr}");
            }
        }
    }

    /// Slots diff: same-node migrations first, then ranges that vanished
    /// from the listing, then ranges that appeared.
    fn check_slots_change(self: &Arc<Self>, new_partitions: &[Partition]) {
        self.check_slots_migration(new_partitions);

        let new_slots = slots_of(new_partitions);

        // ranges the cluster no longer reports anywhere
        let removed: Vec<SlotRange> = read(&self.registry)
            .ranges()
            .into_iter()
            .filter(|range| !new_slots.contains(range))
            .collect();
        if !removed.is_empty() {
            info!("{} slot ranges found to remove", removed.len());
        }
        for range in removed {
            let entry = {
                let mut registry = write(&self.registry);
                registry.remove_partition(&range);
                registry.remove_master(&range)
            };
            if let Some(entry) = entry {
                self.decommission_if_drained(&entry);
            }
        }

        // ranges that appeared: bind to a live entry by master address,
        // or stand up a new one
        let current_ranges: HashSet<SlotRange> =
            read(&self.registry).ranges().into_iter().collect();
        let added: Vec<SlotRange> = new_slots
            .iter()
            .filter(|range| !current_ranges.contains(*range))
            .copied()
            .collect();
        if !added.is_empty() {
            info!("{} slot ranges found to add", added.len());
        }
        for range in added {
            let Some(partition) = find_owner(new_partitions, &range) else {
                continue;
            };
            let Some(master_addr) = &partition.master_addr else {
                continue;
            };

            let existing = read(&self.registry).entry_for_addr(master_addr);
            match existing {
                Some(entry) => {
                    let mut registry = write(&self.registry);
                    registry.add_entry(range, entry);
                    registry.insert_partition(range, partition.clone());
                    info!("{range} slot range added for {master_addr}");
                }
                None => {
                    // fire and forget; the next tick observes the effect
                    let inner = Arc::clone(self);
                    let partition = partition.clone();
                    tokio::spawn(async move {
                        inner.add_master_entry(partition, false).await;
                    });
                }
            }
        }
    }

    /// Migration diff: for partitions whose node id persists, move ranges
    /// that changed hands onto/off the entry located via any of the
    /// partition's currently-bound ranges. Additions land before removals
    /// so an entry never drains transiently mid-move.
    fn check_slots_migration(&self, new_partitions: &[Partition]) {
        let currents = read(&self.registry).distinct_partitions();

        for current in &currents {
            let Some(new_part) = new_partitions
                .iter()
                .find(|p| p.node_id == current.node_id)
            else {
                continue;
            };

            let added: Vec<SlotRange> = new_part
                .slot_ranges
                .difference(&current.slot_ranges)
                .copied()
                .collect();
            let removed: Vec<SlotRange> = current
                .slot_ranges
                .difference(&new_part.slot_ranges)
                .copied()
                .collect();
            if added.is_empty() && removed.is_empty() {
                continue;
            }

            let Some(anchor) = current.slot_ranges.iter().next() else {
                continue;
            };
            let Some(entry) = read(&self.registry).entry_for_range(anchor) else {
                continue;
            };
            let entry_addr = entry.master_addr();

            {
                let mut registry = write(&self.registry);

                for range in &added {
                    registry.add_entry(*range, entry.clone());
                    let mut partition = current.clone();
                    partition.slot_ranges = new_part.slot_ranges.clone();
                    registry.insert_partition(*range, partition);
                    info!("{range} slot added for {entry_addr:?}");
                }

                for range in &removed {
                    registry.remove_partition(range);
                    registry.remove_master(range);
                    info!("{range} slot removed for {entry_addr:?}");
                }

                registry.update_partitions(&current.node_id, |p| {
                    p.slot_ranges = new_part.slot_ranges.clone();
                });
            }

            self.decommission_if_drained(&entry);
        }
    }

    /// Shuts a master down once its last slot range is reassigned away.
    fn decommission_if_drained(&self, entry: &Arc<MasterEntry>) {
        if entry.slot_ranges_empty() {
            if let Some(addr) = entry.master_addr() {
                info!("{addr} master and slaves for it removed");
            }
            entry.shutdown_master_async();
        }
    }

    // -- entry creation --

    /// Stands up an entry for one partition and registers its slot ranges.
    ///
    /// Every failure here is a deliberate no-op: a FAIL-flagged master, an
    /// unreachable master, a cluster reporting `cluster_state:fail`, or a
    /// failed master setup all leave the partition unregistered for the
    /// next tick to retry.
    async fn add_master_entry(&self, partition: Partition, suppress_logs: bool) {
        if partition.master_fail {
            warn!(
                "failed to add master {:?} for slot ranges {:?}: server has FAIL flag",
                partition.master_addr, partition.slot_ranges
            );
            return;
        }
        let Some(master_addr) = partition.master_addr.clone() else {
            return;
        };

        let Some(mut conn) = self.probe_take(&master_addr, suppress_logs).await else {
            return;
        };
        let info_result = conn.cluster_info().await;
        self.probe_put(conn).await;

        let cluster_info = match info_result {
            Ok(map) => map,
            Err(err) => {
                if !suppress_logs {
                    warn!("failed to read cluster info from {master_addr}: {err}");
                }
                return;
            }
        };
        if cluster_state(&cluster_info) == ClusterHealth::Fail {
            warn!(
                "failed to add master {} for slot ranges {:?}: cluster_state:fail",
                master_addr, partition.slot_ranges
            );
            return;
        }

        let entry = Arc::new(MasterEntry::new(self.config.master_slave_config()));
        if self.config.read_from_slaves {
            entry.init_slaves(partition.slave_addrs.iter().cloned()).await;
            info!(
                "slaves {:?} added for slot ranges {:?}",
                partition.slave_addrs, partition.slot_ranges
            );
        }

        match entry.setup_master(master_addr.clone()).await {
            Ok(()) => {
                let mut registry = write(&self.registry);
                for range in &partition.slot_ranges {
                    registry.add_entry(*range, entry.clone());
                    registry.insert_partition(*range, partition.clone());
                }
                info!(
                    "master {} added for slot ranges {:?}",
                    master_addr, partition.slot_ranges
                );
            }
            Err(err) => {
                if !suppress_logs {
                    warn!("failed to set up master {master_addr}: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    fn test_inner() -> Arc<ManagerInner> {
        let config = ClusterConfig {
            connect_timeout: Duration::from_millis(500),
            timeout: Duration::from_millis(500),
            ..ClusterConfig::default()
        };
        Arc::new(ManagerInner {
            config,
            registry: RwLock::new(Registry::new()),
            probes: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
        })
    }

    fn test_manager(inner: &Arc<ManagerInner>) -> ClusterManager {
        ClusterManager {
            inner: Arc::clone(inner),
        }
    }

    fn test_entry() -> Arc<MasterEntry> {
        Arc::new(MasterEntry::new(
            ClusterConfig::default().master_slave_config(),
        ))
    }

    fn partition(node_id: &str, port: u16, ranges: &[SlotRange]) -> Partition {
        Partition {
            node_id: node_id.to_string(),
            master_addr: Some(NodeAddr::new("10.0.0.1", port)),
            slave_addrs: BTreeSet::new(),
            slot_ranges: ranges.iter().copied().collect(),
            master_fail: false,
        }
    }

    #[test]
    fn calc_slot_matches_key_slot() {
        assert_eq!(ClusterManager::calc_slot(b""), 0);
        assert_eq!(ClusterManager::calc_slot(b"foo"), 12182);
        assert_eq!(
            ClusterManager::calc_slot(b"user:{42}:a"),
            ClusterManager::calc_slot(b"42")
        );
    }

    #[test]
    fn entry_lookup_routes_by_slot_and_key() {
        let inner = test_inner();
        let manager = test_manager(&inner);
        let low = test_entry();
        let high = test_entry();
        {
            let mut registry = write(&inner.registry);
            registry.add_entry(SlotRange::new(0, 8191), low.clone());
            registry.add_entry(SlotRange::new(8192, 12999), high.clone());
        }

        assert!(Arc::ptr_eq(&manager.entry_for_slot(0).unwrap(), &low));
        assert!(Arc::ptr_eq(&manager.entry_for_slot(8191).unwrap(), &low));
        // "foo" hashes to slot 12182
        assert!(Arc::ptr_eq(&manager.entry_for_key(b"foo").unwrap(), &high));
        // uncovered tail of the slot space
        assert!(manager.entry_for_slot(13000).is_none());
    }

    #[test]
    fn snapshot_pairs_partitions_with_entries_in_range_order() {
        let inner = test_inner();
        let manager = test_manager(&inner);
        let r1 = SlotRange::new(0, 100);
        let r2 = SlotRange::new(101, 200);
        {
            let mut registry = write(&inner.registry);
            // insert out of order; the snapshot sorts by range start
            registry.add_entry(r2, test_entry());
            registry.insert_partition(r2, partition("bbb", 7001, &[r2]));
            registry.add_entry(r1, test_entry());
            registry.insert_partition(r1, partition("aaa", 7000, &[r1]));
        }

        let snap = manager.snapshot();
        let ranges: Vec<SlotRange> = snap.partitions.iter().map(|(r, _)| *r).collect();
        assert_eq!(ranges, vec![r1, r2]);
        assert_eq!(snap.partitions[0].1.as_ref().unwrap().node_id, "aaa");
        // entries that never completed setup_master report no address
        assert_eq!(snap.entries[0].1, None);
        assert_eq!(snap.entries.len(), snap.partitions.len());

        assert_eq!(manager.partition_for_slot(150).unwrap().node_id, "bbb");
        assert!(manager.partition_for_slot(300).is_none());
    }

    /// Listener that accepts and holds sockets open without answering.
    async fn spawn_silent_listener() -> (NodeAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                held.push(stream);
            }
        });
        (NodeAddr::new("127.0.0.1", port), handle)
    }

    #[tokio::test]
    async fn probe_cache_hit_skips_liveness_check() {
        let (addr, listener) = spawn_silent_listener().await;
        let inner = test_inner();

        let conn = inner.probe_take(&addr, true).await.expect("fresh dial");
        inner.probe_put(conn).await;
        assert_eq!(inner.probes.lock().await.len(), 1);

        // even with the node gone, the cached connection comes back as-is
        listener.abort();
        let cached = inner
            .probe_take(&addr, true)
            .await
            .expect("cache hit without a health check");
        assert!(cached.is_active());
        assert!(inner.probes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn probe_put_discards_inactive_connections() {
        // accept one connection and immediately drop it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = NodeAddr::new("127.0.0.1", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let inner = test_inner();
        let mut conn = inner.probe_take(&addr, true).await.expect("dial succeeds");
        assert!(conn.request(&["PING"]).await.is_err());
        assert!(!conn.is_active());

        // a dead connection is dropped instead of cached
        inner.probe_put(conn).await;
        assert!(inner.probes.lock().await.is_empty());

        // and with no listener left, a fresh dial yields nothing
        assert!(inner.probe_take(&addr, true).await.is_none());
    }
}
