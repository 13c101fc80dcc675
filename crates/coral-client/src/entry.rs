//! Per-master entries: the connection resources behind one partition.
//!
//! An entry owns the master endpoint (and its held connection) plus the
//! slave list used for balanced reads. It knows nothing about the registry
//! that holds it: slot-range bookkeeping flows through return values, and
//! the manager decides what to do when a range set drains.

use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, PoisonError, RwLock};

use coral_cluster::{NodeAddr, SlotRange};
use coral_protocol::Frame;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MasterSlaveConfig;
use crate::connection::{Client, Connection};
use crate::error::ConnectionError;

/// Why a slave was frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeReason {
    /// The topology manager observed the slave leaving the cluster view.
    Manager,
    /// The connection dropped; a reconnect should revive it.
    Reconnect,
    /// An unrecoverable error on the slave's connections.
    System,
}

/// Availability of one slave endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Up,
    Down(FreezeReason),
}

/// One slave endpoint tracked by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRef {
    pub addr: NodeAddr,
    pub state: SlaveState,
}

/// The per-master connection resource serving one partition's traffic.
pub struct MasterEntry {
    config: MasterSlaveConfig,
    /// Current master endpoint; `None` until `setup_master` succeeds.
    target: RwLock<Option<Client>>,
    /// The held master connection, dialed lazily after a retarget.
    conn: Mutex<Option<Connection>>,
    slaves: RwLock<Vec<SlaveRef>>,
    cursor: AtomicUsize,
    ranges: RwLock<HashSet<SlotRange>>,
}

/// Recovers a read guard even if a writer panicked mid-update.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MasterEntry {
    pub fn new(config: MasterSlaveConfig) -> Self {
        Self {
            config,
            target: RwLock::new(None),
            conn: Mutex::new(None),
            slaves: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            ranges: RwLock::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &MasterSlaveConfig {
        &self.config
    }

    /// The master endpoint this entry currently targets.
    pub fn master_addr(&self) -> Option<NodeAddr> {
        read(&self.target).as_ref().map(|c| c.addr().clone())
    }

    // -- master lifecycle --

    /// Dials the master to validate it, then adopts it as the target.
    ///
    /// On failure nothing is stored; the caller treats this entry as never
    /// having existed.
    pub async fn setup_master(&self, addr: NodeAddr) -> Result<(), ConnectionError> {
        let client = Client::new(addr, self.config.connect_options());
        let conn = client.connect().await?;
        *write(&self.target) = Some(client);
        *self.conn.lock().await = Some(conn);
        Ok(())
    }

    /// Retargets this entry to a new master endpoint.
    ///
    /// The prior master connection is closed in the background right away;
    /// the next request dials the new endpoint. Slave state is untouched.
    pub fn change_master(self: &Arc<Self>, addr: NodeAddr) {
        *write(&self.target) = Some(Client::new(addr, self.config.connect_options()));

        let entry = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(old) = entry.conn.lock().await.take() {
                old.close_async();
            }
        });
    }

    /// Issues one command on the master connection, dialing it first if a
    /// retarget or an earlier failure left the entry without one.
    pub async fn master_request(&self, tokens: &[&str]) -> Result<Frame, ConnectionError> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            let client = match read(&self.target).clone() {
                Some(client) => client,
                None => return Err(ConnectionError::Inactive),
            };
            *guard = Some(client.connect().await?);
        }

        let conn = guard.as_mut().ok_or(ConnectionError::Inactive)?;
        let result = conn.request(tokens).await;

        if result.is_err() && !conn.is_active() {
            if let Some(dead) = guard.take() {
                dead.close_async();
            }
        }
        result
    }

    /// Closes the master connection in the background. The entry keeps its
    /// target so late lookups still see the address it served.
    pub fn shutdown_master_async(self: &Arc<Self>) {
        let entry = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(conn) = entry.conn.lock().await.take() {
                conn.close_async();
            }
        });
    }

    // -- slave set --

    /// Registers the initial slave set, probing each endpoint once.
    /// Unreachable slaves start frozen with [`FreezeReason::Reconnect`].
    pub async fn init_slaves(&self, addrs: impl IntoIterator<Item = NodeAddr>) {
        for addr in addrs {
            let client = Client::new(addr.clone(), self.config.connect_options());
            let state = match client.connect().await {
                Ok(conn) => {
                    conn.close_async();
                    SlaveState::Up
                }
                Err(err) => {
                    warn!("slave {addr} unreachable during setup: {err}");
                    SlaveState::Down(FreezeReason::Reconnect)
                }
            };
            write(&self.slaves).push(SlaveRef { addr, state });
        }
    }

    /// Adds a slave endpoint in the frozen state; `slave_up` activates it.
    pub fn add_slave(&self, addr: NodeAddr) {
        let mut slaves = write(&self.slaves);
        if slaves.iter().any(|s| s.addr == addr) {
            return;
        }
        slaves.push(SlaveRef {
            addr,
            state: SlaveState::Down(FreezeReason::Manager),
        });
    }

    /// Marks a slave usable. Returns false if the address is unknown or
    /// already up.
    pub fn slave_up(&self, addr: &NodeAddr, reason: FreezeReason) -> bool {
        let mut slaves = write(&self.slaves);
        for slave in slaves.iter_mut() {
            if slave.addr == *addr && slave.state != SlaveState::Up {
                debug!("slave {addr} up ({reason:?})");
                slave.state = SlaveState::Up;
                return true;
            }
        }
        false
    }

    /// Freezes a slave with the given reason. A slave already frozen keeps
    /// its original reason. Returns false if nothing changed.
    pub fn slave_down(&self, addr: &NodeAddr, reason: FreezeReason) -> bool {
        let mut slaves = write(&self.slaves);
        for slave in slaves.iter_mut() {
            if slave.addr == *addr && slave.state == SlaveState::Up {
                debug!("slave {addr} down ({reason:?})");
                slave.state = SlaveState::Down(reason);
                return true;
            }
        }
        false
    }

    /// Drops a slave endpoint from the entry entirely.
    pub fn remove_slave(&self, addr: &NodeAddr) {
        write(&self.slaves).retain(|s| s.addr != *addr);
    }

    pub fn slaves(&self) -> Vec<SlaveRef> {
        read(&self.slaves).clone()
    }

    /// Picks an up slave per the configured balancer, or `None` when no
    /// slave is usable (the caller falls back to the master).
    pub fn pick_slave(&self) -> Option<NodeAddr> {
        let slaves = read(&self.slaves);
        let up: Vec<&SlaveRef> = slaves
            .iter()
            .filter(|s| s.state == SlaveState::Up)
            .collect();
        let idx = self.config.load_balancer.pick(&self.cursor, up.len())?;
        Some(up[idx].addr.clone())
    }

    // -- slot ranges --

    pub fn add_slot_range(&self, range: SlotRange) {
        write(&self.ranges).insert(range);
    }

    /// Detaches a range. Returns true when the set became empty, which is
    /// the signal to decommission this entry.
    pub fn remove_slot_range(&self, range: &SlotRange) -> bool {
        let mut ranges = write(&self.ranges);
        ranges.remove(range);
        ranges.is_empty()
    }

    pub fn slot_ranges(&self) -> HashSet<SlotRange> {
        read(&self.ranges).clone()
    }

    pub fn slot_ranges_empty(&self) -> bool {
        read(&self.ranges).is_empty()
    }
}

impl std::fmt::Debug for MasterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterEntry")
            .field("master", &self.master_addr())
            .field("slaves", &read(&self.slaves).len())
            .field("ranges", &read(&self.ranges).len())
            .finish_non_exhaustive()
    }
}
