//! coral-client: cluster topology manager and connection layer.
//!
//! This crate is the runtime half of coral. [`ClusterManager`] bootstraps
//! from a seed list, maintains the slot-range → [`MasterEntry`] routing
//! table, and reconciles it against the cluster's own `CLUSTER NODES`
//! view on a fixed-delay schedule. Command dispatch consults the manager
//! for the entry serving a key and talks to that entry's connections.
//!
//! # quick start
//!
//! ```rust,ignore
//! use coral_client::{ClusterConfig, ClusterManager};
//! use coral_cluster::NodeAddr;
//!
//! let config = ClusterConfig::from_seeds(vec![NodeAddr::new("10.0.0.1", 6379)]);
//! let manager = ClusterManager::connect(config).await?;
//!
//! let entry = manager.entry_for_key(b"user:42").await.expect("slot covered");
//! let reply = entry.master_request(&["GET", "user:42"]).await?;
//!
//! manager.shutdown().await;
//! ```

mod balancer;
mod config;
mod connection;
mod entry;
mod error;
mod manager;
mod registry;

pub use balancer::LoadBalancer;
pub use config::{ClusterConfig, MasterSlaveConfig};
pub use connection::{Client, ConnectOptions, Connection};
pub use entry::{FreezeReason, MasterEntry, SlaveRef, SlaveState};
pub use error::{ClusterError, ConnectionError};
pub use manager::{ClusterManager, TopologySnapshot};

// the model types callers see in our API surface
pub use coral_cluster::{key_slot, NodeAddr, Partition, SlotRange, SLOT_COUNT};
