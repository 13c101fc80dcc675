//! coral-cluster: the topology model of the coral client.
//!
//! Everything in this crate is pure data and parsing, with no I/O:
//!
//! - **Slot hashing**: 16384 hash slots, CRC16/XMODEM, hash-tag support
//! - **Node parsing**: the textual `CLUSTER NODES` listing → [`NodeInfo`]
//! - **Partitions**: node records folded into one [`Partition`] per master
//! - **Cluster info**: the `CLUSTER INFO` key/value body
//!
//! The connection layer and the reconciliation loop that consume these
//! types live in `coral-client`.
//!
//! # quick start
//!
//! ```
//! use coral_cluster::{build_partitions, key_slot, parse_cluster_nodes};
//!
//! let listing = "\
//! e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 10.0.0.1:6379 master - 0 0 1 connected 0-16383\n";
//! let nodes = parse_cluster_nodes(listing);
//! let partitions = build_partitions(&nodes);
//! assert_eq!(partitions.len(), 1);
//!
//! let slot = key_slot(b"user:{42}:profile");
//! assert!(partitions[0].serves_slot(slot));
//! ```

mod info;
mod nodes;
mod partition;
mod slots;

pub use info::{cluster_state, parse_cluster_info, ClusterHealth};
pub use nodes::{parse_cluster_nodes, NodeAddr, NodeFlags, NodeInfo, NodeLineError};
pub use partition::{build_partitions, find_owner, slots_of, Partition};
pub use slots::{key_slot, SlotRange, SlotRangeError, SLOT_COUNT};
