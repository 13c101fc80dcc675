//! Client configuration.
//!
//! [`ClusterConfig`] is what the embedder hands to the manager. Each master
//! entry gets its own [`MasterSlaveConfig`], copied field-for-field from
//! the cluster config; entries never read the cluster config directly.

use std::time::Duration;

use coral_cluster::NodeAddr;
use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancer;
use crate::connection::ConnectOptions;

/// Top-level configuration for [`ClusterManager`](crate::ClusterManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Seed addresses tried in order during bootstrap.
    pub node_addresses: Vec<NodeAddr>,
    /// When true, entries carry a slave pool and reads may be balanced
    /// across replicas.
    pub read_from_slaves: bool,
    /// Fixed delay between reconciliation ticks.
    pub scan_interval: Duration,

    pub connect_timeout: Duration,
    /// Per-command response timeout.
    pub timeout: Duration,
    pub ping_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_interval: Duration,
    pub load_balancer: LoadBalancer,
    pub password: Option<String>,
    pub database: u32,
    pub client_name: Option<String>,
    pub idle_connection_timeout: Duration,
    pub failed_attempts: u32,
    pub reconnection_timeout: Duration,

    pub master_connection_pool_size: usize,
    pub master_connection_minimum_idle_size: usize,
    pub slave_connection_pool_size: usize,
    pub slave_connection_minimum_idle_size: usize,
    pub slave_subscription_connection_pool_size: usize,
    pub slave_subscription_connection_minimum_idle_size: usize,
    pub subscriptions_per_connection: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_addresses: Vec::new(),
            read_from_slaves: false,
            scan_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(1),
            retry_attempts: 3,
            retry_interval: Duration::from_secs(1),
            load_balancer: LoadBalancer::default(),
            password: None,
            database: 0,
            client_name: None,
            idle_connection_timeout: Duration::from_secs(10),
            failed_attempts: 3,
            reconnection_timeout: Duration::from_secs(3),
            master_connection_pool_size: 64,
            master_connection_minimum_idle_size: 10,
            slave_connection_pool_size: 64,
            slave_connection_minimum_idle_size: 10,
            slave_subscription_connection_pool_size: 50,
            slave_subscription_connection_minimum_idle_size: 1,
            subscriptions_per_connection: 5,
        }
    }
}

impl ClusterConfig {
    /// Creates a config with the given seed list and defaults elsewhere.
    pub fn from_seeds(node_addresses: Vec<NodeAddr>) -> Self {
        Self {
            node_addresses,
            ..Self::default()
        }
    }

    /// Builds the per-master config handed to each entry: a verbatim copy
    /// of every shared option.
    pub fn master_slave_config(&self) -> MasterSlaveConfig {
        MasterSlaveConfig {
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
            ping_timeout: self.ping_timeout,
            retry_attempts: self.retry_attempts,
            retry_interval: self.retry_interval,
            load_balancer: self.load_balancer,
            password: self.password.clone(),
            database: self.database,
            client_name: self.client_name.clone(),
            idle_connection_timeout: self.idle_connection_timeout,
            failed_attempts: self.failed_attempts,
            reconnection_timeout: self.reconnection_timeout,
            master_connection_pool_size: self.master_connection_pool_size,
            master_connection_minimum_idle_size: self.master_connection_minimum_idle_size,
            slave_connection_pool_size: self.slave_connection_pool_size,
            slave_connection_minimum_idle_size: self.slave_connection_minimum_idle_size,
            slave_subscription_connection_pool_size: self.slave_subscription_connection_pool_size,
            slave_subscription_connection_minimum_idle_size: self
                .slave_subscription_connection_minimum_idle_size,
            subscriptions_per_connection: self.subscriptions_per_connection,
        }
    }

    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: self.connect_timeout,
            command_timeout: self.timeout,
            ping_timeout: self.ping_timeout,
            password: self.password.clone(),
            database: self.database,
            client_name: self.client_name.clone(),
        }
    }
}

/// Per-master configuration owned by each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterSlaveConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub ping_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_interval: Duration,
    pub load_balancer: LoadBalancer,
    pub password: Option<String>,
    pub database: u32,
    pub client_name: Option<String>,
    pub idle_connection_timeout: Duration,
    pub failed_attempts: u32,
    pub reconnection_timeout: Duration,

    pub master_connection_pool_size: usize,
    pub master_connection_minimum_idle_size: usize,
    pub slave_connection_pool_size: usize,
    pub slave_connection_minimum_idle_size: usize,
    pub slave_subscription_connection_pool_size: usize,
    pub slave_subscription_connection_minimum_idle_size: usize,
    pub subscriptions_per_connection: usize,
}

impl MasterSlaveConfig {
    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: self.connect_timeout,
            command_timeout: self.timeout,
            ping_timeout: self.ping_timeout,
            password: self.password.clone(),
            database: self.database,
            client_name: self.client_name.clone(),
        }
    }
}
