//! Slave selection policies.
//!
//! The balancer only picks an index; the entry owns the slave list and the
//! round-robin cursor, so one policy value can be shared by every entry.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Policy for spreading reads across a partition's up slaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancer {
    /// Walk the slave list with a per-entry cursor.
    #[default]
    RoundRobin,
    /// Pick uniformly at random.
    Random,
}

impl LoadBalancer {
    /// Picks an index into a list of `len` candidates, or `None` when the
    /// list is empty.
    pub fn pick(&self, cursor: &AtomicUsize, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self {
            LoadBalancer::RoundRobin => Some(cursor.fetch_add(1, Ordering::Relaxed) % len),
            LoadBalancer::Random => {
                use rand::Rng;
                Some(rand::rng().random_range(0..len))
            }
        }
    }
}
