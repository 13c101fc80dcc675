//! Parsing of the `CLUSTER INFO` key/value body.
//!
//! The manager only gates on `cluster_state`, but the whole body is kept
//! so embedders can read epoch counters or slot statistics if they care.

use std::collections::HashMap;

/// Overall cluster health as reported by `CLUSTER INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterHealth {
    Ok,
    Fail,
    /// The field was missing or carried an unrecognized value.
    Unknown,
}

impl std::fmt::Display for ClusterHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterHealth::Ok => write!(f, "ok"),
            ClusterHealth::Fail => write!(f, "fail"),
            ClusterHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parses the `key:value` lines of a `CLUSTER INFO` body.
///
/// Blank lines and `#` comment lines are skipped; lines without a colon are
/// ignored.
pub fn parse_cluster_info(body: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            map.insert(key.to_string(), value.trim().to_string());
        }
    }
    map
}

/// Reads the `cluster_state` field out of a parsed info body.
pub fn cluster_state(info: &HashMap<String, String>) -> ClusterHealth {
    match info.get("cluster_state").map(String::as_str) {
        Some("ok") => ClusterHealth::Ok,
        Some("fail") => ClusterHealth::Fail,
        _ => ClusterHealth::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_and_counters() {
        let body = "\
cluster_state:ok\r\n\
cluster_slots_assigned:16384\r\n\
cluster_known_nodes:6\r\n";
        let info = parse_cluster_info(body);
        assert_eq!(cluster_state(&info), ClusterHealth::Ok);
        assert_eq!(info.get("cluster_slots_assigned").unwrap(), "16384");
        assert_eq!(info.get("cluster_known_nodes").unwrap(), "6");
    }

    #[test]
    fn fail_state() {
        let info = parse_cluster_info("cluster_state:fail\n");
        assert_eq!(cluster_state(&info), ClusterHealth::Fail);
    }

    #[test]
    fn missing_or_unknown_state() {
        assert_eq!(cluster_state(&HashMap::new()), ClusterHealth::Unknown);
        let info = parse_cluster_info("cluster_state:degraded\n");
        assert_eq!(cluster_state(&info), ClusterHealth::Unknown);
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let info = parse_cluster_info("# Cluster\n\ncluster_state:ok\nnocolonline\n");
        assert_eq!(info.len(), 1);
    }
}
