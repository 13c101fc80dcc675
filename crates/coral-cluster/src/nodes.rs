//! Parsing of the textual `CLUSTER NODES` listing.
//!
//! Each non-empty line describes one node:
//!
//! ```text
//! <id> <host:port[@busport]> <flags> <master-id> <ping-sent> <pong-recv> <config-epoch> <link-state> [slot ...]
//! ```
//!
//! Slot fields are either `N` or `N-M` (inclusive). Bracketed migration
//! markers (`[slot->-nodeid]`, `[slot-<-nodeid]`) are ignored; redirect
//! handling is not the topology manager's job. Malformed lines are skipped
//! so that one garbled node never hides the rest of the cluster.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::slots::SlotRange;

/// Error describing why a single node line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeLineError {
    #[error("not enough fields in node line")]
    MissingFields,
    #[error("invalid node address: {0}")]
    InvalidAddr(String),
    #[error("invalid slot field: {0}")]
    InvalidSlot(String),
}

/// A cluster node's network address.
///
/// Two addresses are equal iff both host and port match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`, tolerating the `@busport` suffix the server
    /// appends in newer listing formats (the bus port is discarded).
    pub fn parse(s: &str) -> Result<Self, NodeLineError> {
        let host_port = s.split('@').next().unwrap_or(s);
        let (host, port_str) = host_port
            .rsplit_once(':')
            .ok_or_else(|| NodeLineError::InvalidAddr(s.to_string()))?;
        let port = port_str
            .parse()
            .map_err(|_| NodeLineError::InvalidAddr(s.to_string()))?;
        if host.is_empty() {
            return Err(NodeLineError::InvalidAddr(s.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Status flags carried by a node line.
///
/// Parsed from comma-separated tokens with a trailing `?` stripped, so the
/// suspected form `fail?` collapses into `fail`. Unknown tokens are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    pub myself: bool,
    pub master: bool,
    pub slave: bool,
    pub fail: bool,
    pub handshake: bool,
    pub noaddr: bool,
}

impl NodeFlags {
    /// Parses the comma-separated flags field.
    pub fn parse(s: &str) -> Self {
        let mut flags = NodeFlags::default();
        for token in s.split(',') {
            let token = token.trim().trim_end_matches('?');
            if token.eq_ignore_ascii_case("myself") {
                flags.myself = true;
            } else if token.eq_ignore_ascii_case("master") {
                flags.master = true;
            } else if token.eq_ignore_ascii_case("slave") {
                flags.slave = true;
            } else if token.eq_ignore_ascii_case("fail") {
                flags.fail = true;
            } else if token.eq_ignore_ascii_case("handshake") {
                flags.handshake = true;
            } else if token.eq_ignore_ascii_case("noaddr") {
                flags.noaddr = true;
            }
        }
        flags
    }
}

impl std::fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tokens = Vec::new();
        if self.myself {
            tokens.push("myself");
        }
        if self.master {
            tokens.push("master");
        }
        if self.slave {
            tokens.push("slave");
        }
        if self.fail {
            tokens.push("fail");
        }
        if self.handshake {
            tokens.push("handshake");
        }
        if self.noaddr {
            tokens.push("noaddr");
        }
        if tokens.is_empty() {
            write!(f, "noflags")
        } else {
            write!(f, "{}", tokens.join(","))
        }
    }
}

/// One parsed line of the `CLUSTER NODES` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node's cluster-wide id (40 hex chars on real servers; treated
    /// as an opaque string here).
    pub node_id: String,
    pub addr: NodeAddr,
    pub flags: NodeFlags,
    /// The replicated master's id, present only on slave lines.
    pub master_id: Option<String>,
    /// Slot ranges owned by this node (masters only).
    pub slot_ranges: Vec<SlotRange>,
}

impl NodeInfo {
    /// Parses a single node line.
    pub fn parse_line(line: &str) -> Result<Self, NodeLineError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(NodeLineError::MissingFields);
        }

        let addr = NodeAddr::parse(fields[1])?;
        let flags = NodeFlags::parse(fields[2]);

        let master_id = match fields[3] {
            "-" => None,
            id => Some(id.to_string()),
        };

        // fields 4..8 (ping-sent, pong-recv, config-epoch, link-state) are
        // not tracked; slot fields start at index 8
        let mut slot_ranges = Vec::new();
        for field in &fields[8..] {
            if field.starts_with('[') {
                // migration marker, not an owned slot
                continue;
            }
            let range = SlotRange::parse(field)
                .map_err(|_| NodeLineError::InvalidSlot(field.to_string()))?;
            slot_ranges.push(range);
        }

        Ok(NodeInfo {
            node_id: fields[0].to_string(),
            addr,
            flags,
            master_id,
            slot_ranges,
        })
    }

    /// Renders this node in the canonical listing form.
    ///
    /// Timestamps and epoch are not tracked, so they render as zeros with a
    /// `connected` link state; `parse_line` ignores those fields, making
    /// render → parse a round trip.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {} 0 0 0 connected",
            self.node_id,
            self.addr,
            self.flags,
            self.master_id.as_deref().unwrap_or("-"),
        );
        for range in &self.slot_ranges {
            line.push(' ');
            line.push_str(&range.to_string());
        }
        line
    }
}

/// Parses a full `CLUSTER NODES` response body.
///
/// Malformed lines are dropped (logged at debug); a completely unparseable
/// payload yields an empty list, which callers treat as "no update".
/// Input order is preserved.
pub fn parse_cluster_nodes(body: &str) -> Vec<NodeInfo> {
    let mut nodes = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match NodeInfo::parse_line(line) {
            Ok(node) => nodes.push(node),
            Err(err) => {
                debug!(%err, line, "skipping malformed cluster nodes line");
            }
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002 master - 0 1426238316232 2 connected 5461-10922
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001 myself,master - 0 0 1 connected 0-5460
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003 master - 0 1426238318243 3 connected 10923-16383
";

    #[test]
    fn parses_full_listing_in_order() {
        let nodes = parse_cluster_nodes(LISTING);
        assert_eq!(nodes.len(), 4);
        assert!(nodes[0].flags.slave);
        assert_eq!(
            nodes[0].master_id.as_deref(),
            Some("e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca")
        );
        assert!(nodes[1].flags.master);
        assert_eq!(nodes[1].slot_ranges, vec![SlotRange::new(5461, 10922)]);
        assert!(nodes[2].flags.myself);
        assert_eq!(nodes[2].addr, NodeAddr::new("127.0.0.1", 30001));
    }

    #[test]
    fn addr_with_bus_port_suffix() {
        let addr = NodeAddr::parse("10.1.2.3:6379@16379").unwrap();
        assert_eq!(addr, NodeAddr::new("10.1.2.3", 6379));
    }

    #[test]
    fn addr_rejects_garbage() {
        assert!(NodeAddr::parse("nohost").is_err());
        assert!(NodeAddr::parse(":6379").is_err());
        assert!(NodeAddr::parse("host:notaport").is_err());
    }

    #[test]
    fn suspected_fail_flag_collapses() {
        let flags = NodeFlags::parse("master,fail?");
        assert!(flags.master);
        assert!(flags.fail);
    }

    #[test]
    fn unknown_flags_dropped() {
        let flags = NodeFlags::parse("myself,master,shiny-new-flag");
        assert!(flags.myself);
        assert!(flags.master);
        assert_eq!(
            flags,
            NodeFlags {
                myself: true,
                master: true,
                ..NodeFlags::default()
            }
        );
    }

    #[test]
    fn single_slot_fields() {
        let line = "abc 127.0.0.1:7000 master - 0 0 1 connected 0 42 100-200";
        let node = NodeInfo::parse_line(line).unwrap();
        assert_eq!(
            node.slot_ranges,
            vec![
                SlotRange::single(0),
                SlotRange::single(42),
                SlotRange::new(100, 200)
            ]
        );
    }

    #[test]
    fn migration_markers_ignored() {
        let line =
            "abc 127.0.0.1:7000 master - 0 0 1 connected 0-100 [101->-deadbeef] [102-<-cafebabe]";
        let node = NodeInfo::parse_line(line).unwrap();
        assert_eq!(node.slot_ranges, vec![SlotRange::new(0, 100)]);
    }

    #[test]
    fn malformed_lines_skipped() {
        let body = "\
too short line\n\
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002 master - 0 0 2 connected 0-16383\n\
badid badaddr master - 0 0 2 connected\n";
        let nodes = parse_cluster_nodes(body);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].addr.port, 30002);
    }

    #[test]
    fn unparseable_payload_yields_empty() {
        assert!(parse_cluster_nodes("complete garbage\n\n more garbage").is_empty());
        assert!(parse_cluster_nodes("").is_empty());
    }

    #[test]
    fn bad_slot_field_rejects_line() {
        let line = "abc 127.0.0.1:7000 master - 0 0 1 connected 0-99 nonsense";
        assert!(matches!(
            NodeInfo::parse_line(line),
            Err(NodeLineError::InvalidSlot(_))
        ));
    }

    #[test]
    fn render_parse_round_trip() {
        let nodes = parse_cluster_nodes(LISTING);
        let rendered: String = nodes
            .iter()
            .map(|n| n.to_line() + "\n")
            .collect();
        assert_eq!(parse_cluster_nodes(&rendered), nodes);
    }
}
