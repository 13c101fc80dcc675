//! Error types for the connection layer and the topology manager.

use coral_cluster::NodeAddr;
use coral_protocol::ProtocolError;
use thiserror::Error;

/// Errors from a single connection or request.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: NodeAddr },

    #[error("command timed out")]
    CommandTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server closed the connection")]
    Disconnected,

    /// The connection saw an earlier failure and refuses further traffic.
    #[error("connection is no longer active")]
    Inactive,

    /// The server replied with an error frame (`-ERR ...`).
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// Errors surfaced by the cluster manager.
///
/// Only bootstrap can fail fatally; everything inside a reconciliation tick
/// is logged and retried on the next tick instead.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No seed produced a single registered slot range. The manager
    /// refuses to start with an empty routing table.
    #[error("unable to connect to any seed node; no slot ranges registered")]
    NoSeedsReachable,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
