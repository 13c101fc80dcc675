//! RESP frame types.
//!
//! [`Frame`] represents a single parsed RESP value. Bulk payloads use
//! `Bytes` so large replies (a full `CLUSTER NODES` listing can run to
//! tens of kilobytes) move through the client without copies.

use bytes::Bytes;

/// A single RESP frame as read off the wire.
///
/// Covers the reply shapes a cluster client sees: status lines, errors,
/// integers, bulk payloads, arrays, and nulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-MOVED 3999 127.0.0.1:6381\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+a\r\n+b\r\n`.
    Array(Vec<Frame>),

    /// Null value: `_\r\n`, or the RESP2 forms `$-1\r\n` / `*-1\r\n`.
    Null,
}

impl Frame {
    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns `true` for a `+OK` status reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Frame::Simple(s) if s == "OK")
    }

    /// Returns the textual content of a simple string or UTF-8 bulk frame.
    ///
    /// `CLUSTER NODES` and `CLUSTER INFO` both reply with bulk text; this
    /// is the accessor the topology manager uses to get at it.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }
}
