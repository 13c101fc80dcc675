//! coral-protocol: RESP wire codec for the coral cluster client.
//!
//! Provides incremental parsing of server replies and direct-to-buffer
//! serialization of client commands. Commands always go out as arrays of
//! bulk strings; replies come back as any of the [`Frame`] variants.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use coral_protocol::{parse_frame, write_command, Frame};
//!
//! // serialize a command
//! let mut buf = BytesMut::new();
//! write_command(&mut buf, &["CLUSTER", "NODES"]);
//! assert_eq!(&buf[..], b"*2\r\n$7\r\nCLUSTER\r\n$5\r\nNODES\r\n");
//!
//! // parse a reply
//! let (frame, consumed) = parse_frame(b"+OK\r\n").unwrap().unwrap();
//! assert_eq!(frame, Frame::Simple("OK".into()));
//! assert_eq!(consumed, 5);
//! ```

mod error;
mod frame;
mod parse;
mod write;

pub use error::ProtocolError;
pub use frame::Frame;
pub use parse::parse_frame;
pub use write::write_command;
