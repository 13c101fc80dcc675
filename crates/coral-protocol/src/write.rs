//! Direct-to-buffer RESP serialization.
//!
//! Commands go out as arrays of bulk strings, the standard client → server
//! calling convention. [`Frame::write`] covers the full frame set and is
//! what the in-process mock servers use in tests.

use bytes::{BufMut, BytesMut};

use crate::frame::Frame;

/// Serializes a command as a RESP array of bulk strings.
///
/// `write_command(&mut buf, &["CLUSTER", "NODES"])` produces
/// `*2\r\n$7\r\nCLUSTER\r\n$5\r\nNODES\r\n`.
pub fn write_command(dst: &mut BytesMut, tokens: &[&str]) {
    dst.put_u8(b'*');
    write_i64(tokens.len() as i64, dst);
    dst.put_slice(b"\r\n");
    for token in tokens {
        dst.put_u8(b'$');
        write_i64(token.len() as i64, dst);
        dst.put_slice(b"\r\n");
        dst.put_slice(token.as_bytes());
        dst.put_slice(b"\r\n");
    }
}

impl Frame {
    /// Serializes this frame into the provided buffer, including the type
    /// prefix and trailing `\r\n` delimiters.
    pub fn write(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                write_i64(*n, dst);
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                write_i64(data.len() as i64, dst);
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Array(items) => {
                dst.put_u8(b'*');
                write_i64(items.len() as i64, dst);
                dst.put_slice(b"\r\n");
                for item in items {
                    item.write(dst);
                }
            }
            Frame::Null => {
                dst.put_slice(b"_\r\n");
            }
        }
    }
}

/// Writes an i64 as decimal ASCII directly into the buffer.
fn write_i64(val: i64, dst: &mut BytesMut) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(val).as_bytes());
}
