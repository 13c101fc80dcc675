//! Incremental RESP parser.
//!
//! Operates on a buffered byte slice. The caller reads from the network
//! into a buffer and retries whenever the parser reports that the frame is
//! still incomplete; nothing is consumed until a full frame is available.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::frame::Frame;

/// Maximum nesting depth for arrays. Prevents stack exhaustion from
/// malformed deeply-nested replies.
const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a bulk string in bytes (512 MB, matching the server).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Cap for `Vec::with_capacity` when parsing arrays, so a hostile length
/// prefix can't force a huge upfront allocation.
const PREALLOC_CAP: usize = 1024;

/// Parses one complete RESP frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` when a complete frame was parsed,
/// `Ok(None)` when the buffer doesn't hold a full frame yet, and `Err(...)`
/// when the data is malformed.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut pos = 0usize;
    match parse_at(buf, &mut pos, 0) {
        Ok(frame) => Ok(Some((frame, pos))),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parses a frame starting at `*pos`, advancing it past the frame.
fn parse_at(buf: &[u8], pos: &mut usize, depth: usize) -> Result<Frame, ProtocolError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ProtocolError::NestingTooDeep);
    }

    let prefix = *buf.get(*pos).ok_or(ProtocolError::Incomplete)?;
    *pos += 1;

    match prefix {
        b'+' => {
            let line = read_line(buf, pos)?;
            let s = std::str::from_utf8(line)
                .map_err(|_| ProtocolError::InvalidUtf8("simple string"))?;
            Ok(Frame::Simple(s.to_owned()))
        }
        b'-' => {
            let line = read_line(buf, pos)?;
            let s =
                std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("error"))?;
            Ok(Frame::Error(s.to_owned()))
        }
        b':' => Ok(Frame::Integer(read_integer_line(buf, pos)?)),
        b'$' => {
            let len = read_integer_line(buf, pos)?;
            if len == -1 {
                // RESP2 null bulk string
                return Ok(Frame::Null);
            }
            if len < 0 {
                return Err(ProtocolError::InvalidLength(len));
            }
            if len > MAX_BULK_LEN {
                return Err(ProtocolError::BulkTooLarge(len as usize));
            }
            let len = len as usize;

            // need `len` bytes of payload plus the trailing \r\n
            if buf.len() - *pos < len + 2 {
                return Err(ProtocolError::Incomplete);
            }
            if buf[*pos + len] != b'\r' || buf[*pos + len + 1] != b'\n' {
                return Err(ProtocolError::InvalidLength(len as i64));
            }

            let data = Bytes::copy_from_slice(&buf[*pos..*pos + len]);
            *pos += len + 2;
            Ok(Frame::Bulk(data))
        }
        b'*' => {
            let count = read_integer_line(buf, pos)?;
            if count == -1 {
                // RESP2 null array
                return Ok(Frame::Null);
            }
            if count < 0 {
                return Err(ProtocolError::InvalidLength(count));
            }
            let count = count as usize;

            let mut items = Vec::with_capacity(count.min(PREALLOC_CAP));
            for _ in 0..count {
                items.push(parse_at(buf, pos, depth + 1)?);
            }
            Ok(Frame::Array(items))
        }
        b'_' => {
            let line = read_line(buf, pos)?;
            if !line.is_empty() {
                return Err(ProtocolError::InvalidPrefix(b'_'));
            }
            Ok(Frame::Null)
        }
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

/// Reads up to the next `\r\n`, returning the line content without the
/// terminator and advancing `*pos` past it.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], ProtocolError> {
    let rest = &buf[*pos..];
    let mut i = 0;
    while i + 1 < rest.len() {
        if rest[i] == b'\r' && rest[i + 1] == b'\n' {
            let line = &rest[..i];
            *pos += i + 2;
            return Ok(line);
        }
        i += 1;
    }
    Err(ProtocolError::Incomplete)
}

/// Reads a line and parses it as a decimal i64.
fn read_integer_line(buf: &[u8], pos: &mut usize) -> Result<i64, ProtocolError> {
    let line = read_line(buf, pos)?;
    let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidInteger)?;
    s.parse().map_err(|_| ProtocolError::InvalidInteger)
}
