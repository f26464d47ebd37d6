//! Protocol codec
//!
//! Encoding and decoding functions for the RESP2 wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//!
//! ### Reply Format
//! ```text
//! ┌──────────┬──────────────────────────────┬──────┐
//! │ Type (1) │ Line / length / count        │ CRLF │
//! └──────────┴──────────────────────────────┴──────┘
//! ```
//! - `+` status, `-` error, `:` integer
//! - `$` bulk string: length line, then `<len>` raw bytes and CRLF (`$-1` = nil)
//! - `*` array: count line, then `<count>` nested replies (`*-1` = nil)
//!
//! Decoding is incremental: an incomplete buffer yields `Ok(None)`, and
//! replies split across reads decode once the remaining bytes arrive.
//! [`decode`] consumes nothing until a whole reply is present;
//! [`ReplyDecoder`] keeps its place between reads so large arrays are
//! parsed in linear time.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Reply;
use crate::error::{ClientError, Result};

/// Maximum bulk string payload (512 MB, the server-side limit)
pub const MAX_BULK_SIZE: i64 = 512 * 1024 * 1024;

/// Maximum number of elements accepted in one array header
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024 * 1024;

/// Maximum length of a single header/status line (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Maximum array nesting depth
pub const MAX_DEPTH: usize = 128;

const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Command Encoding
// =============================================================================

/// Encode a command line such as `"KEYS *"` into a RESP array of bulk strings
///
/// Arguments are separated by ASCII whitespace; use [`write_args`] for
/// arguments that contain whitespace or arbitrary bytes.
pub fn encode_command(text: &str) -> Result<Bytes> {
    let mut out = BytesMut::new();
    write_command(text, &mut out)?;
    Ok(out.freeze())
}

/// Append the encoding of a command line to `out`
pub fn write_command(text: &str, out: &mut BytesMut) -> Result<()> {
    let args: Vec<&[u8]> = text.split_ascii_whitespace().map(str::as_bytes).collect();
    if args.is_empty() {
        return Err(ClientError::InvalidCommand("empty command".to_string()));
    }
    write_args(&args, out);
    Ok(())
}

/// Append a RESP array command built from raw arguments to `out`
pub fn write_args(args: &[&[u8]], out: &mut BytesMut) {
    let size: usize = args.iter().map(|arg| arg.len() + 16).sum::<usize>() + 16;
    out.reserve(size);

    out.put_u8(b'*');
    out.put_slice(args.len().to_string().as_bytes());
    out.put_slice(CRLF);
    for arg in args {
        out.put_u8(b'$');
        out.put_slice(arg.len().to_string().as_bytes());
        out.put_slice(CRLF);
        out.put_slice(arg);
        out.put_slice(CRLF);
    }
}

// =============================================================================
// Reply Decoding
// =============================================================================

/// Decode one complete reply from the front of `bytes`
///
/// Returns the reply and the number of bytes it occupied, or `None` when
/// `bytes` does not yet hold a complete reply.
pub fn decode(bytes: &[u8]) -> Result<Option<(Reply, usize)>> {
    let mut open = Vec::new();
    match advance(bytes, &mut open)? {
        (Some(reply), consumed) => Ok(Some((reply, consumed))),
        (None, _) => Ok(None),
    }
}

/// Decode every complete reply at the front of `bytes`
///
/// Returns the replies and the total number of bytes consumed; a trailing
/// partial reply is left unconsumed.
pub fn decode_replies(bytes: &[u8]) -> Result<(Vec<Reply>, usize)> {
    let mut replies = Vec::new();
    let mut consumed = 0;
    while let Some((reply, used)) = decode(&bytes[consumed..])? {
        replies.push(reply);
        consumed += used;
    }
    Ok((replies, consumed))
}

/// An array whose header has been consumed but whose elements are still
/// arriving
#[derive(Debug)]
struct OpenArray {
    expected: usize,
    items: Vec<Reply>,
}

impl OpenArray {
    fn new(expected: usize) -> Self {
        // Cap the up-front allocation; a hostile header must not reserve gigabytes.
        Self {
            expected,
            items: Vec::with_capacity(expected.min(1024)),
        }
    }
}

/// One element parsed from the front of the input
enum Element {
    Value(Reply),
    ArrayHeader(usize),
}

/// Parse elements from the front of `bytes` until a top-level reply
/// completes or the input runs out
///
/// Every complete element is consumed exactly once: scalars are folded into
/// the innermost array of `open`, array headers open a new level. Returns
/// the completed reply, if any, and the bytes consumed. Bytes of an
/// incomplete trailing element are never consumed.
fn advance(bytes: &[u8], open: &mut Vec<OpenArray>) -> Result<(Option<Reply>, usize)> {
    let mut pos = 0;
    loop {
        if open.len() > MAX_DEPTH {
            return Err(ClientError::Protocol(format!(
                "Reply nesting too deep (max {})",
                MAX_DEPTH
            )));
        }

        let (element, next) = match parse_element(bytes, pos)? {
            Some(found) => found,
            None => return Ok((None, pos)),
        };
        pos = next;

        let mut value = match element {
            Element::Value(reply) => reply,
            Element::ArrayHeader(count) => {
                open.push(OpenArray::new(count));
                continue;
            }
        };

        loop {
            let filled = match open.last_mut() {
                None => return Ok((Some(value), pos)),
                Some(array) => {
                    array.items.push(value);
                    array.items.len() == array.expected
                }
            };
            if !filled {
                break;
            }
            match open.pop() {
                Some(array) => value = Reply::Array(array.items),
                None => break,
            }
        }
    }
}

fn parse_element(bytes: &[u8], pos: usize) -> Result<Option<(Element, usize)>> {
    let (line, next) = match read_line(bytes, pos)? {
        Some(found) => found,
        None => return Ok(None),
    };

    let (&tag, body) = match line.split_first() {
        Some(split) => split,
        None => return Err(ClientError::Protocol("Empty reply line".to_string())),
    };

    let reply = match tag {
        b'+' => Reply::Status(Bytes::copy_from_slice(body)),
        b'-' => Reply::Error(Bytes::copy_from_slice(body)),
        b':' => Reply::Integer(parse_i64(body)?),
        b'$' => return parse_bulk(bytes, parse_i64(body)?, next),
        b'*' => return parse_array_header(parse_i64(body)?, next),
        _ => {
            return Err(ClientError::Protocol(format!(
                "Unknown reply type: 0x{:02x}",
                tag
            )))
        }
    };
    Ok(Some((Element::Value(reply), next)))
}

fn parse_bulk(bytes: &[u8], len: i64, start: usize) -> Result<Option<(Element, usize)>> {
    if len == -1 {
        return Ok(Some((Element::Value(Reply::Nil), start)));
    }
    if !(0..=MAX_BULK_SIZE).contains(&len) {
        return Err(ClientError::Protocol(format!(
            "Invalid bulk length: {} (max {})",
            len, MAX_BULK_SIZE
        )));
    }

    let end = start + len as usize;
    if bytes.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &bytes[end..end + CRLF.len()] != CRLF {
        return Err(ClientError::Protocol(
            "Bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&bytes[start..end]);
    Ok(Some((Element::Value(Reply::String(data)), end + CRLF.len())))
}

fn parse_array_header(count: i64, next: usize) -> Result<Option<(Element, usize)>> {
    match count {
        -1 => Ok(Some((Element::Value(Reply::Nil), next))),
        0 => Ok(Some((Element::Value(Reply::Array(Vec::new())), next))),
        1..=MAX_ARRAY_LEN => Ok(Some((Element::ArrayHeader(count as usize), next))),
        _ => Err(ClientError::Protocol(format!(
            "Invalid array length: {}",
            count
        ))),
    }
}

/// Find the CRLF-terminated line starting at `pos`
///
/// Returns the line without its terminator and the offset just past it.
fn read_line(bytes: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>> {
    let rest = &bytes[pos..];
    let newline = match rest.iter().position(|&b| b == b'\n') {
        Some(idx) => idx,
        None => {
            if rest.len() > MAX_LINE_SIZE {
                return Err(ClientError::Protocol(format!(
                    "Reply line exceeds {} bytes",
                    MAX_LINE_SIZE
                )));
            }
            return Ok(None);
        }
    };

    if newline == 0 || rest[newline - 1] != b'\r' {
        return Err(ClientError::Protocol(
            "Reply line not terminated by CRLF".to_string(),
        ));
    }

    Ok(Some((&rest[..newline - 1], pos + newline + 1)))
}

fn parse_i64(data: &[u8]) -> Result<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| {
            ClientError::Protocol(format!(
                "Invalid integer: {:?}",
                String::from_utf8_lossy(data)
            ))
        })
}

// =============================================================================
// Streaming Decoder
// =============================================================================

/// Accumulates bytes read from the transport and yields complete replies
///
/// Decoding resumes where the previous call stopped. Completed elements of
/// a partially received array are consumed from the buffer and held until
/// the array closes, so every byte is parsed once however the reply is
/// split across reads.
///
/// After an error the decoder state is undefined; discard it or `clear` it.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    buffer: BytesMut,
    open: Vec<OpenArray>,
}

impl ReplyDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a preallocated buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            open: Vec::new(),
        }
    }

    /// Append bytes received from the transport
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Buffer the transport reads into directly
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether part of a reply has been consumed but the reply is not complete
    pub fn is_mid_reply(&self) -> bool {
        !self.open.is_empty()
    }

    /// Pop the next complete reply, if one is buffered
    pub fn next_reply(&mut self) -> Result<Option<Reply>> {
        let (reply, consumed) = advance(&self.buffer, &mut self.open)?;
        self.buffer.advance(consumed);
        Ok(reply)
    }

    /// Drop any buffered bytes and partial replies (used when a connection is replaced)
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.open.clear();
    }
}
