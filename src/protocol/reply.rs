//! Reply definitions
//!
//! Represents decoded server replies.

use bytes::Bytes;

/// A decoded server reply
///
/// Payload variants hold owned bytes with an explicit length; embedded NUL
/// bytes are ordinary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `$-1` / `*-1`
    Nil,

    /// `:<n>`
    Integer(i64),

    /// `$<len>` bulk string
    String(Bytes),

    /// `+<text>` status line
    Status(Bytes),

    /// `-<text>` server-reported error
    Error(Bytes),

    /// `*<n>` followed by n nested replies
    Array(Vec<Reply>),
}

impl Reply {
    /// Tag used by the renderer
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Integer(_) => "integer",
            Reply::String(_) => "string",
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Array(_) => "array",
        }
    }

    /// True for a server-side `Error` reply
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Payload bytes of `String`, `Status` and `Error` replies
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::String(data) | Reply::Status(data) | Reply::Error(data) => Some(data),
            _ => None,
        }
    }

    /// Build a status reply from text
    pub fn status(text: &str) -> Self {
        Reply::Status(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Build a bulk string reply from bytes
    pub fn string(data: impl AsRef<[u8]>) -> Self {
        Reply::String(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Build an error reply from text
    pub fn error(text: &str) -> Self {
        Reply::Error(Bytes::copy_from_slice(text.as_bytes()))
    }
}
