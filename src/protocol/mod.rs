//! Protocol Module
//!
//! Defines the RESP2 wire protocol spoken with the server.
//!
//! ## Request Format
//! Every command is an array of bulk strings:
//! ```text
//! *2\r\n$4\r\nKEYS\r\n$1\r\n*\r\n
//! ```
//!
//! ## Reply Types
//! - `+` Status
//! - `-` Error
//! - `:` Integer
//! - `$` String (bulk, `$-1` is Nil)
//! - `*` Array (`*-1` is Nil)

mod codec;
mod render;
mod reply;

pub use codec::{
    decode, decode_replies, encode_command, write_args, write_command, ReplyDecoder,
    MAX_BULK_SIZE, MAX_DEPTH,
};
pub use render::{render, render_outcome, INDENT};
pub use reply::Reply;
