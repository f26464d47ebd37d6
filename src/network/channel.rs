//! Command Channel
//!
//! Correlates submitted commands with the replies that answer them.
//!
//! The server answers pipelined commands in order and never interleaves
//! replies on one connection, so correlation is a FIFO queue: the oldest
//! pending command owns the next decoded reply.
//!
//! ```text
//!   submit ──push_back──> [ cmd3 | cmd2 | cmd1 ] ──pop_front──> reply
//! ```
//!
//! Resolving a command does not run its continuation. It returns a
//! [`Resolution`] that the caller invokes once it holds no borrow of the
//! connection, so continuations may submit further commands.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{ClientError, Result};
use crate::protocol::Reply;

/// Caller-supplied handler for a command's outcome
///
/// Receives `Ok(reply)` when the server answered (including server `Error`
/// replies) and `Err(ClientError::ConnectionLost)` when the connection went
/// away first.
pub type Continuation = Box<dyn FnOnce(Result<Reply>)>;

/// A submitted command awaiting its reply
pub struct PendingCommand {
    /// Command text, kept for tracing
    command: String,

    continuation: Continuation,
}

impl PendingCommand {
    pub fn new<F>(command: impl Into<String>, continuation: F) -> Self
    where
        F: FnOnce(Result<Reply>) + 'static,
    {
        Self {
            command: command.into(),
            continuation: Box::new(continuation),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// A resolved command whose continuation has not run yet
#[must_use = "a resolution does nothing until invoked"]
#[derive(Debug)]
pub struct Resolution {
    pending: PendingCommand,
    outcome: Result<Reply>,
}

impl Resolution {
    pub fn command(&self) -> &str {
        self.pending.command()
    }

    pub fn outcome(&self) -> &Result<Reply> {
        &self.outcome
    }

    /// Run the continuation; consumes the resolution so it runs once
    pub fn invoke(self) {
        (self.pending.continuation)(self.outcome)
    }
}

/// FIFO of commands in flight on one connection
#[derive(Debug, Default)]
pub struct CommandChannel {
    pending: VecDeque<PendingCommand>,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command; its reply is the one after every earlier command's
    pub fn enqueue(&mut self, pending: PendingCommand) {
        self.pending.push_back(pending);
    }

    /// Match a decoded reply to the oldest pending command
    ///
    /// # Errors
    ///
    /// Returns `ProtocolDesync` when no command is pending.
    pub fn on_reply_decoded(&mut self, reply: Reply) -> Result<Resolution> {
        match self.pending.pop_front() {
            Some(pending) => Ok(Resolution {
                pending,
                outcome: Ok(reply),
            }),
            None => Err(ClientError::ProtocolDesync),
        }
    }

    /// Resolve every pending command with a connection-lost outcome
    pub fn drain_on_teardown(&mut self, reason: &str) -> Vec<Resolution> {
        self.pending
            .drain(..)
            .map(|pending| Resolution {
                pending,
                outcome: Err(ClientError::ConnectionLost(reason.to_string())),
            })
            .collect()
    }

    /// Number of commands awaiting replies
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
