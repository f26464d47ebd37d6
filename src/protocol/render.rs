//! Reply rendering
//!
//! Turns a decoded reply tree into indented, human-readable lines.

use super::Reply;
use crate::error::ClientError;

/// Indentation emitted per nesting level
pub const INDENT: &str = "  ";

/// Render a reply as lines indented by `depth` levels
///
/// ```text
/// array: 2
///   integer: 1
///   nil
/// ```
pub fn render(reply: &Reply, depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    render_into(reply, depth, &mut lines);
    lines
}

/// Render a command outcome, including the connection-lost case
pub fn render_outcome(outcome: &Result<Reply, ClientError>, depth: usize) -> Vec<String> {
    match outcome {
        Ok(reply) => render(reply, depth),
        Err(err) => vec![format!("{}invalid reply: {}", INDENT.repeat(depth), err)],
    }
}

fn render_into(reply: &Reply, depth: usize, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    match reply {
        Reply::Array(items) => {
            lines.push(format!("{}array: {}", indent, items.len()));
            for item in items {
                render_into(item, depth + 1, lines);
            }
        }
        Reply::String(data) | Reply::Status(data) | Reply::Error(data) => {
            lines.push(format!(
                "{}{}: {}",
                indent,
                reply.kind(),
                String::from_utf8_lossy(data)
            ));
        }
        Reply::Integer(value) => lines.push(format!("{}integer: {}", indent, value)),
        Reply::Nil => lines.push(format!("{}nil", indent)),
    }
}
