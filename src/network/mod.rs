//! Network Module
//!
//! Connection lifecycle and command/reply correlation.
//!
//! ## Architecture
//! - `Connector` opens the transport stream
//! - `Connection` owns the stream and the lifecycle state machine
//! - `CommandChannel` pairs each decoded reply with the oldest pending command
//! - `ReconnectPolicy` re-issues `connect()` after a fixed delay

mod channel;
mod connection;
mod connector;
mod reconnect;

pub use channel::{CommandChannel, Continuation, PendingCommand, Resolution};
pub use connection::{Connection, ConnectionState, LifecycleCallbacks, LifecycleFn};
pub use connector::{ConnectFuture, Connector, TcpConnector};
pub use reconnect::ReconnectPolicy;
