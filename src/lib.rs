//! # respline
//!
//! A single-connection RESP2 client with:
//! - Pipelined commands correlated to replies in FIFO order
//! - Incremental decoding of nested, binary-safe replies
//! - A connection state machine with fixed-delay reconnection
//! - A single-threaded, non-blocking event loop
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Driver                               │
//! │            (startup commands, reconnect policy)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ connect() / submit()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Connection State Machine                    │
//! │   Disconnected → Connecting → Connected → Disconnecting     │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │ Command Channel │ ◀── replies ── │  Reply Decoder  │
//!   │     (FIFO)      │                │     (RESP2)     │
//!   └────────┬────────┘                └─────────────────┘
//!            │ continuation(outcome)
//!            ▼
//!   ┌─────────────────┐
//!   │  Reply Renderer │
//!   └─────────────────┘
//! ```
//!
//! Everything runs on one [`EventLoop`] thread.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod event_loop;
pub mod driver;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ClientError, Result};
pub use config::Config;
pub use driver::Driver;
pub use event_loop::{EventLoop, LoopHandle};
pub use network::{Connection, ConnectionState, LifecycleCallbacks, ReconnectPolicy, TcpConnector};
pub use protocol::Reply;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of respline
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
