//! Connection State Machine
//!
//! Owns the transport lifecycle of one logical client and routes decoded
//! replies through the [`CommandChannel`].
//!
//! ## State Machine
//!
//! ```text
//!                connect()            transport up
//! ┌──────────────┐ ───────> ┌────────────┐ ───────> ┌───────────┐
//! │ Disconnected │          │ Connecting │          │ Connected │
//! └──────────────┘ <─────── └────────────┘          └───────────┘
//!        ▲          attempt failed                       │
//!        │                                               │ EOF / I/O error /
//!        │         drain pending, disconnect callback    │ disconnect()
//!        │                 ┌───────────────┐             │
//!        └──────────────── │ Disconnecting │ <───────────┘
//!                          └───────────────┘
//! ```
//!
//! ## Sessions
//! Every `connect()` starts a session task on the event loop and bumps a
//! generation counter. The session owns the stream; it reads into the reply
//! decoder, flushes the outbound buffer when commands are queued, and exits
//! as soon as its generation is no longer current.
//!
//! Callbacks and continuations are always invoked with no borrow of the
//! shared state held, so they may call back into the connection.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::io;
use std::rc::Rc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, Notify};

use super::channel::{CommandChannel, PendingCommand};
use super::connector::{ConnectFuture, Connector};
use crate::error::{ClientError, Result};
use crate::event_loop::LoopHandle;
use crate::protocol::{write_args, write_command, Reply, ReplyDecoder};

/// Default read buffer capacity (16 KB)
const DEFAULT_READ_BUFFER: usize = 16 * 1024;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; `connect()` allowed
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Transport up; commands accepted
    Connected,
    /// Teardown in progress
    Disconnecting,
}

/// Lifecycle callback: `None` on success / graceful close, `Some(err)` on failure
pub type LifecycleFn<C> = Rc<dyn Fn(&Connection<C>, Option<&ClientError>)>;

/// The connect-result and disconnect-result callbacks of a connection
pub struct LifecycleCallbacks<C: Connector> {
    pub on_connect: LifecycleFn<C>,
    pub on_disconnect: LifecycleFn<C>,
}

impl<C: Connector> LifecycleCallbacks<C> {
    pub fn new<F, G>(on_connect: F, on_disconnect: G) -> Self
    where
        F: Fn(&Connection<C>, Option<&ClientError>) + 'static,
        G: Fn(&Connection<C>, Option<&ClientError>) + 'static,
    {
        Self {
            on_connect: Rc::new(on_connect),
            on_disconnect: Rc::new(on_disconnect),
        }
    }

    /// Callbacks that ignore every event
    pub fn noop() -> Self {
        Self::new(|_, _| {}, |_, _| {})
    }
}

impl<C: Connector> Clone for LifecycleCallbacks<C> {
    fn clone(&self) -> Self {
        Self {
            on_connect: Rc::clone(&self.on_connect),
            on_disconnect: Rc::clone(&self.on_disconnect),
        }
    }
}

/// Wakeups shared between the connection and its current session task
#[derive(Clone)]
struct SessionSignals {
    /// Outbound bytes were queued
    wakeup: Rc<Notify>,
    /// Voluntary teardown or replacement
    shutdown: Rc<Notify>,
}

impl SessionSignals {
    fn new() -> Self {
        Self {
            wakeup: Rc::new(Notify::new()),
            shutdown: Rc::new(Notify::new()),
        }
    }
}

struct Shared {
    state: ConnectionState,

    /// Bumped on every connect() and close(); stale sessions compare against it
    generation: u64,

    channel: CommandChannel,

    /// Encoded commands not yet handed to the session
    outbound: BytesMut,

    session: Option<SessionSignals>,
}

/// How a session's I/O loop ended
enum SessionEnd {
    /// disconnect() was requested
    Closed,
    /// Transport, protocol or correlation failure
    Failed(ClientError),
    /// A newer session (or close()) replaced this one
    Superseded,
}

/// One logical client connection
///
/// Cheap to clone; clones share the same state.
pub struct Connection<C: Connector> {
    shared: Rc<RefCell<Shared>>,
    connector: Rc<C>,
    callbacks: LifecycleCallbacks<C>,
    handle: LoopHandle,
    read_buffer_capacity: usize,
}

impl<C: Connector> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            connector: Rc::clone(&self.connector),
            callbacks: self.callbacks.clone(),
            handle: self.handle.clone(),
            read_buffer_capacity: self.read_buffer_capacity,
        }
    }
}

impl<C: Connector> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Connection")
            .field("peer", &self.connector.peer())
            .field("state", &shared.state)
            .field("generation", &shared.generation)
            .field("pending", &shared.channel.len())
            .finish()
    }
}

impl<C: Connector> Connection<C> {
    /// Create a disconnected connection
    pub fn new(connector: C, handle: LoopHandle, callbacks: LifecycleCallbacks<C>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: ConnectionState::Disconnected,
                generation: 0,
                channel: CommandChannel::new(),
                outbound: BytesMut::new(),
                session: None,
            })),
            connector: Rc::new(connector),
            callbacks,
            handle,
            read_buffer_capacity: DEFAULT_READ_BUFFER,
        }
    }

    /// Set the per-session read buffer capacity
    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity.max(1);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.borrow().state
    }

    /// Number of submitted commands still awaiting replies
    pub fn pending(&self) -> usize {
        self.shared.borrow().channel.len()
    }

    pub fn peer(&self) -> String {
        self.connector.peer()
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.handle
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a connection attempt
    ///
    /// The outcome is reported through the connect-result callback.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless disconnected, `LoopStopped` if the event loop
    /// has stopped, `Connect` if the attempt cannot be started at all.
    pub fn connect(&self) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState {
                state,
                operation: "connect",
            });
        }
        if self.handle.is_stopped() {
            return Err(ClientError::LoopStopped);
        }

        let attempt = self.connector.connect().map_err(ClientError::Connect)?;

        let signals = SessionSignals::new();
        let generation = {
            let mut shared = self.shared.borrow_mut();
            shared.generation += 1;
            shared.state = ConnectionState::Connecting;
            shared.session = Some(signals.clone());
            shared.generation
        };

        tracing::debug!(peer = %self.peer(), generation, "connecting");

        let session = self.clone().run_session(generation, signals, attempt);
        if let Err(err) = self.handle.spawn(session) {
            let mut shared = self.shared.borrow_mut();
            shared.state = ConnectionState::Disconnected;
            shared.session = None;
            return Err(err);
        }
        Ok(())
    }

    /// Tear the connection down voluntarily
    ///
    /// Pending commands resolve with `ConnectionLost`, then the
    /// disconnect-result callback runs with no error.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless connecting or connected.
    pub fn disconnect(&self) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match shared.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                shared.state = ConnectionState::Disconnecting;
                if let Some(signals) = &shared.session {
                    signals.shutdown.notify_one();
                }
                tracing::debug!(peer = %self.connector.peer(), "disconnect requested");
                Ok(())
            }
            state => Err(ClientError::InvalidState {
                state,
                operation: "disconnect",
            }),
        }
    }

    /// Synchronously abandon the current session
    ///
    /// Used when the event loop is shutting down: pending commands resolve
    /// with `ConnectionLost(reason)` and no lifecycle callback runs.
    pub fn close(&self, reason: &str) {
        let drained = {
            let mut shared = self.shared.borrow_mut();
            if shared.state == ConnectionState::Disconnected && shared.channel.is_empty() {
                return;
            }
            shared.generation += 1;
            if let Some(signals) = shared.session.take() {
                signals.shutdown.notify_one();
            }
            shared.state = ConnectionState::Disconnected;
            shared.outbound.clear();
            shared.channel.drain_on_teardown(reason)
        };

        tracing::debug!(peer = %self.peer(), pending = drained.len(), reason, "connection closed");
        for resolution in drained {
            resolution.invoke();
        }
    }

    // =========================================================================
    // Command Submission
    // =========================================================================

    /// Submit a command line such as `"GET key"`
    ///
    /// The continuation runs exactly once: with the reply, or with
    /// `ConnectionLost` if the connection is torn down first.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless connected; `InvalidCommand` for a blank line.
    pub fn submit<F>(&self, command: &str, continuation: F) -> Result<()>
    where
        F: FnOnce(Result<Reply>) + 'static,
    {
        self.enqueue(command.to_string(), |out| write_command(command, out), continuation)
    }

    /// Submit a command carrying caller context back to the continuation
    pub fn submit_with_context<T, F>(&self, command: &str, context: T, continuation: F) -> Result<()>
    where
        T: 'static,
        F: FnOnce(T, Result<Reply>) + 'static,
    {
        self.submit(command, move |outcome| continuation(context, outcome))
    }

    /// Submit a command from raw, binary-safe arguments
    pub fn submit_args<F>(&self, args: &[&[u8]], continuation: F) -> Result<()>
    where
        F: FnOnce(Result<Reply>) + 'static,
    {
        if args.is_empty() {
            return Err(ClientError::InvalidCommand("empty command".to_string()));
        }
        let label = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg))
            .collect::<Vec<_>>()
            .join(" ");
        self.enqueue(
            label,
            |out| {
                write_args(args, out);
                Ok(())
            },
            continuation,
        )
    }

    /// Submit a command and await its outcome as a future
    pub fn request(&self, command: &str) -> Result<impl Future<Output = Result<Reply>>> {
        let (tx, rx) = oneshot::channel();
        self.submit(command, move |outcome| {
            // The receiver may have been dropped; the outcome is then unwanted.
            let _ = tx.send(outcome);
        })?;

        Ok(async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::ConnectionLost(
                    "reply channel dropped".to_string(),
                )),
            }
        })
    }

    fn enqueue<E, F>(&self, label: String, encode: E, continuation: F) -> Result<()>
    where
        E: FnOnce(&mut BytesMut) -> Result<()>,
        F: FnOnce(Result<Reply>) + 'static,
    {
        let mut shared = self.shared.borrow_mut();
        if shared.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        encode(&mut shared.outbound)?;
        tracing::trace!(command = %label, queued = shared.outbound.len(), "command submitted");
        shared.channel.enqueue(PendingCommand::new(label, continuation));
        if let Some(signals) = &shared.session {
            signals.wakeup.notify_one();
        }
        Ok(())
    }

    // =========================================================================
    // Session Task
    // =========================================================================

    async fn run_session(self, generation: u64, signals: SessionSignals, attempt: ConnectFuture<C::Stream>) {
        let result = tokio::select! {
            biased;
            _ = signals.shutdown.notified() => {
                self.finish_teardown(generation, None);
                return;
            }
            result = attempt => result,
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                self.connect_failed(generation, ClientError::Connect(err));
                return;
            }
        };

        if !self.connect_succeeded(generation) {
            return;
        }

        let end = self.drive(generation, &signals, stream).await;
        let reason = match end {
            SessionEnd::Superseded => return,
            SessionEnd::Closed => None,
            SessionEnd::Failed(err) => Some(err),
        };

        if let Some(err) = self.finish_teardown(generation, reason) {
            if err.is_fatal() {
                self.handle.fail(err);
            }
        }
    }

    /// Read replies and flush commands until the session ends
    async fn drive(&self, generation: u64, signals: &SessionSignals, stream: C::Stream) -> SessionEnd {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = ReplyDecoder::with_capacity(self.read_buffer_capacity);
        let mut write_buf = BytesMut::new();

        loop {
            if !self.is_current(generation) {
                return SessionEnd::Superseded;
            }
            if write_buf.is_empty() {
                self.take_outbound(&mut write_buf);
            }
            decoder.buffer_mut().reserve(self.read_buffer_capacity);

            tokio::select! {
                biased;
                _ = signals.shutdown.notified() => return SessionEnd::Closed,
                result = writer.write_buf(&mut write_buf), if !write_buf.is_empty() => match result {
                    Ok(0) => {
                        let err = io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes");
                        return SessionEnd::Failed(ClientError::Transport(err));
                    }
                    Ok(written) => tracing::trace!(written, remaining = write_buf.len(), "flushed commands"),
                    Err(err) => return SessionEnd::Failed(ClientError::Transport(err)),
                },
                result = reader.read_buf(decoder.buffer_mut()) => match result {
                    Ok(0) => {
                        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server");
                        return SessionEnd::Failed(ClientError::Transport(err));
                    }
                    Ok(read) => {
                        tracing::trace!(read, buffered = decoder.buffered(), "received bytes");
                        if let Err(err) = self.dispatch(generation, &mut decoder) {
                            return SessionEnd::Failed(err);
                        }
                    }
                    Err(err) => return SessionEnd::Failed(ClientError::Transport(err)),
                },
                _ = signals.wakeup.notified(), if write_buf.is_empty() => {}
            }
        }
    }

    /// Route every complete buffered reply to its pending command
    fn dispatch(&self, generation: u64, decoder: &mut ReplyDecoder) -> Result<()> {
        while self.accepts_replies(generation) {
            let reply = match decoder.next_reply()? {
                Some(reply) => reply,
                None => break,
            };
            let resolution = self.shared.borrow_mut().channel.on_reply_decoded(reply)?;
            tracing::trace!(command = resolution.command(), "reply delivered");
            resolution.invoke();
        }
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn connect_failed(&self, generation: u64, err: ClientError) {
        let state = {
            let mut shared = self.shared.borrow_mut();
            if shared.generation != generation {
                return;
            }
            let state = shared.state;
            if state == ConnectionState::Connecting {
                shared.state = ConnectionState::Disconnected;
                shared.session = None;
            }
            state
        };

        match state {
            ConnectionState::Connecting => {
                tracing::debug!(peer = %self.peer(), error = %err, "connect attempt failed");
                (self.callbacks.on_connect)(self, Some(&err));
            }
            // disconnect() raced the failed attempt
            ConnectionState::Disconnecting => {
                self.finish_teardown(generation, None);
            }
            _ => {}
        }
    }

    /// Returns false when the session must not start its I/O loop
    fn connect_succeeded(&self, generation: u64) -> bool {
        let state = {
            let mut shared = self.shared.borrow_mut();
            if shared.generation != generation {
                return false;
            }
            let state = shared.state;
            if state == ConnectionState::Connecting {
                shared.state = ConnectionState::Connected;
            }
            state
        };

        match state {
            ConnectionState::Connecting => {
                tracing::debug!(peer = %self.peer(), generation, "connected");
                (self.callbacks.on_connect)(self, None);
                self.is_current(generation)
            }
            ConnectionState::Disconnecting => {
                self.finish_teardown(generation, None);
                false
            }
            _ => false,
        }
    }

    /// Drain pending commands and report the teardown
    ///
    /// Returns the failure reason back to the caller, or `None` when the
    /// session had already been superseded.
    fn finish_teardown(&self, generation: u64, reason: Option<ClientError>) -> Option<ClientError> {
        let drained = {
            let mut shared = self.shared.borrow_mut();
            if shared.generation != generation {
                return None;
            }
            let why = reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "connection closed".to_string());
            let drained = shared.channel.drain_on_teardown(&why);
            shared.outbound.clear();
            shared.session = None;
            shared.state = ConnectionState::Disconnected;
            drained
        };

        match &reason {
            Some(err) => tracing::debug!(
                peer = %self.peer(),
                error = %err,
                pending = drained.len(),
                "connection lost"
            ),
            None => tracing::debug!(peer = %self.peer(), pending = drained.len(), "connection closed"),
        }

        for resolution in drained {
            resolution.invoke();
        }
        (self.callbacks.on_disconnect)(self, reason.as_ref());
        reason
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.borrow().generation == generation
    }

    fn accepts_replies(&self, generation: u64) -> bool {
        let shared = self.shared.borrow();
        shared.generation == generation && shared.state == ConnectionState::Connected
    }

    fn take_outbound(&self, buf: &mut BytesMut) {
        let mut shared = self.shared.borrow_mut();
        if !shared.outbound.is_empty() {
            *buf = shared.outbound.split();
        }
    }
}
