//! Test support: scripted in-memory connector and fake server helpers.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use respline::network::{ConnectFuture, Connector, LifecycleCallbacks};
use respline::protocol::{render_outcome, Reply, ReplyDecoder};
use respline::{ClientError, EventLoop, LoopHandle, Result};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

/// What the next connect attempt does
#[derive(Debug, Clone, Copy)]
pub enum Attempt {
    /// Attempt starts and then fails (connection refused)
    Refuse,
    /// Attempt succeeds; the server half is handed to the test
    Accept,
    /// Attempt cannot even be started
    FailToStart,
}

/// Connector that follows a script and hands server halves to the test
pub struct ScriptedConnector {
    script: RefCell<VecDeque<Attempt>>,
    servers: mpsc::UnboundedSender<DuplexStream>,
    attempts: Rc<Cell<usize>>,
}

impl ScriptedConnector {
    pub fn new(
        script: impl IntoIterator<Item = Attempt>,
    ) -> (Self, mpsc::UnboundedReceiver<DuplexStream>, Rc<Cell<usize>>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let attempts = Rc::new(Cell::new(0));
        let connector = Self {
            script: RefCell::new(script.into_iter().collect()),
            servers,
            attempts: Rc::clone(&attempts),
        };
        (connector, accepted, attempts)
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    fn connect(&self) -> io::Result<ConnectFuture<DuplexStream>> {
        self.attempts.set(self.attempts.get() + 1);
        let attempt = self.script.borrow_mut().pop_front().unwrap_or(Attempt::Accept);
        match attempt {
            Attempt::FailToStart => Err(io::Error::new(
                io::ErrorKind::Other,
                "too many open files",
            )),
            Attempt::Refuse => Ok(Box::pin(async {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            })),
            Attempt::Accept => {
                let (client, server) = tokio::io::duplex(64 * 1024);
                let _ = self.servers.send(server);
                Ok(Box::pin(async move { Ok(client) }))
            }
        }
    }

    fn peer(&self) -> String {
        "scripted".to_string()
    }
}

/// Shared, ordered log of lifecycle events and command outcomes
#[derive(Clone)]
pub struct Sink {
    tx: mpsc::UnboundedSender<String>,
}

impl Sink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, entry: impl Into<String>) {
        let _ = self.tx.send(entry.into());
    }

    /// Continuation that logs `"<label> -> <rendered lines joined by |>"`
    pub fn continuation(&self, label: &str) -> impl FnOnce(Result<Reply>) + 'static {
        let sink = self.clone();
        let label = label.to_string();
        move |outcome| {
            let rendered = render_outcome(&outcome, 0).join("|");
            sink.push(format!("{} -> {}", label, rendered));
        }
    }

    /// Callbacks logging `connected`, `connect failed: ..`, `disconnected: ..`
    pub fn callbacks<C: Connector>(&self) -> LifecycleCallbacks<C> {
        let on_connect = self.clone();
        let on_disconnect = self.clone();
        LifecycleCallbacks::new(
            move |_, error: Option<&ClientError>| match error {
                Some(err) => on_connect.push(format!("connect failed: {}", err)),
                None => on_connect.push("connected"),
            },
            move |_, error: Option<&ClientError>| match error {
                Some(err) => on_disconnect.push(format!("disconnected: {}", err)),
                None => on_disconnect.push("disconnected"),
            },
        )
    }
}

/// Run a test body on a fresh event loop, bounded by a timeout
pub fn run<F, Fut>(body: F)
where
    F: FnOnce(LoopHandle) -> Fut,
    Fut: Future<Output = ()>,
{
    let event_loop = EventLoop::new().expect("event loop");
    let handle = event_loop.handle();
    event_loop.block_on(async move {
        tokio::time::timeout(Duration::from_secs(5), body(handle))
            .await
            .expect("test timed out");
    });
}

/// Receive the next log entry
pub async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    rx.recv().await.expect("sink closed")
}

/// Read until `count` complete commands have arrived at the fake server
pub async fn read_commands(server: &mut DuplexStream, count: usize) -> Vec<String> {
    let mut decoder = ReplyDecoder::new();
    let mut commands = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        while let Some(frame) = decoder.next_reply().expect("client sent valid RESP") {
            commands.push(command_text(&frame));
        }
        if commands.len() >= count {
            return commands;
        }
        let read = server.read(&mut chunk).await.expect("server read");
        assert!(read > 0, "client closed the stream early");
        decoder.feed(&chunk[..read]);
    }
}

fn command_text(frame: &Reply) -> String {
    match frame {
        Reply::Array(args) => args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg.as_bytes().expect("bulk argument")).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        other => panic!("expected command array, got {:?}", other),
    }
}
