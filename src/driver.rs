//! Driver
//!
//! Wires the startup command sequence to a connection and runs the event
//! loop until it is stopped (Ctrl-C) or fails (fatal error).

use std::cell::Cell;
use std::rc::Rc;

use crate::config::Config;
use crate::error::Result;
use crate::event_loop::{EventLoop, LoopHandle};
use crate::network::{Connection, Connector, ReconnectPolicy, TcpConnector};
use crate::protocol::{render_outcome, Reply};

/// Runs one client session from startup to loop termination
pub struct Driver {
    config: Config,
}

impl Driver {
    /// Create a driver for a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run against the configured TCP server until stopped
    ///
    /// Returns `Ok(())` on a graceful stop. Fails if the initial connect
    /// cannot be scheduled or the loop is failed by a fatal error.
    pub fn run(&self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        let handle = event_loop.handle();

        event_loop.block_on(async {
            let connection = self.start(&handle, TcpConnector::from_config(&self.config))?;

            let interrupt = handle.clone();
            handle.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, stopping");
                    interrupt.stop();
                }
            })?;

            let outcome = handle.stopped().await;
            connection.close("event loop stopped");
            outcome
        })
    }

    /// Build the connection, install the reconnect policy and issue the
    /// first `connect()`
    ///
    /// Initial commands are submitted after the first successful connection
    /// only; on-connect commands after every one.
    pub fn start<C: Connector>(&self, handle: &LoopHandle, connector: C) -> Result<Connection<C>> {
        let initial = self.config.initial_commands.clone();
        let every = self.config.on_connect_commands.clone();
        let first = Rc::new(Cell::new(true));

        let policy = ReconnectPolicy::fixed(self.config.reconnect_delay);
        let callbacks = policy.callbacks(move |connection: &Connection<C>| {
            if first.replace(false) {
                submit_all(connection, &initial);
            }
            submit_all(connection, &every);
        });

        let connection = Connection::new(connector, handle.clone(), callbacks)
            .with_read_buffer_capacity(self.config.read_buffer_capacity);
        connection.connect()?;
        Ok(connection)
    }
}

fn submit_all<C: Connector>(connection: &Connection<C>, commands: &[String]) {
    for command in commands {
        let label = command.clone();
        let submitted = connection.submit(command, move |outcome| print_outcome(&label, &outcome));
        if let Err(err) = submitted {
            tracing::warn!(command = %command, error = %err, "command not submitted");
        }
    }
}

/// Write a rendered outcome to stderr
fn print_outcome(command: &str, outcome: &Result<Reply>) {
    match outcome {
        Ok(reply) => tracing::debug!(
            command,
            kind = reply.kind(),
            server_error = reply.is_error(),
            "reply received"
        ),
        Err(err) => tracing::debug!(command, error = %err, "no reply"),
    }
    for line in render_outcome(outcome, 0) {
        eprintln!("{}", line);
    }
}
