//! Reconnect Policy
//!
//! Fixed-delay retry of `connect()` after a failed attempt or a lost
//! connection. The delay is constant and retries are unbounded.

use std::time::Duration;

use super::connection::{Connection, ConnectionState, LifecycleCallbacks};
use super::connector::Connector;

/// Constant-backoff reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    /// Retry after `delay`, forever
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Lifecycle callbacks applying this policy
    ///
    /// `on_ready` runs after every successful connect. Errors reported to
    /// either callback schedule a retry, except fatal ones.
    pub fn callbacks<C, F>(self, on_ready: F) -> LifecycleCallbacks<C>
    where
        C: Connector,
        F: Fn(&Connection<C>) + 'static,
    {
        LifecycleCallbacks::new(
            move |connection: &Connection<C>, error| match error {
                Some(err) => {
                    tracing::warn!(
                        peer = %connection.peer(),
                        error = %err,
                        delay_ms = self.delay().as_millis() as u64,
                        "error in connect, retrying"
                    );
                    self.schedule_retry(connection);
                }
                None => {
                    tracing::info!(peer = %connection.peer(), "connected");
                    on_ready(connection);
                }
            },
            move |connection: &Connection<C>, error| match error {
                Some(err) if err.is_fatal() => {
                    tracing::error!(peer = %connection.peer(), error = %err, "fatal error, not reconnecting");
                }
                Some(err) => {
                    tracing::warn!(
                        peer = %connection.peer(),
                        error = %err,
                        delay_ms = self.delay().as_millis() as u64,
                        "error on disconnect, reconnecting"
                    );
                    self.schedule_retry(connection);
                }
                None => tracing::info!(peer = %connection.peer(), "disconnected"),
            },
        )
    }

    /// Re-issue `connect()` after the fixed delay
    ///
    /// A synchronous `connect()` failure at that point is fatal and fails the
    /// event loop.
    pub fn schedule_retry<C: Connector>(&self, connection: &Connection<C>) {
        let retry = connection.clone();
        let scheduled = connection.loop_handle().schedule_timer(self.delay(), move || {
            if retry.state() != ConnectionState::Disconnected {
                tracing::debug!(state = ?retry.state(), "retry skipped, connection already active");
                return;
            }
            if let Err(err) = retry.connect() {
                tracing::error!(peer = %retry.peer(), error = %err, "cannot reconnect");
                retry.loop_handle().fail(err);
            }
        });

        if let Err(err) = scheduled {
            tracing::debug!(error = %err, "retry not scheduled");
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}
