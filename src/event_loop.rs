//! Event Loop
//!
//! Single-threaded scheduler the client runs on.
//!
//! ## Responsibilities
//! - Own the tokio current-thread runtime and its `LocalSet`
//! - Spawn `!Send` tasks (connection sessions, timers)
//! - Carry the stop/fail outcome back to whoever runs the loop
//!
//! ## Lifecycle
//! ```text
//! EventLoop::new()  ──>  block_on(..) / run_until_stopped()  ──>  drop
//!                              │
//!              LoopHandle::stop() / LoopHandle::fail(err)
//! ```
//!
//! Dropping the `EventLoop` drops the runtime and every task still
//! scheduled on it, so resources are released on every exit path.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};

use crate::error::{ClientError, Result};

/// Owns the runtime; create, run, then drop.
pub struct EventLoop {
    // Field order is drop order: tasks go before the runtime that drives them.
    local: LocalSet,
    runtime: Runtime,
    handle: LoopHandle,
}

impl EventLoop {
    /// Create a stopped-until-run event loop
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            local: LocalSet::new(),
            runtime,
            handle: LoopHandle::new(),
        })
    }

    /// Handle used to schedule work and to stop the loop
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Drive the loop until `future` completes
    ///
    /// Tasks spawned through [`LoopHandle::spawn`] only make progress while
    /// some `block_on` call is running.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(self.local.run_until(future))
    }

    /// Drive the loop until [`LoopHandle::stop`] or [`LoopHandle::fail`]
    pub fn run_until_stopped(&self) -> Result<()> {
        let handle = self.handle.clone();
        self.block_on(async move { handle.stopped().await })
    }
}

struct LoopState {
    stopped: Cell<bool>,
    failure: RefCell<Option<ClientError>>,
    wakeup: Notify,
}

/// Cloneable reference to an [`EventLoop`]'s run state
#[derive(Clone)]
pub struct LoopHandle {
    state: Rc<LoopState>,
}

impl LoopHandle {
    fn new() -> Self {
        Self {
            state: Rc::new(LoopState {
                stopped: Cell::new(false),
                failure: RefCell::new(None),
                wakeup: Notify::new(),
            }),
        }
    }

    /// Spawn a task on the loop
    ///
    /// Must be called while the loop is running (from `block_on` or from a
    /// task or callback it drives).
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<()>>
    where
        F: Future<Output = ()> + 'static,
    {
        if self.is_stopped() {
            return Err(ClientError::LoopStopped);
        }
        Ok(tokio::task::spawn_local(future))
    }

    /// Run `callback` once after `delay`, unless the loop stops first
    pub fn schedule_timer<F>(&self, delay: Duration, callback: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        let handle = self.clone();
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            if !handle.is_stopped() {
                callback();
            }
        })?;
        Ok(())
    }

    /// Stop the loop gracefully
    pub fn stop(&self) {
        if !self.state.stopped.replace(true) {
            tracing::debug!("event loop stop requested");
        }
        self.state.wakeup.notify_waiters();
    }

    /// Stop the loop with a fatal error; the first failure wins
    pub fn fail(&self, err: ClientError) {
        tracing::error!(error = %err, "event loop failed");
        {
            let mut failure = self.state.failure.borrow_mut();
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    /// Resolves once the loop is stopped, yielding the recorded failure if any
    pub async fn stopped(&self) -> Result<()> {
        while !self.is_stopped() {
            self.state.wakeup.notified().await;
        }
        match self.state.failure.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
