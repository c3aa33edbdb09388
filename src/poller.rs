//! The poll loop
//!
//! Keeps the [`JailStateStore`] in step with fail2ban:
//! - Polls `status <jail>` on a fixed interval, no backoff
//! - Serves refresh requests ahead of the timer and restarts the interval
//! - Records failures in the store and keeps polling
//!
//! The loop task is the only writer of the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::client::ControlInterface;
use crate::error::{Error, Result};
use crate::jail::status;
use crate::jail::{Clock, JailSnapshot, JailStateStore, JailStatus};

use machine::{DynamicPollMachine, PollMachine, PollMachineEvent};

/// Idle/Polling/Failed lifecycle, kept apart from the crate `Result` alias
mod machine {
    use state_machines::state_machine;

    state_machine! {
        name: PollMachine,
        dynamic: true,
        initial: Idle,
        states: [Idle, Polling, Failed],
        events {
            begin {
                transition: { from: [Idle, Failed], to: Polling }
            }
            succeed {
                transition: { from: Polling, to: Idle }
            }
            fail {
                transition: { from: Polling, to: Failed }
            }
        }
    }
}

/// Poll loop state for external use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Failed,
}

impl PollState {
    /// Parse state from string representation
    fn from_name(s: &str) -> Self {
        match s {
            "Polling" => PollState::Polling,
            "Failed" => PollState::Failed,
            _ => PollState::Idle,
        }
    }
}

/// Requests the poll loop receives
#[derive(Debug)]
pub enum PollRequest {
    /// Poll now; `done` receives the snapshot once the poll finished
    Refresh {
        done: Option<oneshot::Sender<JailSnapshot>>,
    },
    /// Stop the loop
    Shutdown,
}

/// Periodic status poller for one jail
pub struct PollLoop<C: ControlInterface> {
    /// Control interface used to read status
    client: Arc<C>,
    /// Store updated after every poll
    store: JailStateStore,
    /// Source of update timestamps
    clock: Arc<dyn Clock>,
    /// Jail being polled
    jail_name: String,
    /// Time between timer-driven polls
    interval: Duration,
    /// Idle/Polling/Failed machine
    machine: DynamicPollMachine<()>,
    /// Incoming refresh and shutdown requests
    rx: mpsc::Receiver<PollRequest>,
}

impl<C: ControlInterface> PollLoop<C> {
    /// Create a poll loop and the handle that drives it
    ///
    /// The loop stops when [`PollHandle::shutdown`] is called or every
    /// handle has been dropped.
    pub fn new(
        client: Arc<C>,
        store: JailStateStore,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> (Self, PollHandle) {
        let (tx, rx) = mpsc::channel(16);
        let jail_name = store.current().jail_name;
        let poller = Self {
            client,
            store,
            clock,
            jail_name,
            interval,
            machine: PollMachine::new(()).into_dynamic(),
            rx,
        };
        (poller, PollHandle { sender: tx })
    }

    /// Current state of the loop
    pub fn state(&self) -> PollState {
        PollState::from_name(self.machine.current_state())
    }

    /// Run until shut down
    ///
    /// This should be spawned as a tokio task
    pub async fn run(mut self) {
        tracing::info!(
            jail = %self.jail_name,
            interval = ?self.interval,
            "starting poll loop"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                request = self.rx.recv() => match request {
                    Some(PollRequest::Refresh { done }) => {
                        // Ignored: the outcome is already in the store
                        let _ = self.poll_once().await;
                        ticker.reset();
                        if let Some(done) = done {
                            let _ = done.send(self.store.current());
                        }
                    }
                    Some(PollRequest::Shutdown) | None => break,
                },
                _ = ticker.tick() => {
                    let _ = self.poll_once().await;
                }
            }
        }

        tracing::info!(jail = %self.jail_name, "poll loop stopped");
    }

    /// Run one poll and record the outcome in the store
    pub async fn poll_once(&mut self) -> Result<JailStatus> {
        self.transition(PollMachineEvent::Begin);

        let result = read_status(Arc::clone(&self.client), self.jail_name.clone()).await;
        let at = self.clock.now();

        match &result {
            Ok(status) => {
                tracing::debug!(jail = %self.jail_name, %status, "poll succeeded");
                self.store.apply_success(status.clone(), at);
                self.transition(PollMachineEvent::Succeed);
            }
            Err(e) if e.is_invocation() => {
                tracing::warn!(jail = %self.jail_name, error = %e, "could not run control command");
                self.store.apply_failure(e, at);
                self.transition(PollMachineEvent::Fail);
            }
            Err(e) => {
                tracing::warn!(jail = %self.jail_name, error = %e, "poll failed");
                self.store.apply_failure(e, at);
                self.transition(PollMachineEvent::Fail);
            }
        }

        result
    }

    fn transition(&mut self, event: PollMachineEvent) {
        if let Err(e) = self.machine.handle(event) {
            tracing::error!(jail = %self.jail_name, "invalid poll transition: {:?}", e);
        }
        tracing::trace!(jail = %self.jail_name, state = ?self.state(), "poll state");
    }
}

/// Invoke `status <jail>` off the runtime and validate the output
async fn read_status<C: ControlInterface>(client: Arc<C>, jail: String) -> Result<JailStatus> {
    let command = format!("status {}", jail);
    let output = tokio::task::spawn_blocking(move || client.read_status(&jail))
        .await
        .map_err(|e| Error::Invocation {
            command: command.clone(),
            message: e.to_string(),
        })??;

    if !output.success() {
        let code = output
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(Error::CommandFailed {
            command,
            message: format!("exit {}: {}", code, output.message()),
        });
    }

    if !status::is_status_report(&output.stdout) {
        return Err(Error::UnexpectedOutput("fail2ban-client".to_string()));
    }

    Ok(status::parse(&output.stdout))
}

/// Cloneable handle for talking to a running [`PollLoop`]
#[derive(Clone)]
pub struct PollHandle {
    sender: mpsc::Sender<PollRequest>,
}

impl PollHandle {
    /// Ask for an immediate poll without waiting for it
    pub async fn refresh_now(&self) -> Result<()> {
        self.sender
            .send(PollRequest::Refresh { done: None })
            .await
            .map_err(|_| Error::PollLoopClosed)
    }

    /// Ask for an immediate poll and wait for the resulting snapshot
    pub async fn refresh_and_wait(&self) -> Result<JailSnapshot> {
        let (done, rx) = oneshot::channel();
        self.sender
            .send(PollRequest::Refresh { done: Some(done) })
            .await
            .map_err(|_| Error::PollLoopClosed)?;
        rx.await.map_err(|_| Error::PollLoopClosed)
    }

    /// Stop the loop after any poll in flight
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PollRequest::Shutdown).await;
    }
}
