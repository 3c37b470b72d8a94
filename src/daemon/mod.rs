//! Daemon core: owns the worker thread and its lifecycle.
//!
//! ```text
//!   New ──start──► Running ──stop──► Stopped
//!    │                                 ▲
//!    └──────────────stop───────────────┘ (no-op, stays New)
//! ```
//!
//! `stop` signals the worker over a watch channel and joins it, so
//! everything the worker did is visible to the caller once `stop` returns.

mod event_loop;
mod timer;


use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tokio::sync::{oneshot, watch};

use crate::callbacks::Callbacks;
use crate::error::{AirPtpError, Result};
use crate::gateway::MessageGateway;
use crate::net::{BoundPorts, Service};
use crate::types::{DaemonConfig, HandleState};

use event_loop::{BeaconSetup, Intervals, WorkerSetup, run_worker};
pub use event_loop::THREAD_NAME;

/// Lifecycle of a [`Daemon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaemonState {
    /// Not started yet
    #[default]
    New,
    /// Worker thread spawned and running its loop
    Running,
    /// Stopped; cannot be restarted
    Stopped,
}

impl From<DaemonState> for HandleState {
    fn from(state: DaemonState) -> Self {
        match state {
            DaemonState::New => Self::PortsBound,
            DaemonState::Running => Self::Running,
            DaemonState::Stopped => Self::Stopped,
        }
    }
}

/// Worker thread plus the means to stop it
#[derive(Default)]
pub struct Daemon {
    state: DaemonState,
    running: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
    callbacks: Option<Arc<dyn Callbacks>>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("state", &self.state)
            .field("running", &self.is_running())
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Create a daemon in state [`DaemonState::New`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Whether the worker loop is still alive
    ///
    /// Turns false as soon as the worker exits, including an unexpected
    /// exit before `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Initialise `gateway` and start the worker on duplicates of `ports`.
    ///
    /// Returns once the worker has registered its sockets and, when
    /// `publish_beacon` is set, created the presence beacon. The originals
    /// in `ports` stay with the caller.
    ///
    /// # Errors
    ///
    /// - [`AirPtpError::InvalidState`] unless the daemon is `New`
    /// - [`AirPtpError::Init`] if the gateway fails to initialise
    /// - [`AirPtpError::Resource`] if descriptors or the runtime cannot be
    ///   set up
    /// - [`AirPtpError::Thread`] if the worker cannot be spawned or dies
    ///   before reporting in
    /// - [`AirPtpError::Beacon`] if the beacon cannot be published
    ///
    /// On error the daemon stays `New` and nothing it acquired is left
    /// behind.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime, since it blocks until
    /// the worker reports in.
    pub fn start(
        &mut self,
        ports: &BoundPorts,
        config: &DaemonConfig,
        publish_beacon: bool,
        clock_identity: u64,
        mut gateway: Box<dyn MessageGateway>,
        callbacks: Arc<dyn Callbacks>,
    ) -> Result<()> {
        if self.state != DaemonState::New {
            return Err(AirPtpError::InvalidState {
                expected: HandleState::PortsBound,
                actual: self.state.into(),
            });
        }

        gateway
            .init(clock_identity)
            .map_err(|source| AirPtpError::Init { source })?;

        let duplicate = |service: &Service| {
            service
                .try_clone_socket()
                .map_err(|source| AirPtpError::Resource {
                    context: "duplicate socket",
                    source,
                })
        };
        let setup = WorkerSetup {
            event_rx: duplicate(ports.event())?,
            general_rx: duplicate(ports.general())?,
            event_tx: duplicate(ports.event())?,
            general_tx: duplicate(ports.general())?,
            gateway,
            callbacks: Arc::clone(&callbacks),
            beacon: publish_beacon.then(|| BeaconSetup {
                name: config.beacon_name.clone(),
                clock_identity,
                stale_after: config.beacon_stale_after,
            }),
            intervals: Intervals {
                announce: config.announce_interval,
                signaling: config.signaling_interval,
                sync: config.sync_interval,
                beacon_refresh: config.beacon_refresh_interval,
            },
            recv_buf_size: config.recv_buf_size,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| AirPtpError::Resource {
                context: "create event loop",
                source,
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let spawned = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_worker(setup, runtime, shutdown_rx, ready_tx, running));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(source) => {
                self.running.store(false, Ordering::Release);
                return Err(AirPtpError::Thread { source });
            }
        };

        let ready = ready_rx.blocking_recv().unwrap_or_else(|_| {
            Err(AirPtpError::Thread {
                source: io::Error::other("worker exited before reporting readiness"),
            })
        });
        if let Err(e) = ready {
            if worker.join().is_err() {
                tracing::warn!("PTP worker thread panicked during setup");
                callbacks.log_message("Could not join PTP worker thread");
            }
            return Err(e);
        }

        self.callbacks = Some(callbacks);
        self.shutdown = Some(shutdown_tx);
        self.worker = Some(worker);
        self.state = DaemonState::Running;
        tracing::info!("PTP daemon started as {:016X}", clock_identity);
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Idempotent. A worker that already exited on its own is only joined.
    /// Has no effect on a daemon that was never started.
    pub fn stop(&mut self) {
        if self.state != DaemonState::Running {
            return;
        }

        if let Some(shutdown) = self.shutdown.take() {
            if self.is_running() {
                // Dropping the sender also ends the loop, so a send error
                // needs no handling.
                let _ = shutdown.send(true);
            } else {
                tracing::warn!("PTP worker exited before stop was requested");
                self.report("PTP event loop terminated ahead of time");
            }
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("PTP worker thread panicked");
                self.report("Could not join PTP worker thread");
            }
        }

        self.state = DaemonState::Stopped;
        tracing::info!("PTP daemon stopped");
    }

    fn report(&self, msg: &str) {
        if let Some(callbacks) = &self.callbacks {
            callbacks.log_message(msg);
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop();
    }
}
