//! The public handle: bind, start, discover, release.


use std::sync::Arc;

use crate::beacon;
use crate::callbacks::{Callbacks, or_noop};
use crate::daemon::Daemon;
use crate::error::{AirPtpError, Result};
use crate::gateway::{MasterGateway, MasterGatewayConfig, MessageGateway};
use crate::net::{BoundPorts, bind_ports};
use crate::types::{DaemonConfig, HandleState, Role, clock_identity_from_seed};

/// Handle on a PTP daemon, either one this process owns or one it found
/// running elsewhere on the host
///
/// # Example
///
/// ```rust,no_run
/// use airptp::PtpHandle;
///
/// # fn example() -> Result<(), airptp::AirPtpError> {
/// let handle = match PtpHandle::discover() {
///     Ok(observer) => observer,
///     Err(_) => {
///         let mut owner = PtpHandle::bind()?;
///         owner.start(0x0012_3456_789A, true, None)?;
///         owner
///     }
/// };
/// println!("PTP clock {:016X}", handle.clock_identity()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PtpHandle {
    role: Role,
    state: HandleState,
    config: DaemonConfig,
    ports: Option<BoundPorts>,
    daemon: Option<Daemon>,
    clock_identity: Option<u64>,
}

impl PtpHandle {
    /// Bind the standard PTP ports (319 and 320).
    ///
    /// # Errors
    ///
    /// Returns [`AirPtpError::Bind`] if either port cannot be bound.
    pub fn bind() -> Result<Self> {
        Self::bind_with_config(DaemonConfig::default())
    }

    /// Bind the ports named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AirPtpError::Bind`] if either port cannot be bound.
    pub fn bind_with_config(config: DaemonConfig) -> Result<Self> {
        let ports = bind_ports(&config)?;
        Ok(Self {
            role: Role::Owner,
            state: HandleState::PortsBound,
            config,
            ports: Some(ports),
            daemon: None,
            clock_identity: None,
        })
    }

    /// Start serving time with a [`MasterGateway`].
    ///
    /// `seed` supplies the low 48 bits of the clock identity. With
    /// `publish_beacon` the identity is advertised to other processes on
    /// this host.
    ///
    /// # Errors
    ///
    /// See [`start_with_gateway`](Self::start_with_gateway).
    pub fn start(
        &mut self,
        seed: u64,
        publish_beacon: bool,
        callbacks: Option<Arc<dyn Callbacks>>,
    ) -> Result<()> {
        let gateway = MasterGateway::new(MasterGatewayConfig::default());
        self.start_with_gateway(seed, publish_beacon, Box::new(gateway), callbacks)
    }

    /// Start serving time with a caller-supplied gateway.
    ///
    /// # Errors
    ///
    /// - [`AirPtpError::NotOwner`] on a discovered handle
    /// - [`AirPtpError::InvalidState`] unless the handle is `PortsBound`
    /// - any setup error from the daemon; the handle then stays
    ///   `PortsBound` and `start` may be retried
    pub fn start_with_gateway(
        &mut self,
        seed: u64,
        publish_beacon: bool,
        gateway: Box<dyn MessageGateway>,
        callbacks: Option<Arc<dyn Callbacks>>,
    ) -> Result<()> {
        if self.role == Role::Observer {
            return Err(AirPtpError::NotOwner);
        }
        let ports = match (self.state, self.ports.as_ref()) {
            (HandleState::PortsBound, Some(ports)) => ports,
            (actual, _) => {
                return Err(AirPtpError::InvalidState {
                    expected: HandleState::PortsBound,
                    actual,
                });
            }
        };

        let clock_identity = clock_identity_from_seed(seed);
        let mut daemon = Daemon::new();
        daemon.start(
            ports,
            &self.config,
            publish_beacon,
            clock_identity,
            gateway,
            or_noop(callbacks),
        )?;

        self.daemon = Some(daemon);
        self.clock_identity = Some(clock_identity);
        self.advance(HandleState::Running);
        Ok(())
    }

    /// Find a live daemon through its presence beacon.
    ///
    /// # Errors
    ///
    /// Returns [`AirPtpError::NotFound`] if there is no beacon, or it is
    /// unreadable, incompatible or stale.
    pub fn discover() -> Result<Self> {
        Self::discover_with_config(&DaemonConfig::default())
    }

    /// Find a live daemon using the beacon name and staleness threshold in
    /// `config`.
    ///
    /// # Errors
    ///
    /// See [`discover`](Self::discover).
    pub fn discover_with_config(config: &DaemonConfig) -> Result<Self> {
        let record = beacon::discover(&config.beacon_name, config.beacon_stale_after)
            .map_err(|e| {
                tracing::debug!("No PTP daemon at {}: {}", config.beacon_name, e);
                AirPtpError::NotFound
            })?;

        tracing::info!(
            "Found PTP daemon {:016X} (beacon v{}.{})",
            record.clock_identity,
            record.version_major,
            record.version_minor
        );
        Ok(Self {
            role: Role::Observer,
            state: HandleState::Running,
            config: config.clone(),
            ports: None,
            daemon: None,
            clock_identity: Some(record.clock_identity),
        })
    }

    /// Clock identity of the running daemon
    ///
    /// # Errors
    ///
    /// Returns [`AirPtpError::NotRunning`] unless the handle is `Running`.
    pub fn clock_identity(&self) -> Result<u64> {
        match (self.state, self.clock_identity) {
            (HandleState::Running, Some(id)) => Ok(id),
            _ => Err(AirPtpError::NotRunning),
        }
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether this handle owns the daemon or merely observes it
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the daemon is serving time
    ///
    /// For an owner this reflects the worker thread itself, so it turns
    /// false if the worker exits unexpectedly.
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self.role {
            Role::Owner => self.daemon.as_ref().is_some_and(Daemon::is_running),
            Role::Observer => self.state == HandleState::Running,
        }
    }

    /// Bound event port (owner only)
    #[must_use]
    pub fn event_port(&self) -> Option<u16> {
        self.ports.as_ref().map(|ports| ports.event().port())
    }

    /// Bound general port (owner only)
    #[must_use]
    pub fn general_port(&self) -> Option<u16> {
        self.ports.as_ref().map(|ports| ports.general().port())
    }

    /// Configuration the handle was created with
    #[must_use]
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Stop the worker if this handle owns a running one.
    ///
    /// Idempotent. An observer only marks itself stopped; the daemon it
    /// found and that daemon's beacon are left alone. A bound but never
    /// started handle is unaffected.
    pub fn stop(&mut self) {
        match (self.role, self.state) {
            (Role::Owner, HandleState::Running) => {
                if let Some(daemon) = self.daemon.as_mut() {
                    daemon.stop();
                }
                self.advance(HandleState::Stopped);
            }
            (Role::Observer, HandleState::Running) => self.advance(HandleState::Stopped),
            _ => {}
        }
    }

    /// Move forward to `next`; backward or repeated transitions are ignored.
    fn advance(&mut self, next: HandleState) {
        if self.state.can_advance_to(next) {
            tracing::debug!("PTP handle {} -> {}", self.state, next);
            self.state = next;
        } else {
            tracing::warn!("PTP handle ignored transition {} -> {}", self.state, next);
        }
    }

    /// Stop (if owner) and free the sockets.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PtpHandle {
    fn drop(&mut self) {
        self.stop();
        if self.ports.take().is_some() {
            tracing::debug!("PTP ports released");
        }
    }
}
