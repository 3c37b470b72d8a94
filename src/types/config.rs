use std::time::Duration;

use crate::protocol::ptp::{PTP_EVENT_PORT, PTP_GENERAL_PORT};

/// Configuration for the PTP daemon and its presence beacon
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Local address or host name to bind (default: dual-stack wildcard)
    pub bind_address: Option<String>,

    /// Port for time-critical event messages (default: 319)
    pub event_port: u16,

    /// Port for general messages (default: 320)
    pub general_port: u16,

    /// Set `SO_REUSEADDR` on the PTP sockets (default: false)
    ///
    /// On Linux this lets a second process bind the same UDP ports, so the
    /// first binder no longer owns them exclusively.
    pub reuse_address: bool,

    /// Interval between Announce messages (default: 1 second)
    pub announce_interval: Duration,

    /// Interval between Signaling messages (default: 1 second)
    pub signaling_interval: Duration,

    /// Interval between Sync messages (default: 125ms)
    pub sync_interval: Duration,

    /// Interval between beacon timestamp refreshes (default: 5 seconds)
    pub beacon_refresh_interval: Duration,

    /// Name of the shared memory object holding the beacon (default: `/airptp`)
    pub beacon_name: String,

    /// Age after which a beacon is treated as absent (default: 30 seconds)
    pub beacon_stale_after: Duration,

    /// Receive buffer size per datagram (default: 1024)
    pub recv_buf_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            event_port: PTP_EVENT_PORT,
            general_port: PTP_GENERAL_PORT,
            reuse_address: false,
            announce_interval: Duration::from_secs(1),
            signaling_interval: Duration::from_secs(1),
            sync_interval: Duration::from_millis(125),
            beacon_refresh_interval: Duration::from_secs(5),
            beacon_name: crate::beacon::BEACON_NAME.to_string(),
            beacon_stale_after: Duration::from_secs(30),
            recv_buf_size: 1024,
        }
    }
}

impl DaemonConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> DaemonConfigBuilder {
        DaemonConfigBuilder::default()
    }
}

/// Builder for `DaemonConfig`
#[derive(Debug, Clone, Default)]
pub struct DaemonConfigBuilder {
    config: DaemonConfig,
}

impl DaemonConfigBuilder {
    /// Bind to a specific local address or host name
    #[must_use]
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = Some(address.into());
        self
    }

    /// Set the event and general ports (0 picks an ephemeral port)
    #[must_use]
    pub fn ports(mut self, event_port: u16, general_port: u16) -> Self {
        self.config.event_port = event_port;
        self.config.general_port = general_port;
        self
    }

    /// Enable `SO_REUSEADDR` on the PTP sockets
    #[must_use]
    pub fn reuse_address(mut self, enable: bool) -> Self {
        self.config.reuse_address = enable;
        self
    }

    /// Set the Announce interval
    #[must_use]
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.config.announce_interval = interval;
        self
    }

    /// Set the Signaling interval
    #[must_use]
    pub fn signaling_interval(mut self, interval: Duration) -> Self {
        self.config.signaling_interval = interval;
        self
    }

    /// Set the Sync interval
    #[must_use]
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Set the same interval for Announce, Signaling and Sync
    #[must_use]
    pub fn message_interval(self, interval: Duration) -> Self {
        self.announce_interval(interval)
            .signaling_interval(interval)
            .sync_interval(interval)
    }

    /// Set the beacon refresh interval
    #[must_use]
    pub fn beacon_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.beacon_refresh_interval = interval;
        self
    }

    /// Set the shared memory name of the beacon (must start with `/`)
    #[must_use]
    pub fn beacon_name(mut self, name: impl Into<String>) -> Self {
        self.config.beacon_name = name.into();
        self
    }

    /// Set the beacon staleness threshold
    #[must_use]
    pub fn beacon_stale_after(mut self, threshold: Duration) -> Self {
        self.config.beacon_stale_after = threshold;
        self
    }

    /// Set the receive buffer size
    #[must_use]
    pub fn recv_buf_size(mut self, size: usize) -> Self {
        self.config.recv_buf_size = size;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> DaemonConfig {
        self.config
    }
}
