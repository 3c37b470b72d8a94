use std::io;
use thiserror::Error;

use crate::beacon::BeaconError;
use crate::types::HandleState;

/// Errors that can occur while binding, starting or discovering a PTP daemon
#[derive(Debug, Error)]
pub enum AirPtpError {
    // ===== Setup Errors =====
    /// Could not bind one of the PTP ports
    #[error("could not bind PTP port {port}: {source}")]
    Bind {
        /// The port that failed to bind
        port: u16,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// The message gateway refused to initialize
    #[error("message gateway initialization failed: {source}")]
    Init {
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// The worker thread could not be spawned or died during startup
    #[error("PTP worker thread failed: {source}")]
    Thread {
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// An OS resource (runtime, descriptor, registration) could not be acquired
    #[error("{context}: {source}")]
    Resource {
        /// What was being acquired
        context: &'static str,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// The presence beacon could not be published
    #[error("presence beacon error: {0}")]
    Beacon(#[from] BeaconError),

    // ===== State Errors =====
    /// Operation not valid in the handle's current state
    #[error("invalid state: expected {expected:?}, was {actual:?}")]
    InvalidState {
        /// State the operation requires
        expected: HandleState,
        /// State the handle is in
        actual: HandleState,
    },

    /// Operation requires a handle that owns the daemon
    #[error("handle does not own the PTP daemon")]
    NotOwner,

    /// The daemon is not running
    #[error("PTP daemon is not running")]
    NotRunning,

    // ===== Discovery Errors =====
    /// No live, compatible daemon was found on this host
    #[error("no running PTP daemon found")]
    NotFound,
}

impl AirPtpError {
    /// Check if retrying after fixing the environment may succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. }
                | Self::Init { .. }
                | Self::Thread { .. }
                | Self::Resource { .. }
                | Self::Beacon(_)
        )
    }

    /// Check if this is the normal "no daemon on this host" outcome
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type for airptp operations
pub type Result<T> = std::result::Result<T, AirPtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AirPtpError::Bind {
            port: 319,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(
            err.to_string(),
            "could not bind PTP port 319: permission denied"
        );
        assert_eq!(
            AirPtpError::NotFound.to_string(),
            "no running PTP daemon found"
        );
    }

    #[test]
    fn test_error_is_recoverable() {
        let bind = AirPtpError::Bind {
            port: 320,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_recoverable());
        assert!(AirPtpError::Beacon(BeaconError::AlreadyExists).is_recoverable());

        assert!(!AirPtpError::NotRunning.is_recoverable());
        assert!(!AirPtpError::NotOwner.is_recoverable());
        assert!(
            !AirPtpError::InvalidState {
                expected: HandleState::PortsBound,
                actual: HandleState::Stopped,
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(AirPtpError::NotFound.is_not_found());
        assert!(!AirPtpError::NotRunning.is_not_found());
    }

    #[test]
    fn test_error_from_beacon() {
        let err: AirPtpError = BeaconError::PermissionDenied.into();
        assert!(matches!(
            err,
            AirPtpError::Beacon(BeaconError::PermissionDenied)
        ));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AirPtpError>();
    }
}
