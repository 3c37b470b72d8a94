/// Lifecycle state of a [`PtpHandle`](crate::PtpHandle)
///
/// Transitions only move forward: `Unbound -> PortsBound -> Running -> Stopped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandleState {
    /// Nothing acquired yet
    #[default]
    Unbound,
    /// Both PTP ports are bound, daemon not started
    PortsBound,
    /// The daemon is running (owned or discovered)
    Running,
    /// The daemon was stopped; terminal
    Stopped,
}

impl HandleState {
    /// Check whether moving to `next` is a forward transition
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next > self
    }
}

impl std::fmt::Display for HandleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbound => write!(f, "unbound"),
            Self::PortsBound => write!(f, "ports-bound"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a handle relates to the daemon it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// This process bound the ports and runs the worker thread
    Owner,
    /// This process found a running daemon through its presence beacon
    Observer,
}
