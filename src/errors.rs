use thiserror::Error;

pub type Result<T> = std::result::Result<T, MountError>;

/// Error taxonomy for the mount control server.
///
/// Recoverable kinds (`HardwareUnavailable`, `Solve`) are swallowed and
/// logged at the loop boundaries; `InvalidArgument` is a programmer error
/// and propagates up to abort the requesting task.
#[derive(Debug, Error)]
pub enum MountError {
    /// Malformed or unknown client command. Logged, never replied to.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Recognized command with a bad value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A motor or camera did not attach or dropped off the bus.
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// The plate solver failed for this cycle.
    #[error("plate solve failed: {0}")]
    Solve(String),

    /// The requested target is below the horizon after frame mapping.
    #[error("target below horizon")]
    Unreachable,

    #[error("configuration error: {0}")]
    Config(String),

    /// A control loop reached an invalid state.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MountError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        MountError::InvalidArgument(msg.into())
    }

    pub fn hardware(msg: impl Into<String>) -> Self {
        MountError::HardwareUnavailable(msg.into())
    }
}
