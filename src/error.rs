use thiserror::Error;

/// Errors that reach the caller of the streaming subsystem.
///
/// Everything a connector hits at runtime (connect failures, bad frames,
/// dropped publishes) stays inside the connector loop and is only logged.
/// What remains here are configuration problems and the one-time broker
/// bind, which are fatal at startup.
#[derive(Debug, Error)]
pub enum StreamerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported broker address `{0}` (expected tcp://host:port or ipc://path)")]
    InvalidAddress(String),

    #[error("failed to bind broker at {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: zeromq::ZmqError,
    },

    #[error("already started")]
    AlreadyStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("broker socket: {0}")]
    Zmq(#[from] zeromq::ZmqError),
}

pub type Result<T> = std::result::Result<T, StreamerError>;
