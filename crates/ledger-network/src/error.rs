//! Network error types.

use thiserror::Error;

/// Errors from the network service.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Underlying socket I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced peer is not connected.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Frame was not valid length-prefixed JSON.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Violated the hello handshake or another protocol expectation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `start` called while already listening.
    #[error("network service already running")]
    AlreadyRunning,

    /// The peer's outbound channel was dropped.
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NetworkError = io_err.into();
        assert!(format!("{}", err).contains("IO error"));
    }

    #[test]
    fn test_error_peer_not_found() {
        let err = NetworkError::PeerNotFound("n1".into());
        assert!(format!("{}", err).contains("peer not found"));
    }

    #[test]
    fn test_error_already_running() {
        let err = NetworkError::AlreadyRunning;
        assert!(format!("{}", err).contains("already running"));
    }

    #[test]
    fn test_error_channel_closed() {
        let err = NetworkError::ChannelClosed;
        assert!(format!("{}", err).contains("channel closed"));
    }
}
