use thiserror::Error;

use crate::NodeId;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Node {0} is not registered on the bus")]
    NotRegistered(NodeId),

    #[error("Send Error: {failed} of {attempted} deliveries failed")]
    SendFailed { failed: usize, attempted: usize },

    #[error("Runtime Error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation_and_display() {
        let io_err = SwarmError::Io(io::Error::new(io::ErrorKind::AddrInUse, "port taken"));
        assert!(io_err.to_string().contains("IO Error"));
        assert!(io_err.to_string().contains("port taken"));

        let cfg_err = SwarmError::Config("node count must be positive".to_string());
        assert!(cfg_err.to_string().contains("Configuration Error"));
        assert!(cfg_err.to_string().contains("node count"));

        let reg_err = SwarmError::NotRegistered(7);
        assert_eq!(reg_err.to_string(), "Node 7 is not registered on the bus");

        let send_err = SwarmError::SendFailed {
            failed: 2,
            attempted: 4,
        };
        assert_eq!(send_err.to_string(), "Send Error: 2 of 4 deliveries failed");
    }

    #[test]
    fn test_error_from_conversion() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let swarm_error: SwarmError = io_error.into();
        match swarm_error {
            SwarmError::Io(_) => {}
            _ => panic!("Should convert to Io error"),
        }
    }
}
