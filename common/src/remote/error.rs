use core::fmt;

use thiserror::Error as ThisError;

/// Which step of session establishment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    Resolve,
    Tcp,
    Handshake,
    Authentication,
    Timeout,
}

impl fmt::Display for ConnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Resolve => "address resolution",
            Self::Tcp => "tcp connect",
            Self::Handshake => "ssh handshake",
            Self::Authentication => "authentication",
            Self::Timeout => "connect timeout",
        })
    }
}

/// Failure of a remote command invocation.
///
/// Messages carry the remote endpoint and the transport error text, never credential material.
#[derive(Debug, Clone, ThisError)]
pub enum RemoteError {
    #[error("invalid session target: {0}")]
    InvalidTarget(String),
    #[error("unusable private key for {endpoint}: {reason}")]
    KeyParse { endpoint: String, reason: String },
    #[error("connection to {endpoint} failed during {phase}: {message}")]
    Connect {
        endpoint: String,
        phase: ConnectPhase,
        message: String,
    },
    #[error("command on {endpoint} failed: {message}")]
    Command {
        endpoint: String,
        exit_status: Option<i32>,
        message: String,
        /// Output captured before the failure.
        output: String,
    },
}

impl RemoteError {
    /// Stable reason tag for callers that branch on the failure tier.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::InvalidTarget(_) => "validation_error",
            Self::KeyParse { .. } => "key_parse_error",
            Self::Connect { .. } => "connect_error",
            Self::Command { .. } => "command_error",
        }
    }

    /// Output the remote side produced before failing, if any was captured.
    #[must_use]
    pub fn partial_output(&self) -> Option<&str> {
        match *self {
            Self::Command { ref output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_endpoint_and_phase() {
        let err = RemoteError::Connect {
            endpoint: "10.0.0.4:22".to_string(),
            phase: ConnectPhase::Authentication,
            message: "Username/PublicKey combination invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection to 10.0.0.4:22 failed during authentication: Username/PublicKey combination invalid"
        );
        assert_eq!(err.kind(), "connect_error");
        assert_eq!(err.partial_output(), None);
    }

    #[test]
    fn command_error_keeps_partial_output() {
        let err = RemoteError::Command {
            endpoint: "host:2222".to_string(),
            exit_status: Some(1),
            message: "exited with status 1".to_string(),
            output: "Pulling web ... error".to_string(),
        };
        assert_eq!(err.kind(), "command_error");
        assert_eq!(err.partial_output(), Some("Pulling web ... error"));
    }
}
