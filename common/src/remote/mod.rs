//! Remote command execution against managed hosts.

mod error;
mod key;
mod ssh;

use alloc::sync::Arc;
use core::fmt;

use futures::future::BoxFuture;
use secrecy::SecretString;

pub use error::{ConnectPhase, RemoteError};
pub use key::{KeyParseError, PrivateKeyInfo, parse_private_key};
pub use ssh::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, SshExecutor};

/// Connection parameters for one remote session.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    /// Hostname or IP address of the remote machine.
    pub address: String,
    /// SSH port.
    pub port: u16,
    /// Login principal.
    pub user: String,
    /// PEM encoded private key, already decrypted.
    pub private_key: Arc<SecretString>,
}

impl SessionTarget {
    /// `address:port` form used in logs and error messages.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.endpoint())
    }
}

/// Runs a single shell command on a remote host and returns its combined output.
///
/// Implementations hold no per-call state; every invocation opens and tears down its own session.
pub trait RemoteExecutor: Send + Sync {
    /// Execute `command` on `target` to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] classified by the phase that failed.
    fn execute<'call>(
        &'call self,
        target: &'call SessionTarget,
        command: &'call str,
    ) -> BoxFuture<'call, Result<String, RemoteError>>;
}
