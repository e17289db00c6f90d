//! SSH transport built on libssh2.
//!
//! libssh2 is blocking, so each invocation runs on the tokio blocking pool and the async side only
//! waits for it with an upper bound.

use core::time::Duration;
use std::{
    io::Read as _,
    net::{SocketAddr, TcpStream, ToSocketAddrs as _},
};

use futures::future::BoxFuture;
use secrecy::ExposeSecret as _;
use ssh2::{Channel, ExtendedData, Session};
use tokio::{task, time::timeout};
use tracing::{Instrument as _, debug, warn};

use super::{ConnectPhase, RemoteError, RemoteExecutor, SessionTarget, parse_private_key};

/// Upper bound for TCP connect plus SSH handshake and authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for a whole invocation, including the remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// [`RemoteExecutor`] that opens one SSH session per command.
///
/// Host keys are not pinned: hosts are registered by operators, not discovered.
#[derive(Debug, Clone, Copy)]
pub struct SshExecutor {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_COMMAND_TIMEOUT)
    }
}

impl SshExecutor {
    #[must_use]
    pub const fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute<'call>(
        &'call self,
        target: &'call SessionTarget,
        command: &'call str,
    ) -> BoxFuture<'call, Result<String, RemoteError>> {
        let span = tracing::debug_span!("remote.exec", endpoint = %target.endpoint(), user = %target.user);
        Box::pin(
            async move {
                if target.address.trim().is_empty() {
                    return Err(RemoteError::InvalidTarget(
                        "host address is empty".to_string(),
                    ));
                }
                let endpoint = target.endpoint();
                let key_info = parse_private_key(target.private_key.expose_secret()).map_err(
                    |e| RemoteError::KeyParse {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    },
                )?;
                debug!(key = %key_info.label, encrypted = key_info.encrypted, %command, "Executing remote command");

                let owned_target = target.clone();
                let owned_command = command.to_owned();
                let connect_timeout = self.connect_timeout;
                let command_timeout = self.command_timeout;
                let blocking = task::spawn_blocking(move || {
                    run_blocking(&owned_target, &owned_command, connect_timeout, command_timeout)
                });

                match timeout(self.command_timeout, blocking).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(RemoteError::Command {
                        endpoint,
                        exit_status: None,
                        message: format!("remote session task failed: {join_err}"),
                        output: String::new(),
                    }),
                    Err(_elapsed) => {
                        // The blocking task keeps running until libssh2 times out on its own; the
                        // remote command is not signalled.
                        warn!(%endpoint, "Gave up waiting for remote command");
                        Err(RemoteError::Command {
                            endpoint,
                            exit_status: None,
                            message: format!(
                                "timed out after {}s waiting for command to finish",
                                self.command_timeout.as_secs()
                            ),
                            output: String::new(),
                        })
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// Disconnects the session on every exit path.
struct SessionGuard(Session);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.disconnect(None, "session finished", None) {
            debug!("SSH disconnect failed: {e}");
        }
    }
}

/// Closes the channel on every exit path.
struct ChannelGuard(Channel);

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            debug!("SSH channel close failed: {e}");
        }
    }
}

fn connect_error(endpoint: &str, phase: ConnectPhase, message: impl ToString) -> RemoteError {
    RemoteError::Connect {
        endpoint: endpoint.to_string(),
        phase,
        message: message.to_string(),
    }
}

fn open_tcp(target: &SessionTarget, connect_timeout: Duration) -> Result<TcpStream, RemoteError> {
    let endpoint = target.endpoint();
    let addrs: Vec<SocketAddr> = (target.address.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| connect_error(&endpoint, ConnectPhase::Resolve, e))?
        .collect();

    let mut last_err = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            connect_error(&endpoint, ConnectPhase::Timeout, e)
        }
        Some(e) => connect_error(&endpoint, ConnectPhase::Tcp, e),
        None => connect_error(&endpoint, ConnectPhase::Resolve, "no addresses resolved"),
    })
}

fn open_session(
    target: &SessionTarget,
    connect_timeout: Duration,
) -> Result<SessionGuard, RemoteError> {
    let endpoint = target.endpoint();
    let tcp = open_tcp(target, connect_timeout)?;

    let mut session =
        Session::new().map_err(|e| connect_error(&endpoint, ConnectPhase::Handshake, e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(millis(connect_timeout));
    session
        .handshake()
        .map_err(|e| connect_error(&endpoint, ConnectPhase::Handshake, e))?;
    let session = SessionGuard(session);

    session
        .0
        .userauth_pubkey_memory(&target.user, None, target.private_key.expose_secret(), None)
        .map_err(|e| connect_error(&endpoint, ConnectPhase::Authentication, e))?;
    if !session.0.authenticated() {
        return Err(connect_error(
            &endpoint,
            ConnectPhase::Authentication,
            "server did not accept the key",
        ));
    }
    Ok(session)
}

fn run_blocking(
    target: &SessionTarget,
    command: &str,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> Result<String, RemoteError> {
    let endpoint = target.endpoint();
    let session = open_session(target, connect_timeout)?;
    session.0.set_timeout(millis(command_timeout));

    let command_error = |message: String, output: &[u8], exit_status: Option<i32>| {
        RemoteError::Command {
            endpoint: endpoint.clone(),
            exit_status,
            message,
            output: String::from_utf8_lossy(output).into_owned(),
        }
    };

    let mut channel = ChannelGuard(
        session
            .0
            .channel_session()
            .map_err(|e| command_error(format!("failed to open channel: {e}"), &[], None))?,
    );
    channel
        .0
        .handle_extended_data(ExtendedData::Merge)
        .map_err(|e| command_error(format!("failed to merge stderr: {e}"), &[], None))?;
    channel
        .0
        .exec(command)
        .map_err(|e| command_error(format!("failed to start command: {e}"), &[], None))?;

    let mut output = Vec::new();
    if let Err(e) = channel.0.read_to_end(&mut output) {
        return Err(command_error(
            format!("channel failed mid-execution: {e}"),
            &output,
            None,
        ));
    }
    channel
        .0
        .wait_close()
        .map_err(|e| command_error(format!("channel failed to close: {e}"), &output, None))?;
    let status = channel
        .0
        .exit_status()
        .map_err(|e| command_error(format!("no exit status: {e}"), &output, None))?;

    if status != 0 {
        return Err(command_error(
            format!("exited with status {status}"),
            &output,
            Some(status),
        ));
    }
    Ok(String::from_utf8_lossy(&output).into_owned())
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
