use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{block_on, Transport, TransportError};
use crate::endpoint::SshTarget;

/// Reaches a UNIX socket on another machine by running `ssh` with `socat`
/// bridging the remote socket to the session's stdio.
///
/// The remote host must have `socat` installed, and `ssh` must be able to log
/// in without prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTransport {
    target: SshTarget,
    program: PathBuf,
}

impl SshTransport {
    /// Creates a transport that runs `ssh` from `PATH`.
    pub fn new(target: SshTarget) -> Self {
        SshTransport {
            target,
            program: PathBuf::from("ssh"),
        }
    }

    /// Runs `program` in place of `ssh`, with the same arguments.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// The remote socket this transport connects to.
    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// The full argument vector, program first.
    ///
    /// ```
    /// use scgi_xmlrpc::endpoint::SshTarget;
    /// use scgi_xmlrpc::transport::SshTransport;
    ///
    /// let transport = SshTransport::new(SshTarget {
    ///     user: Some("rtorrent".into()),
    ///     host: "seedbox".into(),
    ///     port: Some(2222),
    ///     socket: "/run/rtorrent.sock".into(),
    /// });
    /// assert_eq!(
    ///     transport.command_line().join(" "),
    ///     "ssh -T -p 2222 -- rtorrent@seedbox socat STDIO UNIX-CONNECT:/run/rtorrent.sock"
    /// );
    /// ```
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = vec![self.program.display().to_string(), "-T".to_owned()];
        if let Some(port) = self.target.port {
            argv.push("-p".to_owned());
            argv.push(port.to_string());
        }
        argv.push("--".to_owned());
        argv.push(self.target.login());
        argv.push("socat".to_owned());
        argv.push("STDIO".to_owned());
        argv.push(format!("UNIX-CONNECT:{}", self.target.socket));
        argv
    }

    /// Runs the tunnel, feeds it `payload`, and returns everything it prints.
    pub async fn exchange(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        let argv = self.command_line();
        let command = argv.join(" ");
        tracing::debug!(%command, "spawning tunnel");

        let mut child = Command::new(&self.program)
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: command.clone(),
                source,
            })?;

        let io_error = |source| TransportError::Io {
            endpoint: self.target.to_string(),
            source,
        };

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io_error(io::Error::other("child stdin is not piped")))?;
        let write = async move {
            let written = match stdin.write_all(payload).await {
                Ok(()) => stdin.shutdown().await,
                Err(err) => Err(err),
            };
            match written {
                // The exit status explains why the tunnel stopped reading.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        let ((), output) =
            tokio::try_join!(write, child.wait_with_output()).map_err(io_error)?;

        if !output.status.success() {
            return Err(TransportError::Exit {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        tracing::trace!(bytes = output.stdout.len(), "response received");
        Ok(Bytes::from(output.stdout))
    }
}

impl Transport for SshTransport {
    fn send(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        block_on(self.exchange(payload))
    }
}
