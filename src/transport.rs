//! Delivery of framed SCGI requests to an endpoint.
//!
//! A [`Transport`] takes a complete request and returns the complete,
//! unparsed response. Each call opens its own connection or subprocess and
//! releases it before returning.

use std::fmt;
use std::future::Future;
use std::io;

use bytes::Bytes;
use thiserror::Error;

mod local;
mod ssh;

pub use local::LocalTransport;
pub use ssh::SshTransport;

/// A failure to deliver a request or collect its response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The socket could not be connected.
    #[error("cannot connect to {endpoint}")]
    Connect {
        /// The endpoint that refused.
        endpoint: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// Reading or writing an established connection failed.
    #[error("I/O error talking to {endpoint}")]
    Io {
        /// The endpoint being talked to.
        endpoint: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// The tunnel command could not be started or waited for.
    #[error("cannot run `{command}`")]
    Spawn {
        /// The command line.
        command: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// The tunnel command exited unsuccessfully.
    #[error(
        "`{command}` failed with exit code {}: {}",
        .code.map_or_else(|| "none".to_owned(), |c| c.to_string()),
        .stderr.trim_end()
    )]
    Exit {
        /// The command line.
        command: String,
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Everything the command wrote to stderr.
        stderr: String,
    },

    /// The runtime driving the exchange could not be created.
    #[error("cannot start I/O runtime")]
    Runtime(#[source] io::Error),

    /// A blocking send was attempted on a thread that is driving an async
    /// runtime. Call the transport's async `exchange` there instead.
    #[error("cannot block on a request from inside an async runtime, use the async exchange instead")]
    InsideRuntime,
}

/// Sends a framed request and returns the raw response.
///
/// Implementations block the calling thread for the whole exchange. Called
/// from within an async runtime they fail with
/// [`TransportError::InsideRuntime`].
pub trait Transport: fmt::Debug + Send + Sync {
    /// Delivers `payload` and reads the response until the peer is done.
    fn send(&self, payload: &[u8]) -> Result<Bytes, TransportError>;
}

/// Runs `exchange` to completion on a fresh current-thread runtime.
fn block_on<F>(exchange: F) -> Result<Bytes, TransportError>
where
    F: Future<Output = Result<Bytes, TransportError>>,
{
    // Nesting runtimes panics in tokio.
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(TransportError::InsideRuntime);
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(TransportError::Runtime)?
        .block_on(exchange)
}
