use std::io;

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_util::codec::{BytesCodec, FramedRead};

use super::{block_on, Transport, TransportError};
use crate::endpoint::LocalAddr;

/// Size of each read from the socket.
const READ_CAPACITY: usize = 32 * 1024;

/// Talks to a TCP or UNIX socket on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTransport {
    addr: LocalAddr,
}

impl LocalTransport {
    /// Creates a transport for `addr`.
    pub fn new(addr: LocalAddr) -> Self {
        LocalTransport { addr }
    }

    /// The socket this transport connects to.
    pub fn addr(&self) -> &LocalAddr {
        &self.addr
    }

    /// Connects, writes `payload`, and reads until the server closes the
    /// connection.
    pub async fn exchange(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        tracing::debug!(endpoint = %self.addr, "connecting");
        let result = match &self.addr {
            LocalAddr::Tcp { addr, .. } => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                round_trip(stream, payload).await
            }
            LocalAddr::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                round_trip(stream, payload).await
            }
        };
        result.map_err(|source| TransportError::Io {
            endpoint: self.addr.to_string(),
            source,
        })
    }

    fn connect_error(&self, source: io::Error) -> TransportError {
        TransportError::Connect {
            endpoint: self.addr.to_string(),
            source,
        }
    }
}

impl Transport for LocalTransport {
    fn send(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
        block_on(self.exchange(payload))
    }
}

async fn round_trip<S>(mut stream: S, payload: &[u8]) -> io::Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(payload).await?;
    stream.flush().await?;
    tracing::trace!(bytes = payload.len(), "request sent");

    let mut chunks = FramedRead::with_capacity(stream, BytesCodec::new(), READ_CAPACITY);
    let mut response = BytesMut::new();
    while let Some(chunk) = chunks.try_next().await? {
        response.extend_from_slice(&chunk);
    }
    tracing::trace!(bytes = response.len(), "response received");
    Ok(response.freeze())
}
