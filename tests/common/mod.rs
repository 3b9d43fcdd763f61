//! In-process SCGI servers for exercising the transports.

#![allow(dead_code)]

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::thread::{self, JoinHandle};

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, FramedRead};

const NUL: u8 = b'\0';

macro_rules! io_err {
    ($($arg:tt)*) => (Err(io::Error::new(io::ErrorKind::InvalidData, format!($($arg)+))))
}

/// A complete SCGI request as seen by the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedRequest {
    pub headers: Vec<(String, String)>,
    pub body: BytesMut,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Waits for the header netstring and `CONTENT_LENGTH` bytes of body before
/// yielding a request.
#[derive(Debug, Default)]
pub struct RequestCodec {}

impl Decoder for RequestCodec {
    type Item = ReceivedRequest;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ReceivedRequest>, io::Error> {
        let colon = match buf.iter().position(|b| *b == b':') {
            Some(colon) => colon,
            None => return Ok(None),
        };
        let size: usize = match std::str::from_utf8(&buf[..colon]).ok().and_then(|s| s.parse().ok()) {
            Some(size) => size,
            None => return io_err!("Header size is not an integer"),
        };
        let block_end = match (colon + 1).checked_add(size) {
            Some(end) => end,
            None => return io_err!("Header size is too large"),
        };
        if buf.len() <= block_end {
            return Ok(None);
        }
        if buf[block_end] != b',' {
            return io_err!("Missing ',' separating headers from content");
        }

        let block = &buf[colon + 1..block_end];
        if !block.is_empty() && block[block.len() - 1] != NUL {
            return io_err!("Header block does not end with NUL");
        }
        let mut strings = Vec::new();
        for raw in block.split(|b| *b == NUL) {
            match String::from_utf8(raw.to_vec()) {
                Ok(s) => strings.push(s),
                Err(_) => return io_err!("Header key or value is not a UTF-8 string"),
            }
        }
        // The block ends with NUL, so the final piece is always empty.
        strings.pop();
        if strings.len() % 2 != 0 {
            return io_err!("Header key without value");
        }
        let headers: Vec<(String, String)> = strings
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        let content_length: usize = match headers
            .iter()
            .find(|(key, _)| key == "CONTENT_LENGTH")
            .and_then(|(_, value)| value.parse().ok())
        {
            Some(length) => length,
            None => return io_err!("Missing or invalid CONTENT_LENGTH"),
        };
        if buf.len() - (block_end + 1) < content_length {
            return Ok(None);
        }

        buf.advance(block_end + 1);
        let body = buf.split_to(content_length);
        Ok(Some(ReceivedRequest { headers, body }))
    }
}

/// Formats a response the way SCGI servers do: headers, blank line, body.
pub fn http_response(body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "Status: 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Echoes the request body back as the response body.
pub fn echo(request: &ReceivedRequest) -> Vec<u8> {
    http_response(&request.body)
}

async fn handle<S, F>(stream: S, handler: &F) -> io::Result<ReceivedRequest>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&ReceivedRequest) -> Vec<u8>,
{
    let mut framed = FramedRead::new(stream, RequestCodec::default());
    let request = match framed.next().await {
        Some(request) => request?,
        None => return io_err!("Connection closed before a full request arrived"),
    };
    let mut stream = framed.into_inner();
    stream.write_all(&handler(&request)).await?;
    stream.shutdown().await?;
    Ok(request)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Serves `count` connections on a UNIX socket at `path`, then returns the
/// requests received.
pub fn serve_unix<F>(path: &Path, count: usize, handler: F) -> JoinHandle<Vec<ReceivedRequest>>
where
    F: Fn(&ReceivedRequest) -> Vec<u8> + Send + 'static,
{
    let listener = UnixListener::bind(path).unwrap();
    listener.set_nonblocking(true).unwrap();
    thread::spawn(move || {
        runtime().block_on(async move {
            let listener = tokio::net::UnixListener::from_std(listener).unwrap();
            let mut requests = Vec::new();
            for _ in 0..count {
                let (stream, _) = listener.accept().await.unwrap();
                requests.push(handle(stream, &handler).await.unwrap());
            }
            requests
        })
    })
}

/// Serves `count` connections on a loopback TCP port, then returns the
/// requests received.
pub fn serve_tcp<F>(count: usize, handler: F) -> (SocketAddr, JoinHandle<Vec<ReceivedRequest>>)
where
    F: Fn(&ReceivedRequest) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();
    let server = thread::spawn(move || {
        runtime().block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let mut requests = Vec::new();
            for _ in 0..count {
                let (stream, _) = listener.accept().await.unwrap();
                requests.push(handle(stream, &handler).await.unwrap());
            }
            requests
        })
    });
    (addr, server)
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
