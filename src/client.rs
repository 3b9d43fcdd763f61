use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const NUL: u8 = b'\0';

/// The sequence separating response headers from the response body.
const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// A malformed SCGI request or response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A request header cannot be framed.
    #[error("invalid request header {name:?}: {reason}")]
    InvalidHeader {
        /// The header name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The response has no blank line between headers and body.
    #[error("response has no header delimiter")]
    MissingDelimiter,

    /// The response headers are not UTF-8 text.
    #[error("response headers are not UTF-8")]
    NonUtf8Headers,

    /// A response header line is not `Name: Value`.
    #[error("malformed response header line {0:?}")]
    MalformedHeader(String),

    /// `Content-Length` disagrees with the body that was received.
    #[error("Content-Length is {declared:?} but the body has {actual} bytes")]
    ContentLength {
        /// The header value.
        declared: String,
        /// The length of the received body.
        actual: usize,
    },

    /// Reading or writing a framed stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A request body with the extra headers to send alongside it.
///
/// `CONTENT_LENGTH` and `SCGI` are always sent and should not be included in
/// `headers`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SCGIEnvelope {
    /// Extra headers, sent in order after the mandatory ones.
    pub headers: Vec<(String, String)>,
    /// The request body.
    pub body: Bytes,
}

/// A parsed SCGI response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SCGIResponse {
    /// Response headers in the order they were received.
    pub headers: Vec<(String, String)>,
    /// The response body.
    pub body: Bytes,
}

impl SCGIResponse {
    /// Looks up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

pub(crate) fn header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Encodes `text` as a netstring: `<length>:<text>,`.
pub fn encode_netstring(text: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    put_netstring(&mut buf, text);
    buf.freeze()
}

fn put_netstring(buf: &mut BytesMut, text: &[u8]) {
    let size = text.len().to_string();
    // Include ':' and ',' in buffer, not included in netstring size:
    buf.reserve(size.len() + 1 + text.len() + 1);
    buf.put_slice(size.as_bytes());
    buf.put_u8(b':');
    buf.put_slice(text);
    buf.put_u8(b',');
}

/// Encodes header pairs as an SCGI header block: each name and value
/// followed by a NUL.
pub fn encode_headers<K, V>(headers: &[(K, V)]) -> Result<Bytes, ProtocolError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    // Calculate size needed for header block
    let mut sum_header_size: usize = 0;
    for (k, v) in headers {
        let (k, v) = (k.as_ref(), v.as_ref());
        // While we're iterating over the keys/values, do some basic validation per the
        // SCGI protocol spec.
        if k.is_empty() {
            return Err(ProtocolError::InvalidHeader {
                name: String::new(),
                reason: "name cannot be empty",
            });
        }
        if k.as_bytes().contains(&NUL) || v.as_bytes().contains(&NUL) {
            return Err(ProtocolError::InvalidHeader {
                name: k.to_owned(),
                reason: "name and value cannot contain NUL",
            });
        }
        // Include 2 x NUL in size:
        sum_header_size += k.len() + 1 + v.len() + 1;
    }

    let mut buf = BytesMut::with_capacity(sum_header_size);
    for (k, v) in headers {
        buf.put_slice(k.as_ref().as_bytes());
        buf.put_u8(NUL);
        buf.put_slice(v.as_ref().as_bytes());
        buf.put_u8(NUL);
    }
    Ok(buf.freeze())
}

fn put_payload<K, V>(
    buf: &mut BytesMut,
    body: &[u8],
    extra_headers: &[(K, V)],
) -> Result<(), ProtocolError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let content_length = body.len().to_string();
    let mut block = BytesMut::from(
        &encode_headers(&[("CONTENT_LENGTH", content_length.as_str()), ("SCGI", "1")])?[..],
    );
    block.put(encode_headers(extra_headers)?);

    put_netstring(buf, &block);
    buf.reserve(body.len());
    buf.put_slice(body);
    Ok(())
}

/// Wraps `body` in an SCGI request.
///
/// The header block holds `CONTENT_LENGTH`, `SCGI=1` and then
/// `extra_headers`, and is sent as a netstring ahead of the body.
///
/// ```
/// use scgi_xmlrpc::client::encode_payload;
///
/// let request = encode_payload(b"*", &[("REQUEST_METHOD", "POST")]).unwrap();
/// assert_eq!(
///     &request[..],
///     b"44:CONTENT_LENGTH\x001\x00SCGI\x001\x00REQUEST_METHOD\x00POST\x00,*"
/// );
/// ```
pub fn encode_payload<K, V>(body: &[u8], extra_headers: &[(K, V)]) -> Result<Bytes, ProtocolError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut buf = BytesMut::new();
    put_payload(&mut buf, body, extra_headers)?;
    Ok(buf.freeze())
}

/// Parses response header lines of the form `Name: Value`, skipping blank
/// lines.
pub fn parse_headers(text: &str) -> Result<Vec<(String, String)>, ProtocolError> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_once(": ")
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_owned()))
        })
        .collect()
}

/// Splits a raw SCGI response into headers and body.
///
/// Servers must separate headers from the body with `\r\n\r\n`. A
/// `Content-Length` header, when present, has to match the body received.
pub fn parse_response(response: &[u8]) -> Result<SCGIResponse, ProtocolError> {
    let split = response
        .windows(HEADER_DELIMITER.len())
        .position(|window| window == HEADER_DELIMITER)
        .ok_or(ProtocolError::MissingDelimiter)?;

    let head = std::str::from_utf8(&response[..split]).map_err(|_| ProtocolError::NonUtf8Headers)?;
    let headers = parse_headers(head)?;
    let body = Bytes::copy_from_slice(&response[split + HEADER_DELIMITER.len()..]);

    if let Some(declared) = header(&headers, "Content-Length") {
        if declared.trim().parse::<usize>().ok() != Some(body.len()) {
            return Err(ProtocolError::ContentLength {
                declared: declared.to_owned(),
                actual: body.len(),
            });
        }
    }

    Ok(SCGIResponse { headers, body })
}

/// A `Codec` implementation that creates SCGI requests and parses SCGI
/// responses, for callers driving their own framed streams.
///
/// The response is only complete once the server closes the connection, so
/// the decoder yields its single item at end of stream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SCGICodec {}

impl SCGICodec {
    /// Returns a `SCGICodec` for creating SCGI-format requests.
    pub fn new() -> SCGICodec {
        SCGICodec {}
    }
}

impl Decoder for SCGICodec {
    type Item = SCGIResponse;
    type Error = ProtocolError;

    fn decode(&mut self, _buf: &mut BytesMut) -> Result<Option<SCGIResponse>, ProtocolError> {
        // Keep buffering until the server hangs up.
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<SCGIResponse>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let response = buf.split();
        parse_response(&response).map(Some)
    }
}

/// Writes a complete SCGI request: header netstring followed by the body.
impl Encoder<SCGIEnvelope> for SCGICodec {
    type Error = ProtocolError;

    fn encode(&mut self, data: SCGIEnvelope, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_payload(buf, &data.body, data.headers.as_slice())
    }
}
