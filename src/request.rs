//! Blocking SCGI requests and XML-RPC calls on top of them.

use std::error::Error as StdError;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use xmlrpc::{Request, Value};

use crate::client::{self, encode_payload, parse_response};
use crate::endpoint::resolve_transport;
use crate::transport::Transport;
use crate::Error;

/// Sends SCGI requests to one endpoint.
///
/// Each [`send`](SCGIRequest::send) is a complete exchange on a fresh
/// connection. The latency and response headers of the most recent exchange
/// are kept for inspection.
///
/// ```no_run
/// use scgi_xmlrpc::SCGIRequest;
///
/// let mut rtorrent = SCGIRequest::new("scgi+ssh://seedbox/~/rtorrent/.scgi_local")?;
/// let version = rtorrent.call("system.client_version", &[])?;
/// println!("{:?} in {:?}", version, rtorrent.latency());
/// # Ok::<(), scgi_xmlrpc::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SCGIRequest {
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
    legacy_i8: bool,
    latency: Option<Duration>,
    response_headers: Vec<(String, String)>,
}

impl SCGIRequest {
    /// Resolves `spec` and creates a client for it.
    pub fn new(spec: &str) -> Result<Self, Error> {
        Ok(SCGIRequest::with_transport(resolve_transport(spec)?))
    }

    /// Creates a client sending through an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        SCGIRequest {
            transport,
            headers: Vec::new(),
            legacy_i8: false,
            latency: None,
            response_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request, after `CONTENT_LENGTH` and
    /// `SCGI`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Rewrites `<i8>` tags to `<i4>` in responses before [`call`](Self::call)
    /// decodes them, for consumers that expect 32-bit integers.
    pub fn legacy_i8(mut self, enabled: bool) -> Self {
        self.legacy_i8 = enabled;
        self
    }

    /// Sends `payload` as the body of one SCGI request and returns the
    /// response body.
    ///
    /// The latency is recorded even when the exchange fails. Response headers
    /// are only kept when the response parses.
    pub fn send(&mut self, payload: &[u8]) -> Result<Bytes, Error> {
        self.response_headers.clear();
        let started = Instant::now();
        let result = encode_payload(payload, self.headers.as_slice())
            .map_err(Error::from)
            .and_then(|request| Ok(self.transport.send(&request)?));
        let latency = started.elapsed();
        self.latency = Some(latency);
        tracing::debug!(?latency, ok = result.is_ok(), "SCGI exchange finished");

        let response = parse_response(&result?)?;
        self.response_headers = response.headers;
        Ok(response.body)
    }

    /// Round-trip time of the most recent [`send`](Self::send).
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Headers of the most recent response, in the order received.
    pub fn response_headers(&self) -> &[(String, String)] {
        &self.response_headers
    }

    /// Looks up a header of the most recent response, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        client::header(&self.response_headers, name)
    }

    /// Calls an XML-RPC method and decodes its result.
    ///
    /// Faults reported by the server come back as [`Error::XmlRpc`].
    pub fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, Error> {
        let request = build_request(method, params);
        let mut exchange = Exchange {
            client: self,
            failure: None,
        };
        match request.call(&mut exchange) {
            Ok(value) => Ok(value),
            Err(err) => Err(exchange.failure.take().unwrap_or(Error::XmlRpc(err))),
        }
    }

    /// Calls an XML-RPC method and returns the response document unparsed.
    pub fn call_xml(&mut self, method: &str, params: &[Value]) -> Result<String, Error> {
        let mut xml = Vec::new();
        build_request(method, params).write_as_xml(&mut xml)?;
        let body = self.send(&xml)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn build_request<'a>(method: &'a str, params: &[Value]) -> Request<'a> {
    params
        .iter()
        .cloned()
        .fold(Request::new(method), |request, param| request.arg(param))
}

/// Lets the XML-RPC layer drive an [`SCGIRequest`] while keeping the typed
/// error of a failed exchange.
struct Exchange<'r> {
    client: &'r mut SCGIRequest,
    failure: Option<Error>,
}

impl xmlrpc::Transport for &mut Exchange<'_> {
    type Stream = Cursor<Vec<u8>>;

    fn transmit(
        self,
        request: &Request<'_>,
    ) -> Result<Self::Stream, Box<dyn StdError + Send + Sync>> {
        let mut xml = Vec::new();
        request.write_as_xml(&mut xml)?;

        match self.client.send(&xml) {
            Ok(body) if self.client.legacy_i8 => {
                let fixed = downgrade_i8_tags(&String::from_utf8_lossy(&body));
                Ok(Cursor::new(fixed.into_bytes()))
            }
            Ok(body) => Ok(Cursor::new(body.to_vec())),
            Err(err) => {
                let message = err.to_string();
                self.failure = Some(err);
                Err(message.into())
            }
        }
    }
}

/// Rewrites `<i8>` and `</i8>` tags to their `<i4>` equivalents.
///
/// ```
/// use scgi_xmlrpc::request::downgrade_i8_tags;
///
/// assert_eq!(downgrade_i8_tags("<value><i8>7</i8></value>"), "<value><i4>7</i4></value>");
/// ```
pub fn downgrade_i8_tags(xml: &str) -> String {
    xml.replace("<i8>", "<i4>").replace("</i8>", "</i4>")
}

/// Calls `method` on the XML-RPC server at `endpoint` and decodes the result.
pub fn scgi_request(endpoint: &str, method: &str, params: &[Value]) -> Result<Value, Error> {
    SCGIRequest::new(endpoint)?.call(method, params)
}

/// Calls `method` on the XML-RPC server at `endpoint` and returns the raw
/// response document.
pub fn scgi_request_xml(endpoint: &str, method: &str, params: &[Value]) -> Result<String, Error> {
    SCGIRequest::new(endpoint)?.call_xml(method, params)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;
    use crate::transport::TransportError;

    #[derive(Debug)]
    enum Reply {
        Respond(Vec<u8>),
        Refuse,
    }

    #[derive(Debug)]
    struct MockTransport {
        reply: Reply,
        requests: Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(MockTransport {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> Vec<u8> {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, payload: &[u8]) -> Result<Bytes, TransportError> {
            self.requests.lock().unwrap().push(payload.to_vec());
            match &self.reply {
                Reply::Respond(response) => Ok(Bytes::from(response.clone())),
                Reply::Refuse => Err(TransportError::Connect {
                    endpoint: "scgi:///nowhere".to_owned(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                }),
            }
        }
    }

    fn xml_response(body: &str) -> Reply {
        Reply::Respond(
            format!(
                "Status: 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .into_bytes(),
        )
    }

    fn value_response(value: &str) -> Reply {
        xml_response(&format!(
            "<?xml version=\"1.0\"?><methodResponse><params><param><value>{}</value></param></params></methodResponse>",
            value
        ))
    }

    #[test]
    fn send_returns_body_and_keeps_headers() {
        let transport = MockTransport::new(Reply::Respond(
            b"Status: 200 OK\r\nContent-Length: 4\r\n\r\npong".to_vec(),
        ));
        let mut request = SCGIRequest::with_transport(transport.clone());

        assert_eq!(&request.send(b"ping").unwrap()[..], b"pong");
        assert!(request.latency().is_some());
        assert_eq!(
            request.response_headers(),
            [
                ("Status".to_owned(), "200 OK".to_owned()),
                ("Content-Length".to_owned(), "4".to_owned()),
            ]
        );
        assert_eq!(request.header("content-length"), Some("4"));
        assert_eq!(
            transport.last_request(),
            b"24:CONTENT_LENGTH\x004\x00SCGI\x001\x00,ping"
        );
    }

    #[test]
    fn send_includes_extra_headers() {
        let transport = MockTransport::new(Reply::Respond(b"\r\n\r\n".to_vec()));
        let mut request =
            SCGIRequest::with_transport(transport.clone()).with_header("REQUEST_METHOD", "POST");

        assert!(request.send(b"").unwrap().is_empty());
        assert_eq!(
            transport.last_request(),
            b"44:CONTENT_LENGTH\x000\x00SCGI\x001\x00REQUEST_METHOD\x00POST\x00,"
        );
    }

    #[test]
    fn send_records_latency_on_failure() {
        let mut request = SCGIRequest::with_transport(MockTransport::new(Reply::Refuse));
        assert!(matches!(
            request.send(b"ping"),
            Err(Error::Transport(TransportError::Connect { .. }))
        ));
        assert!(request.latency().is_some());
        assert!(request.response_headers().is_empty());
    }

    #[test]
    fn send_rejects_malformed_response() {
        let transport = MockTransport::new(Reply::Respond(b"pong".to_vec()));
        let mut request = SCGIRequest::with_transport(transport);
        assert!(matches!(request.send(b"ping"), Err(Error::Protocol(_))));
        assert!(request.latency().is_some());
    }

    #[test]
    fn call_decodes_result() {
        let transport = MockTransport::new(value_response("<i8>5000000000</i8>"));
        let mut request = SCGIRequest::with_transport(transport.clone());

        let value = request
            .call("d.size_bytes", &[Value::from("HASH")])
            .unwrap();
        assert_eq!(value, Value::Int64(5_000_000_000));

        let sent = String::from_utf8(transport.last_request()).unwrap();
        assert!(sent.contains("<methodName>d.size_bytes</methodName>"));
        assert!(sent.contains("HASH"));
    }

    #[test]
    fn call_with_legacy_i8_downgrades_tags() {
        let transport = MockTransport::new(value_response("<i8>42</i8>"));
        let mut request = SCGIRequest::with_transport(transport).legacy_i8(true);
        assert_eq!(request.call("get", &[]).unwrap(), Value::Int(42));
    }

    #[test]
    fn call_reports_fault() {
        let transport = MockTransport::new(xml_response(
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><int>-501</int></value></member>\
             <member><name>faultString</name><value><string>boom</string></value></member>\
             </struct></value></fault></methodResponse>",
        ));
        let mut request = SCGIRequest::with_transport(transport);
        assert!(matches!(request.call("fail", &[]), Err(Error::XmlRpc(_))));
    }

    #[test]
    fn call_keeps_transport_error() {
        let mut request = SCGIRequest::with_transport(MockTransport::new(Reply::Refuse));
        assert!(matches!(
            request.call("system.listMethods", &[]),
            Err(Error::Transport(TransportError::Connect { .. }))
        ));
    }

    #[test]
    fn call_xml_returns_raw_document() {
        let transport = MockTransport::new(value_response("<i8>42</i8>"));
        let mut request = SCGIRequest::with_transport(transport).legacy_i8(true);
        let xml = request.call_xml("get", &[]).unwrap();
        assert!(xml.contains("<i8>42</i8>"));
    }

    #[test]
    fn downgrade_rewrites_both_tags() {
        assert_eq!(
            downgrade_i8_tags("<i8>1</i8><i4>2</i4><i8>3</i8>"),
            "<i4>1</i4><i4>2</i4><i4>3</i4>"
        );
        assert_eq!(downgrade_i8_tags("<string>i8</string>"), "<string>i8</string>");
    }
}
