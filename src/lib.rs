#![deny(rust_2018_idioms)]

//! A blocking SCGI client for talking XML-RPC to services such as rTorrent,
//! plus the bencode codec used by their metafiles.
//!
//! Endpoints are TCP sockets (`host:port`), local UNIX sockets
//! (`/path/to.sock`, `~/path/to.sock`), or UNIX sockets on another machine
//! reached through `ssh` and `socat` (`scgi+ssh://user@host/path/to.sock`).
//!
//! ```no_run
//! let version = scgi_xmlrpc::scgi_request("~/rtorrent/.scgi_local", "system.client_version", &[])?;
//! # Ok::<(), scgi_xmlrpc::Error>(())
//! ```

/// Bencode values, decoding, and canonical encoding.
pub mod bencode;

/// For an SCGI client: builds SCGI requests and parses raw responses. No I/O.
pub mod client;

/// Endpoint URLs and the scheme registry that resolves them.
pub mod endpoint;

mod error;

/// SCGI requests and XML-RPC calls against a resolved endpoint.
pub mod request;

/// Sockets and SSH tunnels that carry framed requests.
pub mod transport;

pub use endpoint::{resolve, Endpoint};
pub use error::Error;
pub use request::{scgi_request, scgi_request_xml, SCGIRequest};
pub use transport::Transport;

/// XML-RPC values, as accepted and returned by [`SCGIRequest::call`].
pub use xmlrpc::Value;
