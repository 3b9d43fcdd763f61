//! Endpoint specifications and the scheme registry that parses them.
//!
//! An endpoint names where SCGI requests go:
//!
//! | Spec | Endpoint |
//! |------|----------|
//! | `localhost:5000`, `scgi://localhost:5000/` | TCP |
//! | `/tmp/rpc.sock`, `scgi:/tmp/rpc.sock`, `scgi:///tmp/rpc.sock` | UNIX socket |
//! | `~/rpc.sock`, `scgi:~/rpc.sock` | UNIX socket in the home directory |
//! | `scgi+ssh://user@host:22/~/rpc.sock` | UNIX socket on `host`, reached over SSH |
//!
//! Resolution happens once; the resulting [`Endpoint`] is plain data and can
//! be reused for any number of requests.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;

use http::uri::Authority;
use thiserror::Error;

use crate::transport::{LocalTransport, SshTransport, Transport};

/// An endpoint specification that cannot be used.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UrlError {
    /// The scheme is not in the registry.
    #[error("unsupported scheme {scheme:?} in {spec:?}")]
    UnknownScheme {
        /// The scheme that was found.
        scheme: String,
        /// The full endpoint specification.
        spec: String,
    },

    /// The specification is not in any recognised form.
    #[error("malformed endpoint {spec:?}: {reason}")]
    Malformed {
        /// The full endpoint specification.
        spec: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The specification has no `scheme://` and is not a socket path.
    #[error("no scheme in {0:?}")]
    MissingScheme(String),

    /// A TCP endpoint has no port.
    #[error("no port given in {0:?}")]
    MissingPort(String),

    /// An SSH endpoint has no remote socket path.
    #[error("no remote socket path given in {0:?}")]
    MissingPath(String),

    /// An SSH login does not survive being rebuilt from its parts.
    #[error("ambiguous SSH login {found:?}, expected {canonical:?}")]
    AmbiguousLogin {
        /// The authority as written.
        found: String,
        /// The authority rebuilt from user, host and port.
        canonical: String,
    },

    /// A remote socket path holds characters the remote shell would interpret.
    #[error("unsafe remote socket path {0:?}")]
    UnsafeRemotePath(String),

    /// `~/` was used but no home directory is known.
    #[error("cannot expand {0:?}: no home directory")]
    NoHomeDirectory(String),

    /// The host name could not be looked up.
    #[error("cannot resolve {host:?}: {source}")]
    Unresolvable {
        /// The host name.
        host: String,
        /// The lookup failure.
        #[source]
        source: io::Error,
    },

    /// The host name resolved to no usable address.
    #[error("{0:?} resolved to no address")]
    NoAddress(String),

    /// The host name resolved to more than one address.
    #[error("{host:?} is ambiguous, resolves to {addrs:?}")]
    Ambiguous {
        /// The host name.
        host: String,
        /// Every address it resolved to.
        addrs: Vec<SocketAddr>,
    },
}

/// A socket on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    /// A TCP socket, with the host name as written and its resolved address.
    Tcp {
        /// Host as given in the endpoint specification.
        host: String,
        /// The single address the host resolved to.
        addr: SocketAddr,
    },
    /// A UNIX domain socket.
    Unix(PathBuf),
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddr::Tcp { host, addr } => write!(f, "scgi://{}:{}/", host, addr.port()),
            LocalAddr::Unix(path) => write!(f, "scgi://{}", path.display()),
        }
    }
}

/// A UNIX domain socket on a remote machine, reached with `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Remote user name, if given.
    pub user: Option<String>,
    /// Remote host.
    pub host: String,
    /// SSH port, if not the default.
    pub port: Option<u16>,
    /// Socket path on the remote machine. Relative paths are relative to the
    /// remote home directory.
    pub socket: String,
}

impl SshTarget {
    /// The `[user@]host` argument for `ssh`.
    pub fn login(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scgi+ssh://{}", self.login())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if self.socket.starts_with('/') {
            write!(f, "{}", self.socket)
        } else {
            write!(f, "/~/{}", self.socket)
        }
    }
}

/// A resolved endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A TCP or UNIX socket on this machine.
    Local(LocalAddr),
    /// A UNIX socket on another machine.
    Ssh(SshTarget),
}

impl Endpoint {
    /// Builds the transport that delivers requests to this endpoint.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Endpoint::Local(addr) => Arc::new(LocalTransport::new(addr.clone())),
            Endpoint::Ssh(target) => Arc::new(SshTransport::new(target.clone())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(addr) => addr.fmt(f),
            Endpoint::Ssh(target) => target.fmt(f),
        }
    }
}

/// A URL split into the parts a scheme parser needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    /// The whole specification, for error messages.
    pub spec: &'a str,
    /// The scheme, without `://`.
    pub scheme: &'a str,
    /// Everything between `://` and the next `/`.
    pub authority: &'a str,
    /// The rest, starting with `/` unless empty.
    pub path: &'a str,
}

/// Turns the parts of a URL into an endpoint.
pub type SchemeParser = fn(&UrlParts<'_>) -> Result<Endpoint, UrlError>;

/// A fixed table of URL schemes and their parsers.
#[derive(Debug, Clone, Copy)]
pub struct Schemes {
    schemes: &'static [(&'static str, SchemeParser)],
}

/// The schemes understood by default: `scgi` and `scgi+ssh`.
pub static STANDARD_SCHEMES: Schemes =
    Schemes::new(&[("scgi", parse_scgi), ("scgi+ssh", parse_scgi_ssh)]);

impl Schemes {
    /// Creates a registry from `(scheme, parser)` pairs.
    pub const fn new(schemes: &'static [(&'static str, SchemeParser)]) -> Self {
        Schemes { schemes }
    }

    fn parser(&self, scheme: &str) -> Option<SchemeParser> {
        self.schemes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(scheme))
            .map(|(_, parser)| *parser)
    }

    /// Resolves an endpoint specification.
    ///
    /// A specification that has no scheme and is not a socket path is tried
    /// once more as a bare `host:port`. Errors always quote `spec` as given.
    pub fn resolve(&self, spec: &str) -> Result<Endpoint, UrlError> {
        let spec = spec.trim();
        let endpoint = match self.parse(spec, spec) {
            Err(UrlError::MissingScheme(_)) => self.parse(&format!("scgi://{}", spec), spec)?,
            result => result?,
        };
        tracing::debug!(spec, %endpoint, "resolved endpoint");
        Ok(endpoint)
    }

    /// Parses `url`, naming `spec` in errors.
    fn parse(&self, url: &str, spec: &str) -> Result<Endpoint, UrlError> {
        if let Some(path) = unix_path(url, spec)? {
            return Ok(Endpoint::Local(LocalAddr::Unix(expand_home(spec, path)?)));
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| UrlError::MissingScheme(spec.to_owned()))?;
        let (authority, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, ""),
        };
        let parts = UrlParts {
            spec,
            scheme,
            authority,
            path,
        };

        let parser = self.parser(scheme).ok_or_else(|| UrlError::UnknownScheme {
            scheme: scheme.to_owned(),
            spec: spec.to_owned(),
        })?;
        parser(&parts)
    }
}

/// Resolves an endpoint specification with [`STANDARD_SCHEMES`].
///
/// ```
/// use scgi_xmlrpc::endpoint::{resolve, Endpoint, LocalAddr};
///
/// let endpoint = resolve("scgi:///tmp/rpc.sock").unwrap();
/// assert_eq!(endpoint, Endpoint::Local(LocalAddr::Unix("/tmp/rpc.sock".into())));
/// ```
pub fn resolve(spec: &str) -> Result<Endpoint, UrlError> {
    STANDARD_SCHEMES.resolve(spec)
}

/// Resolves an endpoint specification and builds its transport.
pub fn resolve_transport(spec: &str) -> Result<Arc<dyn Transport>, UrlError> {
    Ok(resolve(spec)?.transport())
}

/// Recognises the forms that name a local UNIX socket directly.
///
/// `scgi:` followed by anything but `//`, a path or a port is an error.
fn unix_path<'u>(url: &'u str, spec: &str) -> Result<Option<&'u str>, UrlError> {
    let is_path = |p: &str| p.starts_with('/') || p.starts_with("~/");
    let path = match strip_scheme(url, "scgi:") {
        Some(rest) => match rest.strip_prefix("//") {
            Some(path) => path,
            // `scgi:5000` is host "scgi", port 5000.
            None if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) => return Ok(None),
            None if is_path(rest) => rest,
            None => {
                return Err(UrlError::Malformed {
                    spec: spec.to_owned(),
                    reason: "socket path must be absolute or start with ~/",
                })
            }
        },
        None => url,
    };
    Ok(is_path(path).then_some(path))
}

/// Strips `prefix` from `url`, ignoring ASCII case.
fn strip_scheme<'u>(url: &'u str, prefix: &str) -> Option<&'u str> {
    url.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &url[prefix.len()..])
}

fn expand_home(spec: &str, path: &str) -> Result<PathBuf, UrlError> {
    match path.strip_prefix("~/") {
        Some(relative) => home::home_dir()
            .map(|home| home.join(relative))
            .ok_or_else(|| UrlError::NoHomeDirectory(spec.to_owned())),
        None => Ok(PathBuf::from(path)),
    }
}

fn parse_authority(parts: &UrlParts<'_>) -> Result<Authority, UrlError> {
    parts
        .authority
        .parse::<Authority>()
        .map_err(|_| UrlError::Malformed {
            spec: parts.spec.to_owned(),
            reason: "invalid host or port",
        })
}

fn parse_scgi(parts: &UrlParts<'_>) -> Result<Endpoint, UrlError> {
    if parts.authority.is_empty() {
        // Only reached for paths `unix_path` does not accept.
        return Err(UrlError::Malformed {
            spec: parts.spec.to_owned(),
            reason: "socket path must be absolute or start with ~/",
        });
    }

    if parts.authority.contains('@') {
        return Err(UrlError::Malformed {
            spec: parts.spec.to_owned(),
            reason: "scgi URLs take no user name",
        });
    }
    let authority = parse_authority(parts)?;
    let port = authority
        .port_u16()
        .ok_or_else(|| UrlError::MissingPort(parts.spec.to_owned()))?;
    if authority.as_str() != format!("{}:{}", authority.host(), port) {
        return Err(UrlError::Malformed {
            spec: parts.spec.to_owned(),
            reason: "invalid host or port",
        });
    }

    let host = authority.host().to_owned();
    let addr = resolve_host(&host, port)?;
    Ok(Endpoint::Local(LocalAddr::Tcp { host, addr }))
}

/// Looks up `host` and insists on a single answer.
///
/// Only IPv4 addresses count unless the host is an IPv6 literal.
fn resolve_host(host: &str, port: u16) -> Result<SocketAddr, UrlError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let want_v6 = matches!(bare.parse::<IpAddr>(), Ok(IpAddr::V6(_)));

    let addrs: BTreeSet<SocketAddr> = (bare, port)
        .to_socket_addrs()
        .map_err(|source| UrlError::Unresolvable {
            host: host.to_owned(),
            source,
        })?
        .filter(|addr| addr.is_ipv6() == want_v6)
        .collect();

    let mut iter = addrs.iter();
    match (iter.next(), iter.next()) {
        (Some(addr), None) => Ok(*addr),
        (None, _) => Err(UrlError::NoAddress(host.to_owned())),
        (Some(_), Some(_)) => Err(UrlError::Ambiguous {
            host: host.to_owned(),
            addrs: addrs.into_iter().collect(),
        }),
    }
}

fn parse_scgi_ssh(parts: &UrlParts<'_>) -> Result<Endpoint, UrlError> {
    let user = match parts.authority.rsplit_once('@') {
        Some((user, _)) if user.is_empty() || user.contains(':') => {
            return Err(UrlError::Malformed {
                spec: parts.spec.to_owned(),
                reason: "invalid SSH user name",
            })
        }
        Some((user, _)) => Some(user.to_owned()),
        None => None,
    };
    let authority = parse_authority(parts)?;
    let host = authority.host().to_owned();
    let port = authority.port_u16();

    let target = SshTarget {
        user,
        host,
        port,
        socket: remote_socket(parts)?,
    };

    let mut canonical = target.login();
    if let Some(port) = port {
        canonical.push_str(&format!(":{}", port));
    }
    if canonical != parts.authority {
        return Err(UrlError::AmbiguousLogin {
            found: parts.authority.to_owned(),
            canonical,
        });
    }

    Ok(Endpoint::Ssh(target))
}

/// Extracts the remote socket path; `/~/x` becomes the home-relative `x`.
fn remote_socket(parts: &UrlParts<'_>) -> Result<String, UrlError> {
    let socket = match parts.path.strip_prefix("/~/") {
        Some(relative) => relative,
        None => parts.path,
    };
    if socket.is_empty() || socket == "/" {
        return Err(UrlError::MissingPath(parts.spec.to_owned()));
    }

    let safe = |c: char| c.is_ascii_alphanumeric() || "/._-+~@%".contains(c);
    if !socket.chars().all(safe) {
        return Err(UrlError::UnsafeRemotePath(socket.to_owned()));
    }
    Ok(socket.to_owned())
}
