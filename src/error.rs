use std::io;

use thiserror::Error;

use crate::bencode::{DecodeError, EncodeError};
use crate::client::ProtocolError;
use crate::endpoint::UrlError;
use crate::transport::TransportError;

/// Any error returned by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed bencode input.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A value with no bencode representation.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// An unusable endpoint specification.
    #[error(transparent)]
    Url(#[from] UrlError),

    /// The request could not be delivered.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be framed or the response could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The XML-RPC response was malformed or reported a fault.
    #[error(transparent)]
    XmlRpc(#[from] xmlrpc::Error),

    /// Reading or writing local data failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
