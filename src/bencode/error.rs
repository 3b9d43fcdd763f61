use std::fmt;

use bytes::Bytes;
use thiserror::Error;

/// Number of input bytes quoted in a [`DecodeError`] message.
pub(crate) const EXCERPT_LEN: usize = 32;

/// What went wrong while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// Input ended before the value was complete.
    UnexpectedEnd,
    /// A string length prefix was not a plain decimal number.
    BadStringLength,
    /// An `i...e` integer was empty or not a decimal number.
    BadInteger,
    /// The lookahead byte does not start any bencode value.
    UnexpectedByte(u8),
    /// A dictionary key decoded to something other than a byte string.
    NonStringKey,
    /// Bytes remain after the top-level value.
    TrailingData,
    /// Lists and dictionaries are nested too deeply.
    NestingTooDeep,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::UnexpectedEnd => write!(f, "unexpected end of data"),
            DecodeErrorKind::BadStringLength => write!(f, "bad string length"),
            DecodeErrorKind::BadInteger => write!(f, "bad integer"),
            DecodeErrorKind::UnexpectedByte(b) => {
                write!(f, "format error, unexpected byte '{}'", b.escape_ascii())
            }
            DecodeErrorKind::NonStringKey => write!(f, "dictionary key is not a string"),
            DecodeErrorKind::TrailingData => write!(f, "trailing data"),
            DecodeErrorKind::NestingTooDeep => write!(f, "nesting too deep"),
        }
    }
}

/// Malformed bencode input.
///
/// Carries the byte offset where decoding stopped and a short excerpt of the
/// input starting there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} ({snippet}...)", snippet = .excerpt.escape_ascii())]
pub struct DecodeError {
    kind: DecodeErrorKind,
    offset: usize,
    excerpt: Bytes,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, data: &[u8], offset: usize) -> Self {
        let start = offset.min(data.len());
        let end = (start + EXCERPT_LEN).min(data.len());
        DecodeError {
            kind,
            offset,
            excerpt: Bytes::copy_from_slice(&data[start..end]),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Byte offset into the input where the failure was detected.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Up to 32 bytes of input starting at [`offset`](Self::offset).
    pub fn excerpt(&self) -> &[u8] {
        &self.excerpt
    }
}

/// A value that has no bencode representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The value's type has no bencode form.
    #[error("unsupported value of type {type_name}")]
    Unsupported {
        /// Rust type name of the offending value.
        type_name: &'static str,
    },

    /// A map key converted to something other than a byte string.
    #[error("dict key must be a byte string, found {kind}")]
    NonStringKey {
        /// Kind of value the key converted to.
        kind: &'static str,
    },

    /// Text holds characters the configured encoding cannot represent.
    #[error("text {text:?} cannot be represented in {encoding}")]
    Unrepresentable {
        /// The text that failed to convert.
        text: String,
        /// Name of the configured character encoding.
        encoding: &'static str,
    },
}
