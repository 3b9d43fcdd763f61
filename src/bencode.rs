//! Bencode encoding and decoding.
//!
//! Bencode is a length-prefixed, self-delimiting binary format with four
//! kinds of values:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte string | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` → {"foo": "bar"} |
//!
//! Encoding is canonical: dictionary keys are emitted in ascending byte
//! order and integers without leading zeros, so a value has exactly one
//! encoded form. Decoding accepts keys in any order.
//!
//! [`decode`] leaves every string as raw [`Value::Bytes`]; use [`decode_text`]
//! (UTF-8) or [`decode_with`] to get [`Value::Text`] for strings that are
//! valid in a character encoding. Either way dictionary keys stay raw. Text
//! and bytes with the same raw contents compare equal, so
//! `decode(&encode(&value)?)? == value` holds for text values too.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//! use scgi_xmlrpc::bencode::{decode, encode, Value};
//!
//! let mut person = BTreeMap::new();
//! person.insert("age", Value::from(25i64));
//! person.insert("eyes", Value::from("blue"));
//!
//! let data = encode(&person).unwrap();
//! assert_eq!(&data[..], b"d3:agei25e4:eyes4:bluee");
//!
//! let value = decode(&data).unwrap();
//! assert_eq!(value.get(b"eyes").and_then(Value::as_str), Some("blue"));
//! ```
//!
//! Custom types take part by implementing [`ToBencode`].

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_text, decode_with, Decoder};
pub use encode::{encode, encode_with, Encoder};
pub use error::{DecodeError, DecodeErrorKind, EncodeError};
pub use value::{Key, ToBencode, Value};

/// Reads a reader to its end and decodes the bencode document it holds.
pub fn read_from<R: Read>(mut reader: R) -> Result<Value, crate::Error> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(decode(&data)?)
}

/// Encodes `obj` and writes it to `writer`.
pub fn write_to<W: Write, T: ToBencode + ?Sized>(
    mut writer: W,
    obj: &T,
) -> Result<(), crate::Error> {
    let data = encode(obj)?;
    writer.write_all(&data)?;
    Ok(())
}

/// Decodes the bencode file at `path`.
pub fn read_file(path: impl AsRef<Path>) -> Result<Value, crate::Error> {
    read_from(fs::File::open(path)?)
}

/// Encodes `obj` into the file at `path`, replacing its contents.
pub fn write_file<T: ToBencode + ?Sized>(
    path: impl AsRef<Path>,
    obj: &T,
) -> Result<(), crate::Error> {
    let data = encode(obj)?;
    fs::write(path, data)?;
    Ok(())
}
