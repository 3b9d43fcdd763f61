use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};

use super::error::EncodeError;
use super::value::{Key, ToBencode, Value};

/// Encodes values into canonical bencode.
///
/// Text is converted to bytes with the encoder's character encoding
/// (UTF-8 unless configured otherwise), text dictionary keys included.
/// Dictionary keys are always written in ascending order of their encoded
/// bytes, so equal values produce equal bytes.
#[derive(Debug)]
pub struct Encoder {
    encoding: &'static Encoding,
    buf: BytesMut,
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

impl Encoder {
    /// Creates an encoder writing text as UTF-8.
    pub fn new() -> Self {
        Encoder::with_encoding(UTF_8)
    }

    /// Creates an encoder writing text in `encoding`.
    pub fn with_encoding(encoding: &'static Encoding) -> Self {
        Encoder {
            encoding,
            buf: BytesMut::new(),
        }
    }

    /// Appends `obj`, converted through [`ToBencode`], to the output.
    pub fn encode<T: ToBencode + ?Sized>(&mut self, obj: &T) -> Result<&mut Self, EncodeError> {
        let value = obj.to_bencode()?;
        self.encode_value(&value)
    }

    /// Appends a [`Value`] to the output.
    pub fn encode_value(&mut self, value: &Value) -> Result<&mut Self, EncodeError> {
        match value {
            Value::Integer(i) => {
                self.buf.put_u8(b'i');
                // BigInt's Display is canonical: no leading zeros, no "-0".
                self.buf.put_slice(i.to_string().as_bytes());
                self.buf.put_u8(b'e');
            }
            Value::Bytes(b) => self.put_string(b),
            Value::Text(s) => {
                let raw = self.text(s)?;
                self.put_string(&raw);
            }
            Value::List(l) => {
                self.buf.put_u8(b'l');
                for item in l {
                    self.encode_value(item)?;
                }
                self.buf.put_u8(b'e');
            }
            Value::Dict(d) => {
                let mut entries = Vec::with_capacity(d.len());
                for (key, item) in d {
                    let raw = match key {
                        Key::Bytes(b) => Cow::Borrowed(&b[..]),
                        Key::Text(s) => self.text(s)?,
                    };
                    entries.push((raw, item));
                }
                // The map is ordered by UTF-8 bytes, which need not match
                // the order of the encoded keys.
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries.dedup_by(|later, earlier| later.0 == earlier.0);

                self.buf.put_u8(b'd');
                for (key, item) in entries {
                    self.put_string(&key);
                    self.encode_value(item)?;
                }
                self.buf.put_u8(b'e');
            }
        }
        Ok(self)
    }

    fn text<'t>(&self, s: &'t str) -> Result<Cow<'t, [u8]>, EncodeError> {
        let (raw, _, unmappable) = self.encoding.encode(s);
        if unmappable {
            return Err(EncodeError::Unrepresentable {
                text: s.to_owned(),
                encoding: self.encoding.name(),
            });
        }
        Ok(raw)
    }

    fn put_string(&mut self, raw: &[u8]) {
        self.buf.put_slice(raw.len().to_string().as_bytes());
        self.buf.put_u8(b':');
        self.buf.put_slice(raw);
    }

    /// Returns everything encoded so far.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encodes `obj` as canonical bencode, writing text as UTF-8.
///
/// ```
/// use std::collections::BTreeMap;
/// use scgi_xmlrpc::bencode::encode;
///
/// let mut person = BTreeMap::new();
/// person.insert("eyes", "blue");
/// assert_eq!(&encode(&person).unwrap()[..], b"d4:eyes4:bluee");
/// ```
pub fn encode<T: ToBencode + ?Sized>(obj: &T) -> Result<Bytes, EncodeError> {
    let mut encoder = Encoder::new();
    encoder.encode(obj)?;
    Ok(encoder.finish())
}

/// Encodes `obj` as canonical bencode, writing text in `encoding`.
pub fn encode_with<T: ToBencode + ?Sized>(
    obj: &T,
    encoding: &'static Encoding,
) -> Result<Bytes, EncodeError> {
    let mut encoder = Encoder::with_encoding(encoding);
    encoder.encode(obj)?;
    Ok(encoder.finish())
}
