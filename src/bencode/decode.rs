use std::collections::BTreeMap;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use num_bigint::BigInt;

use super::error::{DecodeError, DecodeErrorKind};
use super::value::{Key, Value};

const MAX_DEPTH: usize = 512;

/// Decodes bencode values from a byte slice.
///
/// Without an encoding every string comes back as [`Value::Bytes`]. With one,
/// strings that decode cleanly come back as [`Value::Text`] and the rest stay
/// raw, so the same decoder can yield either for different inputs.
///
/// # Examples
///
/// ```
/// use scgi_xmlrpc::bencode::{Decoder, Value};
///
/// let decoder = Decoder::new(b"l2:\xc3\xa91:\x81e").with_encoding(encoding_rs::UTF_8);
/// let value = decoder.decode_all().unwrap();
/// assert_eq!(
///     value,
///     Value::List(vec![Value::from("\u{e9}"), Value::bytes(&b"\x81"[..])])
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
    encoding: Option<&'static Encoding>,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `data` which leaves strings as raw bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Decoder {
            data,
            offset: 0,
            encoding: None,
        }
    }

    /// Attempts to decode strings as text in `encoding`.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Current position in the input.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Decodes the next value, leaving any data after it unread.
    pub fn decode(&mut self) -> Result<Value, DecodeError> {
        self.value(0)
    }

    /// Decodes one value and requires it to span the rest of the input.
    pub fn decode_all(mut self) -> Result<Value, DecodeError> {
        let value = self.value(0)?;
        if self.offset != self.data.len() {
            return Err(self.error(DecodeErrorKind::TrailingData));
        }
        Ok(value)
    }

    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.data, self.offset)
    }

    fn error_at_end(&self) -> DecodeError {
        DecodeError::new(DecodeErrorKind::UnexpectedEnd, self.data, self.data.len())
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.data
            .get(self.offset)
            .copied()
            .ok_or_else(|| self.error(DecodeErrorKind::UnexpectedEnd))
    }

    fn value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        match self.peek()? {
            b'0'..=b'9' => self.string(),
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            other => Err(self.error(DecodeErrorKind::UnexpectedByte(other))),
        }
    }

    fn raw_string(&mut self) -> Result<&'a [u8], DecodeError> {
        let data = self.data;
        let rest = &data[self.offset..];
        let colon = rest
            .iter()
            .position(|b| !b.is_ascii_digit())
            .ok_or_else(|| self.error_at_end())?;
        if rest[colon] != b':' {
            return Err(self.error(DecodeErrorKind::BadStringLength));
        }

        // All ASCII digits, so only overflow can fail here.
        let length: usize = std::str::from_utf8(&rest[..colon])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error(DecodeErrorKind::BadStringLength))?;

        let start = self.offset + colon + 1;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| self.error(DecodeErrorKind::UnexpectedEnd))?;
        self.offset = end;
        Ok(&data[start..end])
    }

    fn string(&mut self) -> Result<Value, DecodeError> {
        let raw = self.raw_string()?;
        let text = self.encoding.and_then(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(raw)
                .map(|text| text.into_owned())
        });
        Ok(match text {
            Some(text) => Value::Text(text),
            None => Value::Bytes(Bytes::copy_from_slice(raw)),
        })
    }

    fn integer(&mut self) -> Result<Value, DecodeError> {
        let start = self.offset + 1;
        let end = self.data[start..]
            .iter()
            .position(|b| *b == b'e')
            .map(|pos| start + pos)
            .ok_or_else(|| self.error_at_end())?;

        let digits = &self.data[start..end];
        let unsigned = match digits.first() {
            Some(b'-') | Some(b'+') => &digits[1..],
            _ => digits,
        };
        if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
            return Err(self.error(DecodeErrorKind::BadInteger));
        }

        let value = BigInt::parse_bytes(digits, 10)
            .ok_or_else(|| self.error(DecodeErrorKind::BadInteger))?;
        self.offset = end + 1;
        Ok(Value::Integer(value))
    }

    fn enter(&self, depth: usize) -> Result<usize, DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(self.error(DecodeErrorKind::NestingTooDeep));
        }
        Ok(depth + 1)
    }

    fn list(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let depth = self.enter(depth)?;
        self.offset += 1;

        let mut list = Vec::new();
        while self.peek()? != b'e' {
            list.push(self.value(depth)?);
        }
        self.offset += 1;
        Ok(Value::List(list))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let depth = self.enter(depth)?;
        self.offset += 1;

        let mut dict = BTreeMap::new();
        while self.peek()? != b'e' {
            // Keys stay raw so that text decoding never alters them.
            let key = match self.peek()? {
                b'0'..=b'9' => Key::Bytes(Bytes::copy_from_slice(self.raw_string()?)),
                _ => return Err(self.error(DecodeErrorKind::NonStringKey)),
            };
            let value = self.value(depth)?;
            // Later duplicates replace earlier ones.
            dict.insert(key, value);
        }
        self.offset += 1;
        Ok(Value::Dict(dict))
    }
}

/// Decodes a complete bencode document, leaving strings as raw bytes.
///
/// Trailing data after the top-level value is an error.
///
/// ```
/// use scgi_xmlrpc::bencode::{decode, Value};
///
/// assert_eq!(decode(b"i4e").unwrap(), Value::from(4i64));
/// assert!(decode(b"i4e ").is_err());
/// ```
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    Decoder::new(data).decode_all()
}

/// Decodes a complete bencode document, turning strings that are valid in
/// `encoding` into [`Value::Text`].
pub fn decode_with(data: &[u8], encoding: &'static Encoding) -> Result<Value, DecodeError> {
    Decoder::new(data).with_encoding(encoding).decode_all()
}

/// Decodes a complete bencode document, turning strings that are valid
/// UTF-8 into [`Value::Text`].
///
/// ```
/// use scgi_xmlrpc::bencode::{decode_text, Value};
///
/// let value = decode_text(b"l4:blue1:\xffe").unwrap();
/// let items = value.as_list().unwrap();
/// assert!(matches!(&items[0], Value::Text(s) if s == "blue"));
/// assert!(matches!(&items[1], Value::Bytes(_)));
/// ```
pub fn decode_text(data: &[u8]) -> Result<Value, DecodeError> {
    decode_with(data, UTF_8)
}
