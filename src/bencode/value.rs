use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use num_bigint::BigInt;

use super::error::EncodeError;

/// A bencode value.
///
/// Byte strings come in two flavours: [`Value::Bytes`] holds raw data, while
/// [`Value::Text`] holds a string that was decoded under (or will be encoded
/// with) a character encoding. Both share the same wire form, and values
/// compare equal when their raw bytes do: `Value::from("blue")` equals
/// `Value::bytes("blue")`. Text takes part in comparisons as UTF-8.
///
/// # Examples
///
/// ```
/// use scgi_xmlrpc::bencode::Value;
///
/// let int: Value = 42i64.into();
/// let text: Value = "hello".into();
///
/// assert_eq!(int.as_i64(), Some(42));
/// assert_eq!(text.as_str(), Some("hello"));
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// An integer of arbitrary size.
    Integer(BigInt),
    /// A raw byte string.
    Bytes(Bytes),
    /// A byte string interpreted as text.
    Text(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A dictionary with byte string keys, encoded in key order.
    Dict(BTreeMap<Key, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            _ => match (self.as_bytes(), other.as_bytes()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

/// A dictionary key.
///
/// Like [`Value`], a key is either raw bytes or text that the encoder writes
/// in its configured character encoding. Keys are ordered and compared by
/// their raw bytes (UTF-8 for text), so `dict.get(b"name")` finds a text key
/// `"name"`. The encoder re-sorts keys after encoding them, which keeps the
/// output canonical under any encoding.
#[derive(Debug, Clone)]
pub enum Key {
    Bytes(Bytes),
    Text(String),
}

impl Key {
    /// Raw bytes of the key, text as UTF-8.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Key::Bytes(b) => b,
            Key::Text(s) => s.as_bytes(),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Key) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Key) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Key) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Bytes> for Key {
    fn from(b: Bytes) -> Self {
        Key::Bytes(b)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl Value {
    /// Creates a raw byte string value.
    pub fn bytes(b: impl Into<Bytes>) -> Self {
        Value::Bytes(b.into())
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the integer if this is one and it fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|i| i64::try_from(i).ok())
    }

    /// Returns the raw bytes of a byte string, whichever flavour it is.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(&b[..]),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    ///
    /// Raw byte strings are returned when they hold valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the list, if this is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Returns the dictionary, if this is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<Key, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up `key` if this is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::Integer(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeMap<Key, Value>> for Value {
    fn from(d: BTreeMap<Key, Value>) -> Self {
        Value::Dict(d)
    }
}

impl From<BTreeMap<Bytes, Value>> for Value {
    fn from(d: BTreeMap<Bytes, Value>) -> Self {
        Value::Dict(d.into_iter().map(|(k, v)| (Key::Bytes(k), v)).collect())
    }
}

/// Conversion into the bencode value model.
///
/// This is the hook [`Encoder::encode`](super::Encoder::encode) goes through:
/// implement it to give a custom type a canonical bencode form.
///
/// Plain byte strings are spelled [`Bytes`]; slices and vectors of other
/// types encode as lists.
pub trait ToBencode {
    /// Converts `self` into a [`Value`].
    fn to_bencode(&self) -> Result<Value, EncodeError>;
}

impl ToBencode for Value {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(self.clone())
    }
}

impl<T: ToBencode + ?Sized> ToBencode for &T {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        (**self).to_bencode()
    }
}

impl ToBencode for bool {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Integer(BigInt::from(u8::from(*self))))
    }
}

macro_rules! integer_to_bencode {
    ($($t:ty),*) => {
        $(
            impl ToBencode for $t {
                fn to_bencode(&self) -> Result<Value, EncodeError> {
                    Ok(Value::Integer(BigInt::from(*self)))
                }
            }
        )*
    };
}

integer_to_bencode!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl ToBencode for BigInt {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Integer(self.clone()))
    }
}

impl ToBencode for str {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Text(self.to_owned()))
    }
}

impl ToBencode for String {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Text(self.clone()))
    }
}

impl ToBencode for Bytes {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Bytes(self.clone()))
    }
}

impl<T: ToBencode> ToBencode for [T] {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        self.iter()
            .map(ToBencode::to_bencode)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }
}

impl<T: ToBencode> ToBencode for Vec<T> {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        self.as_slice().to_bencode()
    }
}

impl<T: ToBencode> ToBencode for Option<T> {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        match self {
            Some(value) => value.to_bencode(),
            None => Err(EncodeError::Unsupported {
                type_name: std::any::type_name::<Option<T>>(),
            }),
        }
    }
}

/// Converts a map key, which must end up as a byte string.
fn dict_key<K: ToBencode + ?Sized>(key: &K) -> Result<Key, EncodeError> {
    match key.to_bencode()? {
        Value::Bytes(b) => Ok(Key::Bytes(b)),
        Value::Text(s) => Ok(Key::Text(s)),
        other => Err(EncodeError::NonStringKey { kind: other.kind() }),
    }
}

fn dict_from<'a, K, V, I>(entries: I) -> Result<Value, EncodeError>
where
    K: ToBencode + 'a,
    V: ToBencode + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let mut dict = BTreeMap::new();
    for (key, value) in entries {
        dict.insert(dict_key(key)?, value.to_bencode()?);
    }
    Ok(Value::Dict(dict))
}

impl<K: ToBencode, V: ToBencode> ToBencode for BTreeMap<K, V> {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        dict_from(self)
    }
}

impl<K: ToBencode, V: ToBencode, S> ToBencode for HashMap<K, V, S> {
    fn to_bencode(&self) -> Result<Value, EncodeError> {
        dict_from(self)
    }
}
