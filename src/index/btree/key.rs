//! Fixed-width key and record locator encoding.
//!
//! Encodings are not self-describing: the [`KeyType`] travels separately
//! (in the tree metadata) and every key of a type encodes to exactly
//! [`KeyType::width`] bytes. Integers are big-endian.

use std::cmp::Ordering;
use std::fmt;

use crate::common::{Error, Result};

/// Characters a string key may contain, in ascending order.
///
/// Byte order over this alphabet (space, digits, uppercase, lowercase)
/// matches the ASCII order, so string keys compare bytewise.
pub const STRING_ALPHABET: &str =
    " 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// The type of every key in one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Bool,
    Int,
    Float,
    /// Fixed-length string of the given declared length in bytes.
    String(u32),
}

impl KeyType {
    /// Serialized width of a key of this type.
    pub fn width(&self) -> usize {
        match self {
            KeyType::Bool => 1,
            KeyType::Int | KeyType::Float => 4,
            KeyType::String(len) => *len as usize,
        }
    }

    /// Tag byte used in the tree metadata page.
    pub fn tag(&self) -> u8 {
        match self {
            KeyType::Bool => 0,
            KeyType::Int => 1,
            KeyType::Float => 2,
            KeyType::String(_) => 3,
        }
    }

    /// Rebuild a key type from its metadata tag and width.
    ///
    /// # Errors
    /// `Error::CorruptMetadata` for an unknown tag or a width that does not
    /// match the tag.
    pub fn from_tag(tag: u8, width: u32) -> Result<Self> {
        let key_type = match tag {
            0 => KeyType::Bool,
            1 => KeyType::Int,
            2 => KeyType::Float,
            3 if width > 0 => KeyType::String(width),
            _ => {
                return Err(Error::CorruptMetadata(format!(
                    "unknown key type tag {} (width {})",
                    tag, width
                )))
            }
        };

        if key_type.width() != width as usize {
            return Err(Error::CorruptMetadata(format!(
                "key type {} cannot have width {}",
                key_type, width
            )));
        }
        Ok(key_type)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Bool => write!(f, "bool"),
            KeyType::Int => write!(f, "int"),
            KeyType::Float => write!(f, "float"),
            KeyType::String(len) => write!(f, "string({})", len),
        }
    }
}

/// A single index key.
///
/// Keys are only meaningfully comparable within one [`KeyType`]; the tree
/// rejects keys of any other type. Across types the order falls back to the
/// type tag so that `Ord` stays total.
///
/// # Example
/// ```
/// use pagetree::{Key, KeyType};
///
/// let key = Key::string("abc", 5).unwrap();
/// assert_eq!(key.key_type(), KeyType::String(5));
/// assert_eq!(key.encode(), b"abc\0\0".to_vec());
/// assert!(Key::Int(3) < Key::Int(10));
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    Bool(bool),
    Int(i32),
    Float(f32),
    String { value: String, len: u32 },
}

impl Key {
    /// Build a fixed-length string key.
    ///
    /// # Errors
    /// `Error::InvalidKey` if the value is longer than `len` or contains a
    /// character outside [`STRING_ALPHABET`].
    pub fn string(value: &str, len: u32) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidKey("string keys need a length > 0".to_string()));
        }
        if value.len() > len as usize {
            return Err(Error::InvalidKey(format!(
                "{:?} is longer than {} bytes",
                value, len
            )));
        }
        if let Some(c) = value.chars().find(|c| !STRING_ALPHABET.contains(*c)) {
            return Err(Error::InvalidKey(format!(
                "{:?} contains disallowed character {:?}",
                value, c
            )));
        }

        Ok(Key::String {
            value: value.to_string(),
            len,
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Bool(_) => KeyType::Bool,
            Key::Int(_) => KeyType::Int,
            Key::Float(_) => KeyType::Float,
            Key::String { len, .. } => KeyType::String(*len),
        }
    }

    /// Encode into exactly `self.key_type().width()` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.key_type().width());
        self.encode_into(&mut buf);
        buf
    }

    /// Append the encoding to `buf`.
    ///
    /// Strings are NUL-padded to their declared length.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Key::Bool(b) => buf.push(*b as u8),
            Key::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
            Key::Float(f) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            Key::String { value, len } => {
                buf.extend_from_slice(value.as_bytes());
                buf.resize(buf.len() + (*len as usize - value.len()), 0);
            }
        }
    }

    /// Decode a key of `key_type` from the start of `bytes`.
    ///
    /// # Errors
    /// `Error::InvalidKey` if `bytes` is too short or does not hold a valid
    /// value of the type.
    pub fn decode(bytes: &[u8], key_type: KeyType) -> Result<Self> {
        let width = key_type.width();
        if bytes.len() < width {
            return Err(Error::InvalidKey(format!(
                "need {} bytes for a {} key, got {}",
                width,
                key_type,
                bytes.len()
            )));
        }
        let bytes = &bytes[..width];

        match key_type {
            KeyType::Bool => match bytes[0] {
                0 => Ok(Key::Bool(false)),
                1 => Ok(Key::Bool(true)),
                b => Err(Error::InvalidKey(format!("invalid bool byte {}", b))),
            },
            KeyType::Int => Ok(Key::Int(i32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            KeyType::Float => Ok(Key::Float(f32::from_bits(u32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))),
            KeyType::String(len) => {
                let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                let value = std::str::from_utf8(&bytes[..end])
                    .map_err(|e| Error::InvalidKey(format!("string key is not UTF-8: {}", e)))?;
                Key::string(value, len)
            }
        }
    }

    fn type_rank(&self) -> u8 {
        self.key_type().tag()
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Float(a), Key::Float(b)) => a.total_cmp(b),
            (Key::String { value: a, len: la }, Key::String { value: b, len: lb }) => {
                la.cmp(lb).then_with(|| a.as_bytes().cmp(b.as_bytes()))
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value)
    }
}

impl From<f32> for Key {
    fn from(value: f32) -> Self {
        Key::Float(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::Float(x) => write!(f, "{}", x),
            Key::String { value, .. } => write!(f, "{}", value),
        }
    }
}

/// Location of a record in a heap file: (page, slot).
///
/// Ordered by page, then slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page: u32,
    pub slot: u16,
}

impl RecordId {
    /// Serialized size in bytes.
    pub const SIZE: usize = 6;

    pub fn new(page: u32, slot: u16) -> Self {
        Self { page, slot }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.page.to_be_bytes());
        buf.extend_from_slice(&self.slot.to_be_bytes());
    }

    /// Decode from the first [`RecordId::SIZE`] bytes.
    ///
    /// # Panics
    /// Panics if `bytes.len() < RecordId::SIZE`.
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            page: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            slot: u16::from_be_bytes([bytes[4], bytes[5]]),
        }
    }

    pub(crate) fn to_sexp(self) -> String {
        format!("({} {})", self.page, self.slot)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({}, {})", self.page, self.slot)
    }
}
