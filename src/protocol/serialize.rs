//! Payload serialization contract.
//!
//! Anything that crosses the wire as a count-prefixed buffer implements [`Serializable`];
//! [`crate::protocol::Protocol::send_serializable`] is the generic envelope for such
//! payloads. Types the host receives back implement [`Deserializable`].

use crate::{
    protocol::{io::write_ne, Parser},
    token::Token,
    Result,
};

/// Types that can be encoded into a payload buffer.
pub trait Serializable {
    /// Appends the encoded form of `self` to `out`.
    fn serialize(&self, out: &mut Vec<u8>);

    /// Encodes `self` into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }
}

/// Types that can be decoded from a payload buffer.
pub trait Deserializable: Sized {
    /// Decodes one value, advancing `parser` past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] for payloads
    /// that do not hold a complete value.
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self>;

    /// Decodes a value from the whole of `data`.
    ///
    /// # Errors
    /// As [`deserialize`](Self::deserialize), and [`crate::Error::Malformed`] if bytes
    /// are left over.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let value = Self::deserialize(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after payload",
                parser.remaining()
            ));
        }
        Ok(value)
    }
}

impl Serializable for Token {
    fn serialize(&self, out: &mut Vec<u8>) {
        write_ne(out, self.value());
    }
}

impl Deserializable for Token {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        parser.read_token()
    }
}

/// Sequences encode as an `int32` element count followed by the elements.
///
/// Encoding cannot fail, so a sequence longer than `i32::MAX` gets a wrapped count.
/// Such a payload is larger than `i32::MAX` bytes and is rejected by
/// [`crate::protocol::Protocol::write_buffer`] before it reaches the wire.
impl<T: Serializable> Serializable for [T] {
    fn serialize(&self, out: &mut Vec<u8>) {
        write_ne(out, self.len() as i32);
        for item in self {
            item.serialize(out);
        }
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, out: &mut Vec<u8>) {
        self.as_slice().serialize(out);
    }
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_ne::<i32>()?;
        let Ok(count) = usize::try_from(count) else {
            return Err(malformed_error!("Negative element count - {}", count));
        };

        // Every element takes at least one byte
        if count > parser.remaining() {
            return Err(crate::Error::OutOfBounds);
        }

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::deserialize(parser)?);
        }
        Ok(items)
    }
}
