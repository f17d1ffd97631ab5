//! Cursor over a received payload.
//!
//! [`Parser`] walks a payload buffer front to back with bounds-checked reads of the
//! fixed-width and count-prefixed fields that make up protocol messages.
//!
//! # Examples
//!
//! ```rust
//! use dotprobe::protocol::Parser;
//!
//! let mut data = Vec::new();
//! data.extend_from_slice(&3i32.to_ne_bytes());
//! data.extend_from_slice(b"abc");
//! data.extend_from_slice(&0x0600_0001u32.to_ne_bytes());
//!
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_prefixed_bytes()?, b"abc");
//! assert_eq!(parser.read_token()?.value(), 0x0600_0001);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dotprobe::Error>(())
//! ```

use crate::{
    protocol::io::{read_ne_at, WireIO},
    token::Token,
    Error::OutOfBounds,
    Result,
};

/// A generic Parser for wire payloads.
pub struct Parser<'a> {
    /// The payload being parsed
    data: &'a [u8],
    /// Current position within the payload
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the payload.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload has no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Bytes left after the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns `true` if there are bytes left to read.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Reads a native-endian `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the payload ends first.
    pub fn read_ne<T: WireIO>(&mut self) -> Result<T> {
        read_ne_at(self.data, &mut self.position)
    }

    /// Reads a 32-bit metadata token.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the payload ends first.
    pub fn read_token(&mut self) -> Result<Token> {
        Ok(Token::new(self.read_ne::<u32>()?))
    }

    /// Reads `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    /// Reads an `int32` count followed by that many bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a negative count and
    /// [`crate::Error::OutOfBounds`] if the payload ends first.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let count = self.read_ne::<i32>()?;
        let Ok(length) = usize::try_from(count) else {
            return Err(malformed_error!("Negative buffer length - {}", count));
        };
        self.read_bytes(length)
    }
}
