//! Native-endian primitive encoding for wire payloads.
//!
//! Both ends of the engine connection run on the same machine, so every fixed-width
//! field (counts, tokens, offsets) travels in the host's native byte order.
//!
//! # Key Components
//!
//! - [`WireIO`] - Trait implemented by the primitive types that appear on the wire
//! - [`read_ne`] / [`read_ne_at`] - Bounds-checked reads from a byte slice
//! - [`write_ne`] - Appends a value to an output buffer
//! - [`wire_count`] - Checked conversion of a length to its `int32` count prefix
//!
//! # Examples
//!
//! ```rust
//! use dotprobe::protocol::io::{read_ne_at, write_ne};
//!
//! let mut buffer = Vec::new();
//! write_ne(&mut buffer, 0x0600_0001u32);
//! write_ne(&mut buffer, -1i32);
//!
//! let mut offset = 0;
//! assert_eq!(read_ne_at::<u32>(&buffer, &mut offset)?, 0x0600_0001);
//! assert_eq!(read_ne_at::<i32>(&buffer, &mut offset)?, -1);
//! assert_eq!(offset, 8);
//! # Ok::<(), dotprobe::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Primitive types with a fixed-width native-endian wire form.
pub trait WireIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in native byte order
    fn from_ne_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in native byte order
    fn to_ne_bytes(self) -> Self::Bytes;
}

macro_rules! impl_wire_io {
    ($($ty:ty => $n:literal),* $(,)?) => {
        $(
            impl WireIO for $ty {
                type Bytes = [u8; $n];

                fn from_ne_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_ne_bytes(bytes)
                }

                fn to_ne_bytes(self) -> Self::Bytes {
                    <$ty>::to_ne_bytes(self)
                }
            }
        )*
    };
}

impl_wire_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_ne<T: WireIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_ne_at(data, &mut offset)
}

/// Reads a `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_ne_at<T: WireIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_ne_bytes(read))
}

/// Appends `value` to `out` in native byte order.
pub fn write_ne<T: WireIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_ne_bytes().as_ref());
}

/// Converts a length to the `int32` count that prefixes it on the wire.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `len` exceeds `i32::MAX`.
pub fn wire_count(len: usize) -> Result<i32> {
    match i32::try_from(len) {
        Ok(count) => Ok(count),
        Err(_) => Err(malformed_error!("Length {} does not fit an int32 count", len)),
    }
}
