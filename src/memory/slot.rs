//! Typed, index-addressed operand slots.
//!
//! Probes inserted by the instrumenter hand the concrete value of every tracked operand
//! to the runtime ("mem"), and later read it back ("unmem") when the engine needs it.
//! A [`SlotStore`] is the table those values live in: a growable vector of
//! [`SlotValue`]s, each tagged with the [`ElementType`] it was written as.
//!
//! # Type Safety
//!
//! The tag of a slot is fixed by the write that created it. [`SlotStore::update`] only
//! replaces the payload and [`SlotStore::read_as`] refuses to hand a value back under a
//! different tag. A mismatch is an instrumentation bug and is reported as the fatal
//! [`crate::Error::SlotTypeMismatch`].
//!
//! # Growth
//!
//! Writing past the end of the table grows it (doubling, or straight to `index + 1` when
//! that is larger). Indices already issued keep their values; the table never shrinks
//! until [`SlotStore::clear`].
//!
//! # Examples
//!
//! ```rust
//! use dotprobe::memory::{ElementType, SlotStore, SlotValue};
//!
//! let mut store = SlotStore::new();
//! let a = store.mem_i4(7);
//! let b = store.mem_f8(0.5);
//! store.mem_i8_at(-1, 10);
//!
//! assert_eq!(store.unmem_i4(a)?, 7);
//! assert_eq!(store.read_tag(b)?, ElementType::R8);
//! assert_eq!(store.read(10)?, SlotValue::I8(-1));
//! # Ok::<(), dotprobe::Error>(())
//! ```

use strum::{EnumCount, EnumIter};
use tracing::trace;

use crate::{Error, Result};

/// Number of slots a fresh store reserves.
pub const DEFAULT_SLOT_CAPACITY: usize = 3;

/// Element types a slot can be tagged with.
///
/// The discriminants are the `CorElementType` codes the host runtime uses for the same
/// primitive types, so tags can be exchanged with the instrumenter without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, strum::Display)]
#[repr(u8)]
pub enum ElementType {
    /// Signed 8-bit integer
    I1 = 0x04,
    /// Signed 16-bit integer
    I2 = 0x06,
    /// Signed 32-bit integer
    I4 = 0x08,
    /// Signed 64-bit integer
    I8 = 0x0A,
    /// 32-bit float
    R4 = 0x0C,
    /// 64-bit float
    R8 = 0x0D,
    /// Native-width pointer or address
    Ptr = 0x0F,
}

impl ElementType {
    /// Width in bytes of a payload of this type.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            ElementType::I1 => 1,
            ElementType::I2 => 2,
            ElementType::I4 | ElementType::R4 => 4,
            ElementType::I8 | ElementType::R8 => 8,
            ElementType::Ptr => std::mem::size_of::<isize>(),
        }
    }

    /// The `CorElementType` code of this tag.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ElementType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x04 => Ok(ElementType::I1),
            0x06 => Ok(ElementType::I2),
            0x08 => Ok(ElementType::I4),
            0x0A => Ok(ElementType::I8),
            0x0C => Ok(ElementType::R4),
            0x0D => Ok(ElementType::R8),
            0x0F => Ok(ElementType::Ptr),
            _ => Err(malformed_error!("Unsupported element type - 0x{:02x}", code)),
        }
    }
}

/// A tagged operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    /// `int8`
    I1(i8),
    /// `int16`
    I2(i16),
    /// `int32`
    I4(i32),
    /// `int64`
    I8(i64),
    /// `float32`
    R4(f32),
    /// `float64`
    R8(f64),
    /// `native int`
    Ptr(isize),
}

impl SlotValue {
    /// The tag this value carries.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            SlotValue::I1(_) => ElementType::I1,
            SlotValue::I2(_) => ElementType::I2,
            SlotValue::I4(_) => ElementType::I4,
            SlotValue::I8(_) => ElementType::I8,
            SlotValue::R4(_) => ElementType::R4,
            SlotValue::R8(_) => ElementType::R8,
            SlotValue::Ptr(_) => ElementType::Ptr,
        }
    }

    /// The native-endian payload bytes, exactly [`ElementType::size`] long.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            SlotValue::I1(v) => v.to_ne_bytes().to_vec(),
            SlotValue::I2(v) => v.to_ne_bytes().to_vec(),
            SlotValue::I4(v) => v.to_ne_bytes().to_vec(),
            SlotValue::I8(v) => v.to_ne_bytes().to_vec(),
            SlotValue::R4(v) => v.to_ne_bytes().to_vec(),
            SlotValue::R8(v) => v.to_ne_bytes().to_vec(),
            SlotValue::Ptr(v) => v.to_ne_bytes().to_vec(),
        }
    }

    /// Rebuilds a value of type `tag` from its native-endian payload.
    ///
    /// Returns `None` when `bytes` is not exactly `tag.size()` long.
    #[must_use]
    pub fn from_payload(tag: ElementType, bytes: &[u8]) -> Option<SlotValue> {
        Some(match tag {
            ElementType::I1 => SlotValue::I1(i8::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::I2 => SlotValue::I2(i16::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::I4 => SlotValue::I4(i32::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::I8 => SlotValue::I8(i64::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::R4 => SlotValue::R4(f32::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::R8 => SlotValue::R8(f64::from_ne_bytes(bytes.try_into().ok()?)),
            ElementType::Ptr => SlotValue::Ptr(isize::from_ne_bytes(bytes.try_into().ok()?)),
        })
    }
}

/// Growable table of tagged operand values.
///
/// See the [module documentation](self) for the growth and type-safety rules.
#[derive(Debug, Clone)]
pub struct SlotStore {
    slots: Vec<Option<SlotValue>>,
    /// Number of occupied slots; the next append goes here
    entries: usize,
    initial_capacity: usize,
}

macro_rules! typed_slot_ops {
    ($($variant:ident, $ty:ty, $mem:ident, $mem_at:ident, $unmem:ident);* $(;)?) => {
        $(
            #[doc = concat!("Appends a `", stringify!($ty), "` and returns its index.")]
            pub fn $mem(&mut self, value: $ty) -> usize {
                self.write(SlotValue::$variant(value), None)
            }

            #[doc = concat!("Writes a `", stringify!($ty), "` at `index`, growing the store if needed.")]
            pub fn $mem_at(&mut self, value: $ty, index: usize) -> usize {
                self.write(SlotValue::$variant(value), Some(index))
            }

            #[doc = concat!("Reads back the `", stringify!($ty), "` stored at `index`.")]
            ///
            /// # Errors
            /// Returns [`Error::SlotUnset`] for a slot never written and
            /// [`Error::SlotTypeMismatch`] if it was written under another tag.
            pub fn $unmem(&self, index: usize) -> Result<$ty> {
                match self.read_as(index, ElementType::$variant)? {
                    SlotValue::$variant(value) => Ok(value),
                    other => Err(Error::SlotTypeMismatch {
                        index,
                        expected: ElementType::$variant,
                        actual: other.element_type(),
                    }),
                }
            }
        )*
    };
}

impl SlotStore {
    /// Creates an empty store with [`DEFAULT_SLOT_CAPACITY`] reserved slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SLOT_CAPACITY)
    }

    /// Creates an empty store reserving `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        SlotStore {
            slots: vec![None; capacity],
            entries: 0,
            initial_capacity: capacity,
        }
    }

    /// Writes `value` either at `index` or, if `None`, at the current entry count.
    ///
    /// Writing to a slot that already holds a value replaces it, tag included; use
    /// [`update`](Self::update) to keep the original tag. Returns the index written.
    ///
    /// Appends are numbered by [`len`](Self::len), not by the highest index in use, so
    /// callers mixing both forms must keep their at-index writes clear of that range.
    pub fn write(&mut self, value: SlotValue, index: Option<usize>) -> usize {
        let index = index.unwrap_or(self.entries);
        if index >= self.slots.len() {
            let grown = (self.slots.len() * 2).max(index + 1);
            self.slots.resize(grown, None);
        }

        if self.slots[index].replace(value).is_none() {
            self.entries += 1;
        }

        trace!(index, ?value, "mem");
        index
    }

    /// Replaces the payload at `index` with raw native-endian `bytes`.
    ///
    /// The stored tag is kept and the payload must be exactly as wide as that tag.
    ///
    /// # Errors
    /// Returns [`Error::SlotUnset`] if `index` was never written and
    /// [`Error::SlotSizeMismatch`] if `bytes` has the wrong width.
    pub fn update_bytes(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let tag = self.read_tag(index)?;
        let Some(value) = SlotValue::from_payload(tag, bytes) else {
            fail_loud!(Error::SlotSizeMismatch {
                index,
                expected: tag.size(),
                actual: bytes.len(),
            });
        };

        self.slots[index] = Some(value);
        trace!(index, ?value, "update");
        Ok(())
    }

    /// Replaces the payload at `index` with the payload of `value`.
    ///
    /// Only the bytes are taken from `value`; the slot keeps its original tag, so
    /// updating an `I4` slot with `SlotValue::R4(1.0)` stores the float's bit pattern
    /// as an `I4`.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update(&mut self, index: usize, value: SlotValue) -> Result<()> {
        self.update_bytes(index, &value.payload())
    }

    /// Updates an `I1` slot.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_i1(&mut self, value: i8, index: usize) -> Result<()> {
        self.update_bytes(index, &value.to_ne_bytes())
    }

    /// Updates an `I2` slot.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_i2(&mut self, value: i16, index: usize) -> Result<()> {
        self.update_bytes(index, &value.to_ne_bytes())
    }

    /// Updates an `I4` slot.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_i4(&mut self, value: i32, index: usize) -> Result<()> {
        self.update_bytes(index, &value.to_ne_bytes())
    }

    /// Updates an `I8` slot.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_i8(&mut self, value: i64, index: usize) -> Result<()> {
        self.update_bytes(index, &value.to_ne_bytes())
    }

    /// Updates an `R4` slot from the bit pattern of a `float64`.
    ///
    /// Instrumented code passes every floating operand as the 64-bit pattern of a
    /// double; the value is narrowed to the slot's width here.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_f4(&mut self, bits: i64, index: usize) -> Result<()> {
        let narrowed = f64::from_bits(bits as u64) as f32;
        self.update_bytes(index, &narrowed.to_ne_bytes())
    }

    /// Updates an `R8` slot from the bit pattern of a `float64`.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_f8(&mut self, bits: i64, index: usize) -> Result<()> {
        self.update_bytes(index, &f64::from_bits(bits as u64).to_ne_bytes())
    }

    /// Updates a `Ptr` slot.
    ///
    /// # Errors
    /// See [`update_bytes`](Self::update_bytes).
    pub fn update_p(&mut self, value: isize, index: usize) -> Result<()> {
        self.update_bytes(index, &value.to_ne_bytes())
    }

    /// Returns the value at `index`, whatever its tag.
    ///
    /// # Errors
    /// Returns [`Error::SlotUnset`] if `index` was never written.
    pub fn read(&self, index: usize) -> Result<SlotValue> {
        match self.slots.get(index).copied().flatten() {
            Some(value) => Ok(value),
            None => fail_loud!(Error::SlotUnset(index)),
        }
    }

    /// Returns the value at `index`, checking that it was written as `expected`.
    ///
    /// # Errors
    /// Returns [`Error::SlotUnset`] if `index` was never written and
    /// [`Error::SlotTypeMismatch`] if the stored tag differs from `expected`.
    pub fn read_as(&self, index: usize, expected: ElementType) -> Result<SlotValue> {
        let value = self.read(index)?;
        let actual = value.element_type();
        if actual != expected {
            fail_loud!(Error::SlotTypeMismatch {
                index,
                expected,
                actual,
            });
        }

        trace!(index, ?value, "unmem");
        Ok(value)
    }

    /// Returns the tag of the slot at `index`.
    ///
    /// # Errors
    /// Returns [`Error::SlotUnset`] if `index` was never written.
    pub fn read_tag(&self, index: usize) -> Result<ElementType> {
        Ok(self.read(index)?.element_type())
    }

    typed_slot_ops! {
        I1, i8, mem_i1, mem_i1_at, unmem_i1;
        I2, i16, mem_i2, mem_i2_at, unmem_i2;
        I4, i32, mem_i4, mem_i4_at, unmem_i4;
        I8, i64, mem_i8, mem_i8_at, unmem_i8;
        R4, f32, mem_f4, mem_f4_at, unmem_f4;
        R8, f64, mem_f8, mem_f8_at, unmem_f8;
        Ptr, isize, mem_p, mem_p_at, unmem_p;
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of slots currently backed by storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drops every value and shrinks back to the initial capacity.
    pub fn clear(&mut self) {
        trace!(entries = self.entries, "clear_mem");
        self.slots.clear();
        self.slots.resize(self.initial_capacity, None);
        self.entries = 0;
    }
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new()
    }
}
