use thiserror::Error;

use crate::{memory::ElementType, token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into four classes, mirroring how a host is expected to react:
///
/// ## Type-safety violations (fatal)
/// - [`Error::SlotTypeMismatch`] - A slot was read back under a different element type
/// - [`Error::SlotUnset`] - A slot was read or updated before it was ever written
/// - [`Error::SlotSizeMismatch`] - An update payload does not match the slot's width
/// - [`Error::EmptyStack`] - The top frame was requested from an empty shadow stack
///
/// ## Consistency violations (fatal)
/// - [`Error::StackNotEmpty`] - Frames left on a shadow stack at session end
/// - [`Error::OperandMemoryNotEmpty`] - Operand memory left populated at session end
/// - [`Error::InstrumentationState`] - A lifecycle flag was driven out of order
///
/// ## Transport failures (recoverable by the caller)
/// - [`Error::Io`] - The underlying byte stream failed
/// - [`Error::HandshakeFailed`] - The peer did not answer with the confirmation byte
/// - [`Error::UnknownCommand`] / [`Error::UnexpectedCommand`] - Protocol desynchronisation
/// - [`Error::Malformed`] / [`Error::OutOfBounds`] - A payload could not be decoded
///
/// ## Unsupported host behaviour
/// - [`Error::NotSupported`]
///
/// Path divergence is absent: it is reported as
/// [`crate::coverage::CoverageStep::Diverged`], not as an error.
///
/// # Examples
///
/// ```rust
/// use dotprobe::{memory::SlotStore, Error};
///
/// let mut store = SlotStore::new();
/// let index = store.mem_i4(42);
/// match store.unmem_i8(index) {
///     Err(Error::SlotTypeMismatch { index, .. }) => println!("bad probe at slot {index}"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A slot was read with a type tag different from the one it was written with.
    ///
    /// This always indicates a bug in the instrumentation that emitted the probes.
    #[error("Slot {index} holds {actual}, but was read as {expected}")]
    SlotTypeMismatch {
        /// The slot index
        index: usize,
        /// The tag the caller expected
        expected: ElementType,
        /// The tag the slot was written with
        actual: ElementType,
    },

    /// A slot was read or updated before anything was written to it.
    #[error("Slot {0} was never written")]
    SlotUnset(usize),

    /// An update supplied a payload whose width differs from the stored tag's width.
    #[error("Slot {index} holds {expected} bytes, update supplied {actual}")]
    SlotSizeMismatch {
        /// The slot index
        index: usize,
        /// Width of the stored element type
        expected: usize,
        /// Width of the supplied payload
        actual: usize,
    },

    /// The top frame of an empty shadow stack was requested.
    #[error("Shadow stack of context {0} has no frames")]
    EmptyStack(u64),

    /// A shadow stack still held frames when the session ended.
    #[error("Stack of context {context} is not empty after program termination ({frames} frames left)")]
    StackNotEmpty {
        /// The execution context owning the stack
        context: u64,
        /// Number of frames that were never popped
        frames: usize,
    },

    /// A shadow stack's operand memory still held slots when the session ended.
    #[error("Operand memory of context {0} is not empty after program termination")]
    OperandMemoryNotEmpty(u64),

    /// A lifecycle flag was toggled in an order the host should never produce.
    #[error("Invalid instrumentation state - {0}")]
    InstrumentationState(&'static str),

    /// The transport failed while reading or writing.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The handshake did not observe the confirmation byte.
    #[error("Handshake failed - expected 0x{expected:02x}, got 0x{actual:02x}")]
    HandshakeFailed {
        /// The confirmation byte
        expected: u8,
        /// The byte that was received instead
        actual: u8,
    },

    /// A command byte outside the known command set was received.
    #[error("Unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),

    /// A known command arrived where a different one was required.
    #[error("Unexpected command 0x{actual:02x} while waiting for 0x{expected:02x}")]
    UnexpectedCommand {
        /// The command the exchange was waiting for
        expected: u8,
        /// The command that was received
        actual: u8,
    },

    /// A payload could not be decoded.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding a payload.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The host exercised a feature that the shadow bookkeeping cannot follow.
    #[error("Not supported - {0}")]
    NotSupported(&'static str),

    /// A metadata query could not be answered by the host.
    #[error("Failed to resolve {0}")]
    Unresolved(Token),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` for errors that mean the instrumentation lost track of the program.
    ///
    /// Fatal errors must end the session; everything else is left to the caller's policy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SlotTypeMismatch { .. }
                | Error::SlotUnset(_)
                | Error::SlotSizeMismatch { .. }
                | Error::EmptyStack(_)
                | Error::StackNotEmpty { .. }
                | Error::OperandMemoryNotEmpty(_)
                | Error::InstrumentationState(_)
        )
    }
}
