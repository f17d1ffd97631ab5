//! Binary wire protocol between the instrumented host and the analysis engine.
//!
//! The protocol is a framed request/response exchange over any blocking byte stream.
//! All integers are native-endian. Variable-length data is sent as an `int32`
//! count-prefixed buffer, tokens as raw 32-bit values, and commands as one-byte
//! buffers carrying a [`CommandType`] byte.
//!
//! # Architecture
//!
//! - [`io`] - fixed-width native-endian reads and writes over byte slices
//! - [`Parser`] - bounds-checked cursor over a received payload
//! - [`Serializable`] / [`Deserializable`] - payload encoding contract
//! - [`MethodBody`] / [`ExceptionClause`] - method bodies and their handler tables
//! - [`Protocol`] - the connection itself, generic over a [`Transport`]
//! - [`MetadataProvider`] - host answers to engine queries
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotprobe::protocol::Protocol;
//! use dotprobe::token::Token;
//!
//! let mut protocol = Protocol::connect("127.0.0.1:9999")?;
//! let entry_point = protocol.accept_entry_point()?;
//! protocol.send_token(Token::new(0x0600_0001))?;
//! protocol.shutdown()?;
//! # Ok::<(), dotprobe::Error>(())
//! ```

mod body;
mod channel;
mod command;
pub mod io;
mod parser;
mod serialize;

pub use body::{ExceptionClause, ExceptionHandlerFlags, MethodBody, FAT_CLAUSE_SIZE};
pub use channel::{MetadataProvider, Protocol, Transport};
pub use command::CommandType;
pub use parser::Parser;
pub use serialize::{Deserializable, Serializable};
