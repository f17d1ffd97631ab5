//! Method bodies as they travel between host and engine.
//!
//! A body on the wire is `[bytecode buffer][maxStackSize: uint32][exception-handler
//! buffer]`. The exception-handler buffer is a table of fat clauses as laid out in
//! ECMA-335 II.25.4.6: six `uint32` fields per clause. [`MethodBody`] keeps the table
//! as the raw bytes it was received as and decodes it on demand into
//! [`ExceptionClause`]s.

use bitflags::bitflags;

use crate::{
    protocol::{
        io::{read_ne_at, write_ne},
        Deserializable, Parser, Serializable,
    },
    token::Token,
    Result,
};

/// Size in bytes of one fat exception clause.
pub const FAT_CLAUSE_SIZE: usize = 24;

bitflags! {
    /// Kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u32 {
        /// A typed catch clause; the clause carries the caught type's token.
        ///
        /// The value is zero, so `contains(EXCEPTION)` holds for every clause. Test
        /// for a typed catch with [`is_empty`](Self::is_empty) instead.
        const EXCEPTION = 0x0000;
        /// A filter clause; the clause carries the filter's offset.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause.
        const FAULT = 0x0004;
    }
}

/// One try/handler region of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Kind of the clause
    pub flags: ExceptionHandlerFlags,
    /// Offset of the protected region
    pub try_offset: u32,
    /// Length of the protected region
    pub try_length: u32,
    /// Offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught type token for typed clauses, filter offset for filter clauses
    pub class_token_or_filter_offset: u32,
}

impl ExceptionClause {
    /// The caught type, for typed catch clauses.
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        self.flags
            .is_empty()
            .then_some(Token::new(self.class_token_or_filter_offset))
    }

    /// The filter's entry offset, for filter clauses.
    #[must_use]
    pub fn filter_offset(&self) -> Option<u32> {
        self.flags
            .contains(ExceptionHandlerFlags::FILTER)
            .then_some(self.class_token_or_filter_offset)
    }

    /// Decodes a table of fat clauses.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the table length is not a multiple of
    /// [`FAT_CLAUSE_SIZE`].
    pub fn decode_table(data: &[u8]) -> Result<Vec<ExceptionClause>> {
        if data.len() % FAT_CLAUSE_SIZE != 0 {
            return Err(malformed_error!(
                "Exception handler table of {} bytes is not a whole number of clauses",
                data.len()
            ));
        }

        let mut offset = 0;
        let mut clauses = Vec::with_capacity(data.len() / FAT_CLAUSE_SIZE);
        while offset < data.len() {
            clauses.push(ExceptionClause {
                flags: ExceptionHandlerFlags::from_bits_retain(read_ne_at(data, &mut offset)?),
                try_offset: read_ne_at(data, &mut offset)?,
                try_length: read_ne_at(data, &mut offset)?,
                handler_offset: read_ne_at(data, &mut offset)?,
                handler_length: read_ne_at(data, &mut offset)?,
                class_token_or_filter_offset: read_ne_at(data, &mut offset)?,
            });
        }
        Ok(clauses)
    }

    /// Encodes `clauses` as a table of fat clauses.
    #[must_use]
    pub fn encode_table(clauses: &[ExceptionClause]) -> Vec<u8> {
        let mut out = Vec::with_capacity(clauses.len() * FAT_CLAUSE_SIZE);
        for clause in clauses {
            write_ne(&mut out, clause.flags.bits());
            write_ne(&mut out, clause.try_offset);
            write_ne(&mut out, clause.try_length);
            write_ne(&mut out, clause.handler_offset);
            write_ne(&mut out, clause.handler_length);
            write_ne(&mut out, clause.class_token_or_filter_offset);
        }
        out
    }
}

/// Bytecode, stack bound and exception table of one method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody {
    /// The IL bytecode
    pub il: Vec<u8>,
    /// Maximum evaluation stack depth
    pub max_stack_size: u32,
    /// Raw fat exception clause table
    pub exception_handlers: Vec<u8>,
}

impl MethodBody {
    /// Builds a body from decoded clauses.
    #[must_use]
    pub fn new(il: Vec<u8>, max_stack_size: u32, clauses: &[ExceptionClause]) -> Self {
        MethodBody {
            il,
            max_stack_size,
            exception_handlers: ExceptionClause::encode_table(clauses),
        }
    }

    /// Decodes the exception table.
    ///
    /// # Errors
    /// See [`ExceptionClause::decode_table`].
    pub fn clauses(&self) -> Result<Vec<ExceptionClause>> {
        ExceptionClause::decode_table(&self.exception_handlers)
    }
}

/// Lengths above `i32::MAX` wrap here; [`crate::protocol::Protocol::send_method_body`]
/// checks them with [`wire_count`](crate::protocol::io::wire_count) before encoding.
impl Serializable for MethodBody {
    fn serialize(&self, out: &mut Vec<u8>) {
        write_ne(out, self.il.len() as i32);
        out.extend_from_slice(&self.il);
        write_ne(out, self.max_stack_size);
        write_ne(out, self.exception_handlers.len() as i32);
        out.extend_from_slice(&self.exception_handlers);
    }
}

impl Deserializable for MethodBody {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        let il = parser.read_prefixed_bytes()?.to_vec();
        let max_stack_size = parser.read_ne::<u32>()?;
        let exception_handlers = parser.read_prefixed_bytes()?.to_vec();
        Ok(MethodBody {
            il,
            max_stack_size,
            exception_handlers,
        })
    }
}
