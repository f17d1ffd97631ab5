use strum::{EnumCount, EnumIter};

use crate::{Error, Result};

/// Commands exchanged with the analysis engine.
///
/// Every message starts with one of these bytes, sent as a one-byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, strum::Display)]
#[repr(u8)]
pub enum CommandType {
    /// Acknowledges the previous message; also the handshake byte.
    Confirmation = 0x55,
    /// Asks the engine to instrument a method body that is being compiled.
    InstrumentCommand = 0x56,
    /// Reports an execution step to the engine and asks how to continue.
    ExecuteCommand = 0x57,
    /// Engine query: the original body of a method.
    ReadMethodBody = 0x58,
    /// Engine query: a user string by token.
    ReadString = 0x59,
    /// Engine query: the type tokens a method's signature mentions.
    ParseTypeInfoFromMethod = 0x60,
    /// Engine query: resolve a `TypeRef` to its defining type token.
    GetTypeTokenFromTypeRef = 0x61,
    /// Engine query: resolve a `TypeSpec` to its type token.
    GetTypeTokenFromTypeSpec = 0x62,
}

impl CommandType {
    /// The wire byte of this command.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Returns `true` for the queries the engine sends to the host.
    #[must_use]
    pub fn is_query(self) -> bool {
        matches!(
            self,
            CommandType::ReadMethodBody
                | CommandType::ReadString
                | CommandType::ParseTypeInfoFromMethod
                | CommandType::GetTypeTokenFromTypeRef
                | CommandType::GetTypeTokenFromTypeSpec
        )
    }
}

impl TryFrom<u8> for CommandType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x55 => Ok(CommandType::Confirmation),
            0x56 => Ok(CommandType::InstrumentCommand),
            0x57 => Ok(CommandType::ExecuteCommand),
            0x58 => Ok(CommandType::ReadMethodBody),
            0x59 => Ok(CommandType::ReadString),
            0x60 => Ok(CommandType::ParseTypeInfoFromMethod),
            0x61 => Ok(CommandType::GetTypeTokenFromTypeRef),
            0x62 => Ok(CommandType::GetTypeTokenFromTypeSpec),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn documented_byte_values() {
        assert_eq!(CommandType::Confirmation.byte(), 0x55);
        assert_eq!(CommandType::InstrumentCommand.byte(), 0x56);
        assert_eq!(CommandType::ExecuteCommand.byte(), 0x57);
        assert_eq!(CommandType::ReadMethodBody.byte(), 0x58);
        assert_eq!(CommandType::ReadString.byte(), 0x59);
        assert_eq!(CommandType::ParseTypeInfoFromMethod.byte(), 0x60);
        assert_eq!(CommandType::GetTypeTokenFromTypeRef.byte(), 0x61);
        assert_eq!(CommandType::GetTypeTokenFromTypeSpec.byte(), 0x62);
    }

    #[test]
    fn byte_conversion() {
        for command in CommandType::iter() {
            assert_eq!(CommandType::try_from(command.byte()).unwrap(), command);
        }
        assert_eq!(CommandType::COUNT, 8);
        assert!(matches!(
            CommandType::try_from(0x5A),
            Err(Error::UnknownCommand(0x5A))
        ));
    }

    #[test]
    fn queries() {
        assert!(!CommandType::Confirmation.is_query());
        assert!(!CommandType::InstrumentCommand.is_query());
        assert!(!CommandType::ExecuteCommand.is_query());
        assert!(CommandType::ReadString.is_query());
        assert!(CommandType::GetTypeTokenFromTypeSpec.is_query());
    }
}
