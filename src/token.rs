use std::fmt;

/// A metadata token as the host runtime hands it to probes and the engine.
///
/// Tokens are opaque 32-bit values on the wire. The high byte names the metadata
/// table (`0x06` for `MethodDef`, `0x01` for `TypeRef`, ...) and the low 24 bits
/// the row, which is only used for diagnostics here.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// `MethodDef` table id
    pub const METHOD_DEF: u8 = 0x06;
    /// `TypeRef` table id
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeSpec` table id
    pub const TYPE_SPEC: u8 = 0x1B;
    /// `UserString` heap id
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(0x{:08x})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_and_row() {
        let token = Token::new(0x0600_0012);
        assert_eq!(token.table(), Token::METHOD_DEF);
        assert_eq!(token.row(), 0x12);
        assert!(!token.is_null());
        assert!(Token::default().is_null());
    }

    #[test]
    fn formatting() {
        let token = Token(0x1B00_0001);
        assert_eq!(token.to_string(), "0x1b000001");
        assert_eq!(format!("{token:?}"), "Token(0x1b000001)");
        assert_eq!(token.table(), Token::TYPE_SPEC);
    }
}
