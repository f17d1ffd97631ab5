use std::fmt;

use crate::{
    protocol::{io::write_ne, Deserializable, Parser, Serializable},
    token::Token,
    Result,
};

/// Encoded size of one [`CoverageNode`].
pub const COVERAGE_NODE_SIZE: usize = 16;

/// One visited location: the instruction at `offset` of a method, as seen from one
/// execution context.
///
/// On the wire a node is four native-endian 32-bit values: module, method, offset and
/// context, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CoverageNode {
    /// Module the method lives in
    pub module_token: u32,
    /// The executing method
    pub method_token: Token,
    /// IL offset of the instruction
    pub offset: u32,
    /// Execution context the step was observed on, or 0 when contexts are not tracked
    pub context_token: i32,
}

impl CoverageNode {
    /// Creates a node.
    #[must_use]
    pub const fn new(module_token: u32, method_token: Token, offset: u32, context_token: i32) -> Self {
        CoverageNode {
            module_token,
            method_token,
            offset,
            context_token,
        }
    }
}

impl fmt::Display for CoverageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[module 0x{:08x}, method {}, offset 0x{:04x}, context {}]",
            self.module_token, self.method_token, self.offset, self.context_token
        )
    }
}

impl Serializable for CoverageNode {
    fn serialize(&self, out: &mut Vec<u8>) {
        write_ne(out, self.module_token);
        write_ne(out, self.method_token.value());
        write_ne(out, self.offset);
        write_ne(out, self.context_token);
    }
}

impl Deserializable for CoverageNode {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(CoverageNode {
            module_token: parser.read_ne()?,
            method_token: parser.read_token()?,
            offset: parser.read_ne()?,
            context_token: parser.read_ne()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_layout() {
        let node = CoverageNode::new(1, Token::new(0x0600_0002), 0x10, -1);
        let bytes = node.to_bytes();
        assert_eq!(bytes.len(), COVERAGE_NODE_SIZE);
        assert_eq!(&bytes[0..4], &1u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &0x0600_0002u32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &0x10u32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &(-1i32).to_ne_bytes());
        assert_eq!(CoverageNode::from_bytes(&bytes).unwrap(), node);
    }

    #[test]
    fn display() {
        let node = CoverageNode::new(1, Token::new(0x0600_0002), 0x10, 0);
        assert_eq!(
            node.to_string(),
            "[module 0x00000001, method 0x06000002, offset 0x0010, context 0]"
        );
    }
}
