use crate::{
    coverage::CoverageNode,
    protocol::{Deserializable, Parser, Serializable},
    Result,
};

/// The sequence of locations the engine expects the next run to visit.
///
/// Read-only once built; the tracker walks it with its own cursor. Encoded as an
/// `int32` node count followed by the nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedPath {
    nodes: Vec<CoverageNode>,
}

impl ExpectedPath {
    /// Creates a path from nodes in visitation order.
    #[must_use]
    pub fn new(nodes: Vec<CoverageNode>) -> Self {
        ExpectedPath { nodes }
    }

    /// The node at `position`, if the path is that long.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&CoverageNode> {
        self.nodes.get(position)
    }

    /// All nodes in visitation order.
    #[must_use]
    pub fn nodes(&self) -> &[CoverageNode] {
        &self.nodes
    }

    /// Number of nodes in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the path holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl From<Vec<CoverageNode>> for ExpectedPath {
    fn from(nodes: Vec<CoverageNode>) -> Self {
        ExpectedPath::new(nodes)
    }
}

impl FromIterator<CoverageNode> for ExpectedPath {
    fn from_iter<I: IntoIterator<Item = CoverageNode>>(iter: I) -> Self {
        ExpectedPath::new(iter.into_iter().collect())
    }
}

impl Serializable for ExpectedPath {
    fn serialize(&self, out: &mut Vec<u8>) {
        self.nodes.serialize(out);
    }
}

impl Deserializable for ExpectedPath {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(ExpectedPath::new(Vec::deserialize(parser)?))
    }
}
