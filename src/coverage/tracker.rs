use tracing::{debug, warn};

use crate::coverage::{CoverageNode, ExpectedPath};

/// Outcome of [`CoverageTracker::record_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStep {
    /// The step was accepted (appended, or ignored as an immediate repeat).
    Accepted {
        /// Whether there is still an expected path left to compare against.
        still_expects_coverage: bool,
    },
    /// The step does not match the expected path. Nothing was appended.
    Diverged {
        /// The location the expected path predicted
        expected: CoverageNode,
        /// The location actually reached
        actual: CoverageNode,
    },
}

impl CoverageStep {
    /// Returns `true` unless the step diverged.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, CoverageStep::Accepted { .. })
    }
}

/// Append-only log of visited locations, compared against an optional expected path.
///
/// The comparison assumes a single logical path of execution. Steps from several
/// threads interleave into one log and will diverge from any expected path that was
/// recorded from a different interleaving.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    nodes: Vec<CoverageNode>,
    flushed: usize,
    expected: Option<ExpectedPath>,
    cursor: usize,
    expired: bool,
}

impl CoverageTracker {
    /// Creates an empty tracker with no expected path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the path the next steps are compared against, or removes it.
    ///
    /// The cursor restarts at the first node. An empty path is expired immediately.
    pub fn set_expected_coverage(&mut self, path: Option<ExpectedPath>) {
        self.cursor = 0;
        self.expired = path.as_ref().is_some_and(ExpectedPath::is_empty);
        if let Some(path) = &path {
            debug!(nodes = path.len(), "expected coverage installed");
        }
        self.expected = path;
    }

    /// Returns `true` while the expected path has nodes left to compare against.
    #[must_use]
    pub fn still_expects_coverage(&self) -> bool {
        !self.expired
            && self
                .expected
                .as_ref()
                .is_some_and(|path| self.cursor < path.len())
    }

    /// Returns `true` once comparison has stopped for good.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Records that `node` was reached.
    ///
    /// An immediate repeat of the last node is accepted without appending. Otherwise,
    /// while an expected path is active, `node` must equal the path's next node; on a
    /// mismatch nothing is appended and [`CoverageStep::Diverged`] is returned. Once the
    /// path is used up, or if none was ever installed, every step is accepted.
    pub fn record_step(&mut self, node: CoverageNode) -> CoverageStep {
        if self.nodes.last() == Some(&node) {
            return CoverageStep::Accepted {
                still_expects_coverage: self.still_expects_coverage(),
            };
        }

        match &self.expected {
            Some(path) if !self.expired => {
                if let Some(expected) = path.get(self.cursor) {
                    if *expected != node {
                        warn!(%expected, actual = %node, "path divergence");
                        return CoverageStep::Diverged {
                            expected: *expected,
                            actual: node,
                        };
                    }
                }
                self.cursor += 1;
                if self.cursor >= path.len() {
                    debug!("expected coverage exhausted");
                    self.expired = true;
                }
            }
            Some(_) => {}
            None => self.expired = true,
        }

        debug!(%node, "coverage step");
        self.nodes.push(node);
        CoverageStep::Accepted {
            still_expects_coverage: self.still_expects_coverage(),
        }
    }

    /// Nodes appended since the previous flush. The full log is not affected.
    pub fn flush_new_nodes(&mut self) -> &[CoverageNode] {
        let start = self.flushed;
        self.flushed = self.nodes.len();
        &self.nodes[start..]
    }

    /// Number of nodes appended but not yet flushed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.nodes.len() - self.flushed
    }

    /// The full log in visitation order.
    #[must_use]
    pub fn nodes(&self) -> &[CoverageNode] {
        &self.nodes
    }

    /// The most recently appended node.
    #[must_use]
    pub fn last(&self) -> Option<&CoverageNode> {
        self.nodes.last()
    }
}
