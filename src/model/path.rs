//! Path: a sequence of alternating nodes and relationships.

use serde::{Deserialize, Serialize};
use super::{Node, Relationship};

/// A path in the graph: node -[rel]- node -[rel]- node ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Nodes along the path. Always has one more element than `relationships`.
    pub nodes: Vec<Node>,
    /// Relationships connecting consecutive nodes.
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}
