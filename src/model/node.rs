//! Node (entity) in the property graph.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{PropertyMap, Value};
use crate::Error;

/// Opaque node identifier.
///
/// Stable within one store process, not across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(NodeId)
            .map_err(|_| Error::InvalidParameter(format!("'{s}' is not a node identity")))
    }
}

/// Label set in store-reported order. Most entities carry a primary
/// category plus at most one tag.
pub type Labels = SmallVec<[String; 2]>;

/// A node in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: Labels,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            labels: Labels::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// First label as reported by the store, not the alphabetically first.
    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
