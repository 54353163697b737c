//! # Graph Store Trait
//!
//! The contract between the filter engine and whatever holds the graph.
//! A store hands out scoped connections; a connection runs one assembled
//! query at a time and gives back raw rows.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory, evaluates query plans directly |
//! | `BoltStore` | `bolt` | External Neo4j via Bolt protocol, runs the rendered Cypher |
//!
//! Connections release whatever they hold in `Drop`, so every exit path
//! of a call (success, error, or the caller dropping the future) gives the
//! connection back.

pub mod memory;
#[cfg(feature = "bolt")]
pub mod bolt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::execution::Row;
use crate::query::ExecutableQuery;
use crate::Result;

pub use memory::{MemoryConnection, MemoryStore};
#[cfg(feature = "bolt")]
pub use bolt::{BoltConnection, BoltStore};

// ============================================================================
// Backend Configuration
// ============================================================================

/// Which store to connect to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,

    /// Neo4j Bolt protocol
    #[cfg(feature = "bolt")]
    Bolt {
        uri: String,
        user: String,
        password: String,
        #[serde(default)]
        database: Option<String>,
        #[serde(default = "default_max_connections")]
        max_connections: usize,
    },
}

#[cfg(feature = "bolt")]
fn default_max_connections() -> usize {
    16
}

// ============================================================================
// Traits
// ============================================================================

/// A source of scoped connections.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    type Conn: StoreConnection;

    /// Acquire a connection. Fails with `StoreUnavailable` when the store
    /// cannot be reached.
    async fn acquire(&self) -> Result<Self::Conn>;
}

/// One acquired connection. Released on drop.
#[async_trait]
pub trait StoreConnection: Send {
    /// Execute exactly one query and collect its rows.
    async fn run(&mut self, query: &ExecutableQuery) -> Result<Vec<Row>>;

    /// Round-trip to the store without reading the graph.
    async fn ping(&mut self) -> Result<()>;
}
