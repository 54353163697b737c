//! # graphfilter: Declarative Filter Engine over a Property Graph
//!
//! Turns a typed filter specification into parameterized traversal
//! queries, runs them against a graph store, and normalizes the rows into
//! a stable `{nodes, edges, metadata}` shape. On top of that: cascading
//! filter options, bounded network expansion, weighted path search and
//! recommendations.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between engine and store
//! 2. **No literals in queries**: every user value travels as a parameter
//! 3. **Compiler owns nothing**: `FilterSpec` → predicates is a pure function
//! 4. **Scoped sessions**: one connection per operation, released on every path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphfilter::{EntityType, FilterEngine, FilterSpec, GraphQuery};
//!
//! # async fn example() -> graphfilter::Result<()> {
//! let engine = FilterEngine::open_memory();
//!
//! let filters = FilterSpec {
//!     entity_types: vec![EntityType::Product],
//!     asset_classes: vec!["Equity".into()],
//!     ..FilterSpec::default()
//! };
//! let result = engine.fetch(&GraphQuery::new(filters).with_page(50, 0)).await?;
//!
//! for node in &result.nodes {
//!     println!("{} {}", node.node_type, node.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | Memory | (default) | In-memory graph for testing/embedding |
//! | Bolt | `bolt` | Connect to external Neo4j via Bolt protocol |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod filter;
pub mod compiler;
pub mod query;
pub mod execution;
pub mod storage;
pub mod session;
pub mod normalize;
pub mod cascade;
pub mod traversal;
pub mod config;

use std::time::Duration;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Node, Relationship, Path, Value, PropertyMap, NodeId, RelId};
pub use filter::{EntityType, FilterSpec, GraphQuery, Neighborhood, NumericRange};
pub use query::{Page, RecommendationKind};
pub use storage::{BackendConfig, GraphStore, MemoryStore, StoreConnection};
pub use session::GraphSession;
pub use normalize::{GraphEdge, GraphNode, Metadata, QueryResult, ScoredNode};
pub use cascade::{EntityOption, FilterOptions, OptionDimension};
pub use traversal::{InfluenceNetwork, NodeDetail, PathSearchResult};
pub use crate::config::EngineConfig;

// ============================================================================
// Engine handle
// ============================================================================

/// The primary entry point. Wraps a store; every operation opens its own
/// [`GraphSession`], so one engine serves concurrent callers.
pub struct FilterEngine<S: GraphStore> {
    store: S,
    timeout: Option<Duration>,
}

impl<S: GraphStore> FilterEngine<S> {
    /// Create an engine over `store` with the default query timeout.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            timeout: EngineConfig::default().query_timeout(),
        }
    }

    /// Per-query timeout; `None` disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Access the underlying store (for loading and fault injection).
    pub fn store(&self) -> &S {
        &self.store
    }

    fn session(&self) -> GraphSession<'_, S> {
        GraphSession::new(&self.store, self.timeout)
    }

    /// Filtered fetch: matching subjects (and, per `neighborhood`, their
    /// surroundings), paged by identity.
    #[tracing::instrument(skip(self, request), fields(neighborhood = ?request.neighborhood))]
    pub async fn fetch(&self, request: &GraphQuery) -> Result<QueryResult> {
        let compiled = compiler::compile(&request.filters, "n", Some("r"))?;
        let page = request.page();
        let query = query::assemble(
            query::TraversalPattern::FilteredFetch { neighborhood: request.neighborhood },
            compiled,
            page,
        )?;
        let rows = self.session().execute(&query).await?;
        Ok(normalize::normalize(&rows).with_request(&request.filters, page))
    }

    /// Every option currently in the store.
    #[tracing::instrument(skip(self))]
    pub async fn filter_options(&self) -> Result<FilterOptions> {
        cascade::resolve_options(&self.session(), &FilterSpec::default()).await
    }

    /// Options still reachable under a partial selection.
    #[tracing::instrument(skip(self, selection))]
    pub async fn cascading_options(&self, selection: &FilterSpec) -> Result<FilterOptions> {
        cascade::resolve_options(&self.session(), selection).await
    }

    #[tracing::instrument(skip(self, seeds), fields(seeds = seeds.len()))]
    pub async fn expand(&self, seeds: &[NodeId], depth: u32, page: Page) -> Result<QueryResult> {
        traversal::expand_network(&self.session(), seeds, depth, page).await
    }

    #[tracing::instrument(skip(self, sources, targets), fields(sources = sources.len(), targets = targets.len()))]
    pub async fn find_paths(
        &self,
        sources: &[NodeId],
        targets: &[NodeId],
        max_depth: u32,
    ) -> Result<PathSearchResult> {
        traversal::find_paths(&self.session(), sources, targets, max_depth).await
    }

    #[tracing::instrument(skip(self), fields(seed = %seed, kind = %kind))]
    pub async fn recommend(
        &self,
        seed: NodeId,
        kind: RecommendationKind,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNode>> {
        traversal::recommend(&self.session(), seed, kind, limit).await
    }

    #[tracing::instrument(skip(self, consultants), fields(consultants = consultants.len()))]
    pub async fn influence_network(&self, consultants: &[NodeId]) -> Result<InfluenceNetwork> {
        traversal::influence_network(&self.session(), consultants).await
    }

    #[tracing::instrument(skip(self), fields(node = %node))]
    pub async fn node_detail(&self, node: NodeId) -> Result<Option<NodeDetail>> {
        traversal::node_detail(&self.session(), node).await
    }
}

/// In-memory engine for testing and embedding.
impl FilterEngine<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

/// Neo4j-backed engine.
#[cfg(feature = "bolt")]
impl FilterEngine<storage::BoltStore> {
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let store = storage::BoltStore::from_config(&config.store).await?;
        Ok(Self::with_store(store).with_timeout(config.query_timeout()))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Filter on {dimension} needs a relation binding, which {pattern} does not have")]
    IncompatibleFilter {
        dimension: &'static str,
        pattern: &'static str,
    },

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    /// The configured client-side limit, or `None` when the store itself
    /// gave up.
    #[error("Graph store timed out{}", .0.map(|d| format!(" after {d:?}")).unwrap_or_default())]
    StoreTimeout(Option<Duration>),

    #[error("Query compilation error: {0}")]
    QueryCompilation(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl Error {
    /// Rejected request parameters, raised before any store call.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter(_) | Error::IncompatibleFilter { .. })
    }

    /// The store could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
