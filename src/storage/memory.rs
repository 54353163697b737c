//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`. Instead of
//! parsing Cypher it evaluates the [`QueryPlan`] each query carries, with
//! the same semantics the rendered text has against Neo4j.
//!
//! ## Limitations
//!
//! - **No query language**: the `text` of a query is ignored.
//! - **No procedures**: expansion and Dijkstra are built in, with the
//!   defaults the APOC procedures run with (all relation types, both
//!   directions, `weight` property defaulting to 1.0).
//! - **Single graph lock**: writers block readers. Fine for tests and
//!   embedding, not for write-heavy use.
//!
//! Fault injection (`set_available`, `set_latency`, `fail_when`) and the
//! open connection counter exist so the session's failure paths can be
//! exercised without a live server.

mod eval;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{GraphStore, StoreConnection};
use crate::execution::Row;
use crate::model::*;
use crate::query::{ExecutableQuery, QueryPlan};
use crate::{Error, Result};

type FaultHook = Arc<dyn Fn(&QueryPlan) -> Option<Error> + Send + Sync>;

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph. Cheap to clone; clones share the graph.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    graph: RwLock<GraphData>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    open_connections: AtomicUsize,
    available: AtomicBool,
    latency: RwLock<Option<Duration>>,
    fault: RwLock<Option<FaultHook>>,
}

/// Graph contents. Ordered maps give identity-ordered scans for free.
#[derive(Default)]
pub(crate) struct GraphData {
    nodes: BTreeMap<NodeId, Node>,
    relationships: BTreeMap<RelId, Relationship>,
    /// node_id → incident relationship IDs, insertion order
    adjacency: HashMap<NodeId, Vec<RelId>>,
}

impl GraphData {
    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Relations touching `id`, each once (self-loops included once).
    pub(crate) fn incident(&self, id: NodeId) -> impl Iterator<Item = &Relationship> {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationships.get(rid))
    }

    /// Distinct neighbors of `id` in adjacency order, excluding `id`.
    pub(crate) fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for rel in self.incident(id) {
            if let Some(other) = rel.other_node(id) {
                if other != id && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        out
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                graph: RwLock::new(GraphData::default()),
                next_node_id: AtomicU64::new(0),
                next_rel_id: AtomicU64::new(0),
                open_connections: AtomicUsize::new(0),
                available: AtomicBool::new(true),
                latency: RwLock::new(None),
                fault: RwLock::new(None),
            }),
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Add a node. Label order is kept as given.
    pub fn create_node(&self, labels: &[&str], props: PropertyMap) -> NodeId {
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        };

        let mut graph = self.inner.graph.write();
        graph.nodes.insert(id, node);
        graph.adjacency.entry(id).or_default();
        id
    }

    /// Add a directed relationship between two existing nodes.
    pub fn create_relationship(
        &self,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let mut graph = self.inner.graph.write();
        if !graph.nodes.contains_key(&src) {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if !graph.nodes.contains_key(&dst) {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        graph.relationships.insert(
            id,
            Relationship {
                id,
                src,
                dst,
                rel_type: rel_type.to_string(),
                properties: props,
            },
        );

        // Update adjacency for both endpoints
        graph.adjacency.entry(src).or_default().push(id);
        if src != dst {
            graph.adjacency.entry(dst).or_default().push(id);
        }
        Ok(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.graph.read().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.graph.read().relationships.len()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Connections currently held by sessions.
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    /// Take the store offline (`acquire` fails with `StoreUnavailable`) or
    /// back online.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Delay every query by `latency` before it touches the graph.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    /// Fail queries for which `hook` returns an error.
    pub fn fail_when<F>(&self, hook: F)
    where
        F: Fn(&QueryPlan) -> Option<Error> + Send + Sync + 'static,
    {
        *self.inner.fault.write() = Some(Arc::new(hook));
    }

    pub fn clear_faults(&self) {
        *self.inner.fault.write() = None;
        *self.inner.latency.write() = None;
        self.set_available(true);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("nodes", &self.node_count())
            .field("relationships", &self.relationship_count())
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

// ============================================================================
// MemoryConnection
// ============================================================================

/// A scoped handle on a [`MemoryStore`]. Counted while alive.
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.inner.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Conn = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store is offline".into()));
        }
        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection { inner: Arc::clone(&self.inner) })
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn run(&mut self, query: &ExecutableQuery) -> Result<Vec<Row>> {
        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store went offline".into()));
        }
        let hook = self.inner.fault.read().clone();
        if let Some(err) = hook.and_then(|hook| hook(&query.plan)) {
            return Err(err);
        }

        let graph = self.inner.graph.read();
        eval::evaluate(&graph, &query.plan)
    }

    async fn ping(&mut self) -> Result<()> {
        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store went offline".into()));
        }
        Ok(())
    }
}
