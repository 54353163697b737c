//! Neo4j store over the Bolt protocol.
//!
//! Sends the rendered Cypher with its parameter map through `neo4rs` and
//! decodes rows by the column layout of the pattern that produced them.
//! Connection slots are bounded by a semaphore; a slot is held for the
//! lifetime of a [`BoltConnection`] and returned on drop.

use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{BoltType, ConfigBuilder, Graph};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{BackendConfig, GraphStore, StoreConnection};
use crate::cascade::OptionSource;
use crate::execution::Row;
use crate::model::*;
use crate::query::{ExecutableQuery, TraversalPattern};
use crate::{Error, Result};

// ============================================================================
// BoltStore
// ============================================================================

#[derive(Clone)]
pub struct BoltStore {
    graph: Graph,
    slots: Arc<Semaphore>,
}

impl BoltStore {
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        database: Option<&str>,
        max_connections: usize,
    ) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .max_connections(max_connections);
        if let Some(db) = database {
            builder = builder.db(db);
        }
        let config = builder.build().map_err(classify)?;
        let graph = Graph::connect(config).await.map_err(classify)?;
        tracing::debug!(uri, "connected to Neo4j");

        Ok(Self {
            graph,
            slots: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    /// Connect using a `BackendConfig::Bolt`.
    pub async fn from_config(config: &BackendConfig) -> Result<Self> {
        match config {
            BackendConfig::Bolt { uri, user, password, database, max_connections } => {
                Self::connect(uri, user, password, database.as_deref(), *max_connections).await
            }
            BackendConfig::Memory => Err(Error::InvalidParameter(
                "BoltStore needs a bolt store configuration".into(),
            )),
        }
    }
}

pub struct BoltConnection {
    graph: Graph,
    _slot: OwnedSemaphorePermit,
}

#[async_trait]
impl GraphStore for BoltStore {
    type Conn = BoltConnection;

    async fn acquire(&self) -> Result<BoltConnection> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::StoreUnavailable("connection pool closed".into()))?;
        Ok(BoltConnection { graph: self.graph.clone(), _slot: slot })
    }
}

#[async_trait]
impl StoreConnection for BoltConnection {
    async fn run(&mut self, query: &ExecutableQuery) -> Result<Vec<Row>> {
        let mut q = neo4rs::query(&query.text);
        for (key, value) in &query.params {
            q = q.param(key, to_bolt(value));
        }

        let layout = columns(&query.plan.pattern);
        let mut stream = self.graph.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(record) = stream.next().await.map_err(classify)? {
            rows.push(decode(&record, layout)?);
        }
        Ok(rows)
    }

    async fn ping(&mut self) -> Result<()> {
        self.graph.run(neo4rs::query("RETURN 1")).await.map_err(classify)
    }
}

// ============================================================================
// Errors
// ============================================================================

fn classify(err: neo4rs::Error) -> Error {
    classify_message(err.to_string())
}

/// Map a driver error by the Neo4j status code it carries. Only errors
/// without a server status, or the server reporting the database itself
/// unavailable, count as connectivity failures.
fn classify_message(message: String) -> Error {
    if message.contains("Neo.ClientError.Transaction.TransactionTimedOut") {
        Error::StoreTimeout(None)
    } else if message.contains("Neo.ClientError.Statement") {
        Error::QueryCompilation(message)
    } else if message.contains("Neo.TransientError.General.DatabaseUnavailable")
        || !message.contains("Neo.")
    {
        Error::StoreUnavailable(message)
    } else {
        Error::StorageError(message)
    }
}

fn decode_error(column: &str, err: impl std::fmt::Display) -> Error {
    Error::StorageError(format!("column '{column}': {err}"))
}

// ============================================================================
// Parameters
// ============================================================================

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Int(i) => BoltType::from(*i),
        Value::Float(f) => BoltType::from(*f),
        Value::String(s) => BoltType::from(s.as_str()),
        Value::List(items) => BoltType::from(items.iter().map(to_bolt).collect::<Vec<BoltType>>()),
        Value::Map(map) => BoltType::from(
            map.iter()
                .map(|(k, v)| (k.clone(), to_bolt(v)))
                .collect::<std::collections::HashMap<String, BoltType>>(),
        ),
        Value::Node(n) => BoltType::from(n.id.0 as i64),
        Value::Relationship(r) => BoltType::from(r.id.0 as i64),
        Value::Path(_) => BoltType::Null(neo4rs::BoltNull),
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Clone, Copy)]
enum Column {
    Node,
    Nodes,
    Relationships,
    Scalar,
}

type Layout = &'static [(&'static str, Column)];

const NEIGHBORHOOD: Layout = &[
    ("n", Column::Node),
    ("relationships", Column::Relationships),
    ("connected_nodes", Column::Nodes),
];

fn columns(pattern: &TraversalPattern) -> Layout {
    match pattern {
        TraversalPattern::FilteredFetch { .. }
        | TraversalPattern::BoundedExpansion { .. }
        | TraversalPattern::NodeDetail { .. } => NEIGHBORHOOD,
        TraversalPattern::CascadingOptions { dimension } => match dimension.source() {
            OptionSource::Entity(_) => &[("id", Column::Scalar), ("name", Column::Scalar)],
            OptionSource::Property(_) | OptionSource::Rating(_) => &[("value", Column::Scalar)],
        },
        TraversalPattern::PathSearch { .. } => &[
            ("path_nodes", Column::Nodes),
            ("path_relationships", Column::Relationships),
            ("weight", Column::Scalar),
        ],
        TraversalPattern::Recommendation { .. } => &[("node", Column::Node), ("score", Column::Scalar)],
        TraversalPattern::InfluenceNetwork { .. } => &[
            ("consultant", Column::Node),
            ("connected_nodes", Column::Nodes),
            ("relationships", Column::Relationships),
        ],
    }
}

fn decode(record: &neo4rs::Row, layout: Layout) -> Result<Row> {
    let mut row = Row::new();
    for &(name, kind) in layout {
        let value = match kind {
            Column::Node => {
                let node: neo4rs::Node = record.get(name).map_err(|e| decode_error(name, e))?;
                Value::from(node_from_bolt(&node)?)
            }
            Column::Nodes => {
                let nodes: Vec<neo4rs::Node> = record.get(name).map_err(|e| decode_error(name, e))?;
                Value::List(
                    nodes
                        .iter()
                        .map(|n| node_from_bolt(n).map(Value::from))
                        .collect::<Result<_>>()?,
                )
            }
            Column::Relationships => {
                let rels: Vec<neo4rs::Relation> = record.get(name).map_err(|e| decode_error(name, e))?;
                Value::List(
                    rels.iter()
                        .map(|r| rel_from_bolt(r).map(Value::from))
                        .collect::<Result<_>>()?,
                )
            }
            Column::Scalar => record.get::<Value>(name).map_err(|e| decode_error(name, e))?,
        };
        row.push(name, value);
    }
    Ok(row)
}

fn node_from_bolt(node: &neo4rs::Node) -> Result<Node> {
    let mut properties = PropertyMap::new();
    for key in node.keys() {
        let value: Value = node.get(key).map_err(|e| decode_error(key, e))?;
        properties.insert(key.to_string(), value);
    }
    Ok(Node {
        id: NodeId(node.id() as u64),
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties,
    })
}

fn rel_from_bolt(rel: &neo4rs::Relation) -> Result<Relationship> {
    let mut properties = PropertyMap::new();
    for key in rel.keys() {
        let value: Value = rel.get(key).map_err(|e| decode_error(key, e))?;
        properties.insert(key.to_string(), value);
    }
    Ok(Relationship {
        id: RelId(rel.id() as u64),
        src: NodeId(rel.start_node_id() as u64),
        dst: NodeId(rel.end_node_id() as u64),
        rel_type: rel.typ().to_string(),
        properties,
    })
}
