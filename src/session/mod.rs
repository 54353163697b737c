//! # Graph Session
//!
//! Scoped access to a store for one traversal operation. Every call
//! acquires its own connection, runs exactly one query and lets the
//! connection go on every exit path. No retries happen here.

use std::time::Duration;

use tracing::{debug, warn};

use crate::execution::Row;
use crate::query::ExecutableQuery;
use crate::storage::{GraphStore, StoreConnection};
use crate::{Error, Result};

/// Per-operation handle over a store.
pub struct GraphSession<'s, S: GraphStore> {
    store: &'s S,
    timeout: Option<Duration>,
}

impl<'s, S: GraphStore> GraphSession<'s, S> {
    pub fn new(store: &'s S, timeout: Option<Duration>) -> Self {
        Self { store, timeout }
    }

    /// Execute one query and collect its rows.
    ///
    /// The connection is owned by this future: it is dropped when the call
    /// returns, fails, times out, or when the caller drops the future.
    pub async fn execute(&self, query: &ExecutableQuery) -> Result<Vec<Row>> {
        let pattern = query.pattern_name();
        debug!(pattern, bindings = query.params.len(), "executing graph query");

        let mut conn = self.store.acquire().await.inspect_err(|e| {
            warn!(pattern, error = %e, "graph store unavailable");
        })?;

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.run(query)).await {
                Ok(result) => result,
                Err(_) => Err(Error::StoreTimeout(Some(limit))),
            },
            None => conn.run(query).await,
        };
        drop(conn);

        match &result {
            Ok(rows) => debug!(pattern, rows = rows.len(), "graph query complete"),
            Err(e) => warn!(pattern, error = %e, "graph query failed"),
        }
        result
    }

    /// Connectivity check: one round-trip to the store under the same
    /// timeout as a query.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.store.acquire().await?;
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, conn.ping())
                .await
                .unwrap_or(Err(Error::StoreTimeout(Some(limit)))),
            None => conn.ping().await,
        };
        if let Err(e) = &result {
            warn!(error = %e, "graph store ping failed");
        }
        result
    }
}
