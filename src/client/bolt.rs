//! Bolt driver over `neo4rs`.

use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::{BoltNull, BoltType, ConfigBuilder, Graph, Query, Txn};
use serde_json::Value;

use crate::client::driver::{AccessMode, DriverError, GraphDriver, GraphTransaction, Row};
use crate::config::ConnectionConfig;
use crate::query::CompiledQuery;

/// Production driver talking Bolt to a Neo4j cluster.
#[derive(Clone)]
pub struct BoltDriver {
    graph: Graph,
}

impl BoltDriver {
    /// Connects using the `[connection]` configuration section.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DriverError> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections);
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let settings = builder.build().map_err(classify)?;
        let graph = Graph::connect(settings).await.map_err(classify)?;
        tracing::info!(uri = %config.uri, "client.bolt.connected");
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphDriver for BoltDriver {
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn GraphTransaction>, DriverError> {
        let txn = self.graph.start_txn().await.map_err(classify)?;
        tracing::trace!(%mode, "client.bolt.begin");
        Ok(Box::new(BoltTransaction { txn }))
    }
}

struct BoltTransaction {
    txn: Txn,
}

#[async_trait]
impl GraphTransaction for BoltTransaction {
    async fn run(&mut self, query: &CompiledQuery) -> Result<Vec<Row>, DriverError> {
        let mut stream = self.txn.execute(to_query(query)).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await.map_err(classify)? {
            let row: Row = row
                .to()
                .map_err(|err| DriverError::query(format!("row decode failed: {err}")))?;
            rows.push(row);
        }
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.txn.rollback().await.map_err(classify)
    }
}

fn to_query(compiled: &CompiledQuery) -> Query {
    compiled
        .params
        .iter()
        .fold(neo4rs::query(&compiled.text), |query, (name, value)| {
            query.param(name, to_bolt(value))
        })
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(flag) => BoltType::from(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) => BoltType::from(int),
            None => BoltType::from(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => BoltType::from(text.as_str()),
        Value::Array(items) => BoltType::from(items.iter().map(to_bolt).collect::<Vec<_>>()),
        Value::Object(map) => BoltType::from(
            map.iter()
                .map(|(key, value)| (key.clone(), to_bolt(value)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}

/// Maps a `neo4rs` failure onto the retry classes.
fn classify(err: neo4rs::Error) -> DriverError {
    let detail = format!("{err:?}");
    if detail.contains("TransientError") || detail.contains("Transient") {
        DriverError::transient(err.to_string())
    } else if detail.contains("IOError")
        || detail.contains("ConnectionError")
        || detail.contains("ConnectionRefused")
    {
        DriverError::connection(err.to_string())
    } else {
        DriverError::query(err.to_string())
    }
}
