#![forbid(unsafe_code)]

//! Execution client: session pool, read/write transactions, retries and
//! atomic batches over a [`GraphDriver`].

/// Bolt driver backed by `neo4rs`.
#[cfg(feature = "neo4j")]
pub mod bolt;

/// Driver seam.
pub mod driver;

/// Session pool.
pub mod pool;

/// Write retry policy.
pub mod retry;

/// In-process scripted driver.
pub mod scripted;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

#[cfg(feature = "neo4j")]
pub use bolt::BoltDriver;
pub use driver::{AccessMode, DriverError, DriverErrorKind, GraphDriver, GraphTransaction, Row};
pub use pool::{SessionPermit, SessionPool};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use scripted::{Event, ScriptedDriver};

use crate::error::{GraphError, Result};
use crate::pagination::{count_statement, Cursor, TOTAL_COLUMN};
use crate::query::{CompiledQuery, Statement};
use crate::schema::DescriptorRegistry;

/// Pool and retry knobs for [`ExecutionClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Maximum concurrently open sessions.
    pub max_connections: usize,
    /// Longest wait for a free session.
    pub acquire_timeout: Duration,
    /// Write retry policy.
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Duration::from_millis(5_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Rows of one page together with the count query's total.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRows {
    /// Data rows.
    pub rows: Vec<Row>,
    /// Total matching rows, when the statement supports counting.
    pub total: Option<u64>,
}

/// Runs compiled statements against the database.
pub struct ExecutionClient {
    driver: Arc<dyn GraphDriver>,
    pool: SessionPool,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    open_writes: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ExecutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionClient")
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .field("open_writes", &self.open_write_sessions())
            .finish()
    }
}

/// Counts a write session for as long as it lives.
struct WriteSessionGuard {
    counter: Arc<AtomicUsize>,
}

impl WriteSessionGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for WriteSessionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ExecutionClient {
    /// Client over `driver` with real sleeps between retries.
    pub fn new(driver: Arc<dyn GraphDriver>, options: ClientOptions) -> Self {
        Self {
            driver,
            pool: SessionPool::new(options.max_connections, options.acquire_timeout),
            retry: options.retry,
            sleeper: Arc::new(TokioSleeper),
            open_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the clock used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Session pool, for introspection.
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Retry policy in force.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Write sessions open right now.
    pub fn open_write_sessions(&self) -> usize {
        self.open_writes.load(Ordering::SeqCst)
    }

    /// One read transaction. Failures are reported immediately.
    pub async fn read(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        let _permit = self.pool.acquire().await?;
        let started = Instant::now();
        match run_once(self.driver.as_ref(), AccessMode::Read, query).await {
            Ok(rows) => {
                debug!(
                    entity = query.entity_label(),
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    statement = %query.text,
                    "client.read.ok"
                );
                Ok(rows)
            }
            Err(source) => {
                warn!(
                    entity = query.entity_label(),
                    error = %source,
                    "client.read.failed"
                );
                Err(GraphError::ReadExecution {
                    entity: query.entity_label().to_owned(),
                    query: query.text.clone(),
                    source,
                })
            }
        }
    }

    /// One write transaction, retried on transient and connection failures.
    pub async fn write(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = {
                let _permit = self.pool.acquire().await?;
                let _session = WriteSessionGuard::open(&self.open_writes);
                debug!(
                    entity = query.entity_label(),
                    attempt,
                    open_write_sessions = self.open_write_sessions(),
                    statement = %query.text,
                    "client.write.start"
                );
                run_once(self.driver.as_ref(), AccessMode::Write, query).await
            };
            match outcome {
                Ok(rows) => return Ok(rows),
                Err(source) if self.retry.should_retry(attempt, &source) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        entity = query.entity_label(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "client.write.retry"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(source) => {
                    warn!(
                        entity = query.entity_label(),
                        attempts = attempt,
                        error = %source,
                        "client.write.failed"
                    );
                    return Err(GraphError::WriteExecution {
                        entity: query.entity_label().to_owned(),
                        query: query.text.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Runs a paginated statement and its derived count concurrently.
    pub async fn read_page(&self, statement: &Statement, cursor: &Cursor) -> Result<PageRows> {
        let data = statement.render_window(&cursor.window()?);
        let count = count_statement(statement).map(|count| count.render());
        let total = async {
            match &count {
                Some(query) => self.read(query).await.and_then(|rows| total_of(&rows)).map(Some),
                None => Ok(None),
            }
        };
        let (rows, total) = tokio::try_join!(self.read(&data), total)?;
        Ok(PageRows { rows, total })
    }

    /// Runs every statement in one write transaction; all or nothing.
    pub async fn execute_in_transaction(&self, queries: &[CompiledQuery]) -> Result<Vec<Vec<Row>>> {
        let _permit = self.pool.acquire().await?;
        let _session = WriteSessionGuard::open(&self.open_writes);
        let mut tx = self
            .driver
            .begin(AccessMode::Write)
            .await
            .map_err(|source| GraphError::TransactionRollback { index: 0, source })?;
        let mut results = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            match tx.run(query).await {
                Ok(rows) => results.push(rows),
                Err(source) => {
                    if let Err(err) = tx.rollback().await {
                        debug!(error = %err, "client.rollback.failed");
                    }
                    warn!(
                        entity = query.entity_label(),
                        index,
                        statements = queries.len(),
                        error = %source,
                        "client.batch.rolled_back"
                    );
                    return Err(GraphError::TransactionRollback { index, source });
                }
            }
        }
        tx.commit()
            .await
            .map_err(|source| GraphError::TransactionRollback {
                index: queries.len(),
                source,
            })?;
        debug!(statements = queries.len(), "client.batch.committed");
        Ok(results)
    }

    /// Applies every constraint and index statement of `registry`, one write each.
    pub async fn apply_schema(&self, registry: &DescriptorRegistry) -> Result<usize> {
        let statements = registry.ddl();
        for text in &statements {
            self.write(&CompiledQuery::raw(text.clone())).await?;
        }
        tracing::info!(statements = statements.len(), "client.schema.applied");
        Ok(statements.len())
    }
}

async fn run_once(
    driver: &dyn GraphDriver,
    mode: AccessMode,
    query: &CompiledQuery,
) -> std::result::Result<Vec<Row>, DriverError> {
    let mut tx = driver.begin(mode).await?;
    match tx.run(query).await {
        Ok(rows) => {
            tx.commit().await?;
            Ok(rows)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                debug!(error = %rollback, "client.rollback.failed");
            }
            Err(err)
        }
    }
}

fn total_of(rows: &[Row]) -> Result<u64> {
    rows.first()
        .and_then(|row| row.get(TOTAL_COLUMN))
        .and_then(Value::as_u64)
        .ok_or_else(|| GraphError::mapping("count query returned no total"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn total_row(total: u64) -> Vec<Row> {
        vec![json!({ "total": total }).as_object().cloned().unwrap_or_default()]
    }

    #[tokio::test]
    async fn write_retries_transient_failures_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let driver = ScriptedDriver::new(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DriverError::transient("deadlock"))
            } else {
                Ok(Vec::new())
            }
        });
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = ExecutionClient::new(Arc::new(driver.clone()), ClientOptions::default())
            .with_sleeper(sleeper.clone());
        client
            .write(&CompiledQuery::raw("CREATE (n)"))
            .await
            .expect("third attempt succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(driver.rollbacks(), 2);
        assert_eq!(driver.open_transactions(), 0);
        assert_eq!(client.open_write_sessions(), 0);
    }

    #[tokio::test]
    async fn total_is_read_from_the_count_row() {
        assert_eq!(total_of(&total_row(30)).expect("total"), 30);
        assert!(total_of(&[]).is_err());
    }
}
