//! In-process driver whose answers come from a closure.
//!
//! Used by the test suites and by `penumbra explain`-style dry runs: every
//! statement, commit and rollback is recorded so callers can assert on the
//! exact traffic a repository call produced.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::driver::{AccessMode, DriverError, GraphDriver, GraphTransaction, Row};
use crate::query::CompiledQuery;

/// Answers one statement.
pub type Handler =
    Arc<dyn Fn(&CompiledQuery, AccessMode) -> Result<Vec<Row>, DriverError> + Send + Sync>;

/// Traffic observed by a [`ScriptedDriver`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A transaction was opened.
    Begin(AccessMode),
    /// A statement ran.
    Run(AccessMode, CompiledQuery),
    /// The transaction committed.
    Commit(AccessMode),
    /// The transaction rolled back.
    Rollback(AccessMode),
}

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<Event>>,
    open: AtomicUsize,
    begin_failures: Mutex<Vec<DriverError>>,
}

/// Driver backed by a handler closure.
#[derive(Clone)]
pub struct ScriptedDriver {
    handler: Handler,
    shared: Arc<Shared>,
}

impl ScriptedDriver {
    /// Driver that answers every statement with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CompiledQuery, AccessMode) -> Result<Vec<Row>, DriverError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Driver that returns no rows for anything.
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    /// Makes the next `begin` calls fail with these errors, in order.
    pub fn fail_begin_with(&self, errors: impl IntoIterator<Item = DriverError>) {
        let mut queue = self.shared.begin_failures.lock();
        queue.extend(errors);
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.shared.log.lock().clone()
    }

    /// Statements that ran, in order.
    pub fn statements(&self) -> Vec<CompiledQuery> {
        self.shared
            .log
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Run(_, query) => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of commits observed.
    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    /// Number of rollbacks observed.
    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    /// Transactions begun but neither committed nor rolled back.
    pub fn open_transactions(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Forgets recorded traffic.
    pub fn clear(&self) {
        self.shared.log.lock().clear();
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.shared.log.lock().iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl GraphDriver for ScriptedDriver {
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn GraphTransaction>, DriverError> {
        {
            let mut failures = self.shared.begin_failures.lock();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        self.shared.log.lock().push(Event::Begin(mode));
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransaction {
            mode,
            handler: Arc::clone(&self.handler),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedTransaction {
    mode: AccessMode,
    handler: Handler,
    shared: Arc<Shared>,
}

impl ScriptedTransaction {
    fn finish(&self, event: Event) {
        self.shared.log.lock().push(event);
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphTransaction for ScriptedTransaction {
    async fn run(&mut self, query: &CompiledQuery) -> Result<Vec<Row>, DriverError> {
        self.shared
            .log
            .lock()
            .push(Event::Run(self.mode, query.clone()));
        (self.handler)(query, self.mode)
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.finish(Event::Commit(self.mode));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.finish(Event::Rollback(self.mode));
        Ok(())
    }
}
