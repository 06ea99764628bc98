//! An in-memory driver double used by this crate's own test suite.
//!
//! Exposed (behind the `test-util` feature) so integration tests —
//! both this crate's and a downstream crate's — can exercise the pool,
//! the proxy, and the transaction layer without a live database.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::driver::{Connection, Driver, DriverError, Properties};
use crate::isolation::IsolationLevel;

/// Shared counters and failure injection knobs for a [`FakeDriver`] and
/// the connections it creates.
#[derive(Default)]
pub struct FakeDriverState {
    next_id: AtomicU64,
    /// Number of physical connections ever opened.
    pub opens: AtomicU32,
    /// Number of physical connections ever closed.
    pub closes: AtomicU32,
    /// When set, `connect` fails.
    pub fail_connect: AtomicBool,
    /// When set, every connection's `execute` (the ping probe) fails.
    pub fail_execute: AtomicBool,
    /// When set, every connection's `commit` fails.
    pub fail_commit: AtomicBool,
}

/// A driver that hands out [`FakeConnection`]s backed by nothing but
/// process memory.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<FakeDriverState>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            state: Arc::new(FakeDriverState::default()),
        }
    }
}

impl FakeDriver {
    /// Create a driver sharing failure-injection state with its clones.
    #[must_use]
    pub fn new(state: Arc<FakeDriverState>) -> Self {
        Self { state }
    }

    /// The shared state, for assertions and failure injection from a
    /// test.
    #[must_use]
    pub fn state(&self) -> Arc<FakeDriverState> {
        self.state.clone()
    }
}

impl Driver for FakeDriver {
    fn connect(&self, _url: &str, _properties: &Properties) -> Result<Box<dyn Connection>, DriverError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Box::from("fake driver configured to fail connect"));
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            id,
            closed: false,
            auto_commit: true,
            isolation: None,
            network_timeout: None,
            commit_calls: 0,
            rollback_calls: 0,
            execute_calls: Vec::new(),
            state: self.state.clone(),
        }))
    }
}

/// An in-memory stand-in for a physical connection.
pub struct FakeConnection {
    id: u64,
    closed: bool,
    auto_commit: bool,
    isolation: Option<IsolationLevel>,
    network_timeout: Option<Duration>,
    commit_calls: u32,
    rollback_calls: u32,
    execute_calls: Vec<String>,
    state: Arc<FakeDriverState>,
}

impl FakeConnection {
    /// Number of times `commit` has been called.
    #[must_use]
    pub fn commit_calls(&self) -> u32 {
        self.commit_calls
    }

    /// Number of times `rollback` has been called.
    #[must_use]
    pub fn rollback_calls(&self) -> u32 {
        self.rollback_calls
    }

    /// The SQL strings passed to `execute`, in order.
    #[must_use]
    pub fn execute_calls(&self) -> &[String] {
        &self.execute_calls
    }

    /// The isolation level last set, if any.
    #[must_use]
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// The network timeout last set, if any.
    #[must_use]
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout
    }
}

impl Connection for FakeConnection {
    fn auto_commit(&self) -> Result<bool, DriverError> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError> {
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), DriverError> {
        self.isolation = Some(level);
        Ok(())
    }

    fn set_network_timeout(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.network_timeout = Some(timeout);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.commit_calls += 1;
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(Box::from("fake driver configured to fail commit"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.rollback_calls += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.execute_calls.push(sql.to_string());
        if self.state.fail_execute.load(Ordering::SeqCst) {
            return Err(Box::from("fake driver configured to fail execute"));
        }
        Ok(())
    }

    fn identity(&self) -> u64 {
        self.id
    }
}
