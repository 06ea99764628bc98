//! Pooled connection (component C): the wrapper around a physical
//! connection that intercepts the caller-visible `close` and redirects
//! it to the pool, carries the liveness flag, and exposes the
//! timestamps the pool engine's policy decisions depend on.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::driver::{Connection, DriverError};
use crate::error::Error;
use crate::isolation::IsolationLevel;
use crate::pool::PoolInner;

/// The record a pool keeps in its idle/active lists.
///
/// Shared (via `Arc`) with the [`PooledConnectionProxy`] handed to the
/// borrower, so that invalidating a record is instantly visible to the
/// proxy without taking the pool's mutex.
pub(crate) struct RecordCore {
    identity: u64,
    physical: Mutex<Option<Box<dyn Connection>>>,
    valid: AtomicBool,
    created_at: Instant,
    last_used_at: Mutex<Instant>,
    checked_out_at: Mutex<Instant>,
    connection_type_code: AtomicU64,
    pool: Weak<PoolInner>,
}

/// A reference to a [`RecordCore`] as kept in the pool's idle/active
/// lists.
pub(crate) type PooledRecord = Arc<RecordCore>;

impl RecordCore {
    /// Wrap a freshly-opened physical connection.
    pub(crate) fn new(physical: Box<dyn Connection>, pool: Weak<PoolInner>) -> PooledRecord {
        let now = Instant::now();
        let identity = physical.identity();
        Arc::new(Self {
            identity,
            physical: Mutex::new(Some(physical)),
            valid: AtomicBool::new(true),
            created_at: now,
            last_used_at: Mutex::new(now),
            checked_out_at: Mutex::new(now),
            connection_type_code: AtomicU64::new(0),
            pool,
        })
    }

    /// Wrap a physical connection that was transplanted out of
    /// `victim` (an overdue reclaim, or a returned connection being
    /// re-issued to the idle list), preserving `created_at` and
    /// `last_used_at` from the victim per the reclaim/return algorithms.
    pub(crate) fn transplant_from(physical: Box<dyn Connection>, victim: &RecordCore, pool: Weak<PoolInner>) -> PooledRecord {
        let now = Instant::now();
        Arc::new(Self {
            identity: physical.identity(),
            physical: Mutex::new(Some(physical)),
            valid: AtomicBool::new(true),
            created_at: victim.created_at,
            last_used_at: Mutex::new(*victim.last_used_at.lock()),
            checked_out_at: Mutex::new(now),
            connection_type_code: AtomicU64::new(0),
            pool,
        })
    }

    /// Take ownership of the boxed physical connection, leaving this
    /// record with none. Used when transplanting the connection into a
    /// fresh record (reclaim) or physically closing it (drift/overflow).
    pub(crate) fn take_physical(&self) -> Option<Box<dyn Connection>> {
        self.physical.lock().take()
    }

    pub(crate) fn identity(&self) -> u64 {
        self.identity
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub(crate) fn connection_type_code(&self) -> u64 {
        self.connection_type_code.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connection_type_code(&self, code: u64) {
        self.connection_type_code.store(code, Ordering::SeqCst);
    }

    pub(crate) fn touch_checked_out(&self) {
        *self.checked_out_at.lock() = Instant::now();
    }

    pub(crate) fn touch_last_used(&self) {
        *self.last_used_at.lock() = Instant::now();
    }

    pub(crate) fn checked_out_at(&self) -> Instant {
        *self.checked_out_at.lock()
    }

    pub(crate) fn last_used_at(&self) -> Instant {
        *self.last_used_at.lock()
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Run `f` against the physical connection while it is present and
    /// the record is still valid, mapping its absence to a stale-
    /// connection error (it should never be absent while valid, but the
    /// type does not statically rule it out).
    fn with_physical<T>(&self, f: impl FnOnce(&mut dyn Connection) -> Result<T, DriverError>) -> Result<T, DriverError> {
        if !self.is_valid() {
            return Err(Box::new(Error::StaleConnection));
        }
        let mut guard = self.physical.lock();
        match guard.as_mut() {
            Some(physical) => f(physical.as_mut()),
            None => Err(Box::new(Error::StaleConnection)),
        }
    }

    /// Current auto-commit setting, read directly by the pool engine
    /// without going through a [`PooledConnectionProxy`].
    pub(crate) fn auto_commit(&self) -> Result<bool, DriverError> {
        self.with_physical(|c| c.auto_commit())
    }

    /// Roll back the current transaction, invoked by the pool engine on
    /// borrow/return/reclaim for connections left in manual-commit mode.
    pub(crate) fn rollback(&self) -> Result<(), DriverError> {
        self.with_physical(|c| c.rollback())
    }

    /// Run the configured liveness probe statement.
    pub(crate) fn execute(&self, sql: &str) -> Result<(), DriverError> {
        self.with_physical(|c| c.execute(sql))
    }

    /// Whether the physical connection reports itself closed. `true`
    /// if the record has already been invalidated or emptied.
    pub(crate) fn is_closed(&self) -> bool {
        self.with_physical(|c| Ok(c.is_closed())).unwrap_or(true)
    }
}

/// The proxy handed to callers. Implements [`Connection`] by forwarding
/// every method except `close`, which routes back to the owning pool.
pub struct PooledConnectionProxy {
    pub(crate) core: PooledRecord,
}

impl PooledConnectionProxy {
    pub(crate) fn new(core: PooledRecord) -> Self {
        Self { core }
    }

    /// Explicitly invalidate this connection with no other side
    /// effects. A subsequent call through this proxy (other than
    /// `close`) fails with [`Error::StaleConnection`].
    pub fn invalidate(&self) {
        self.core.invalidate();
    }

    /// Whether the underlying record is still considered live.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.core.is_valid()
    }

    /// Time since the underlying physical connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.core.created_at().elapsed()
    }

    /// Time since this connection was last used (borrowed or returned).
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.core.last_used_at().elapsed()
    }

    /// Time since this connection was checked out of the pool.
    #[must_use]
    pub fn checkout_time(&self) -> Duration {
        self.core.checked_out_at().elapsed()
    }

    /// The underlying physical connection's identity fingerprint.
    #[must_use]
    pub fn real_identity(&self) -> u64 {
        self.core.identity()
    }

    /// Whether `other` is the same physical connection as this proxy.
    #[must_use]
    pub fn matches_physical(&self, other: &dyn Connection) -> bool {
        self.core.identity() == other.identity()
    }
}

impl fmt::Debug for PooledConnectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionProxy")
            .field("identity", &self.core.identity())
            .field("valid", &self.core.is_valid())
            .finish()
    }
}

impl PartialEq for PooledConnectionProxy {
    fn eq(&self, other: &Self) -> bool {
        self.core.identity() == other.core.identity()
    }
}

impl Eq for PooledConnectionProxy {}

impl Hash for PooledConnectionProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.identity().hash(state);
    }
}

impl Connection for PooledConnectionProxy {
    fn auto_commit(&self) -> Result<bool, DriverError> {
        self.core.with_physical(|c| c.auto_commit())
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.set_auto_commit(auto_commit))
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.set_transaction_isolation(level))
    }

    fn set_network_timeout(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.set_network_timeout(timeout))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.commit())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.rollback())
    }

    /// Does not touch the physical connection: releases this record
    /// back to the owning pool. Always succeeds from the caller's
    /// point of view — driver errors encountered while the pool
    /// processes the return are swallowed and reflected only in
    /// statistics.
    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(pool) = self.core.pool.upgrade() {
            pool.release(self.core.clone());
        } else {
            // The pool itself is gone; nothing to return to.
            self.core.invalidate();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.core.with_physical(|c| Ok(c.is_closed())).unwrap_or(true)
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.core.with_physical(|c| c.execute(sql))
    }

    fn identity(&self) -> u64 {
        self.core.identity()
    }
}
