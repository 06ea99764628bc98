//! Pool engine (component D): owns the idle/active sets, the single
//! mutex and condition variable, the borrow/return algorithm, the
//! overdue-reclaim policy, the ping-based liveness check, and the
//! pool-wide statistics.
//!
//! This is the dominant component of the crate. Driver calls made
//! while the pool's mutex is held (physical open, rollback, close) are
//! a conscious simplification: an implementation is free to release
//! the mutex around those calls provided it rechecks list invariants
//! before mutating state again, but this crate does not take that
//! optimization — see `DESIGN.md`.

mod config;
mod state;
mod stats;

pub use config::PoolConfig;
pub use stats::PoolStatistics;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::driver::DriverGateway;
use crate::error::Error;
use crate::fingerprint::connection_type_code;
use crate::pooled::{PooledConnectionProxy, PooledRecord, RecordCore};
use crate::unpooled::{DriverConfig, UnpooledDataSource};

/// A blocking, thread-safe connection pool.
///
/// Cloning a `Pool` is cheap (it is a thin handle over a shared inner
/// state) and clones share the same idle/active sets.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    gateway: Arc<DriverGateway>,
    driver_config: Mutex<DriverConfig>,
    pool_config: Mutex<PoolConfig>,
    expected_connection_type_code: AtomicU64,
    state: Mutex<state::PoolState>,
    cond: Condvar,
    self_ref: Weak<PoolInner>,
}

impl Pool {
    /// Build a pool over a driver gateway, the connection identity it
    /// should use, and its capacity/policy configuration.
    ///
    /// The driver named by `driver_config.driver_class` must already be
    /// registered on `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<DriverGateway>, driver_config: DriverConfig, pool_config: PoolConfig) -> Self {
        let code = connection_type_code(
            &driver_config.url,
            driver_config.username.as_deref(),
            driver_config.password.as_deref(),
        );
        let inner = Arc::new_cyclic(|self_ref| PoolInner {
            gateway,
            driver_config: Mutex::new(driver_config),
            pool_config: Mutex::new(pool_config),
            expected_connection_type_code: AtomicU64::new(code),
            state: Mutex::new(state::PoolState::new()),
            cond: Condvar::new(),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Borrow a logical connection, blocking the calling thread until
    /// one is available or the local retry budget is exhausted.
    ///
    /// `username`/`password` override the pool's configured defaults
    /// for this call only, exactly as [`crate::unpooled::UnpooledDataSource::open`] does.
    pub fn borrow(&self, username: Option<&str>, password: Option<&str>) -> Result<PooledConnectionProxy, Error> {
        self.inner.borrow(username, password, None)
    }

    /// Borrow a logical connection, same as [`Pool::borrow`], but abort
    /// early if `cancel` is set to `true` while the call is waiting for
    /// a connection to free up.
    ///
    /// Rust has no equivalent of interrupting a blocked thread, so this
    /// is the cooperative substitute: a waiter must be polling `cancel`
    /// from elsewhere (a timeout thread, a signal handler) for it to have
    /// any effect. Returns [`Error::PoolExhausted`] if cancelled.
    pub fn borrow_cancellable(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<PooledConnectionProxy, Error> {
        self.inner.borrow(username, password, Some(cancel))
    }

    /// Invalidate and drop every connection the pool knows about, idle
    /// or active. Active connections already in a caller's hands are
    /// invalidated in place: their next non-`close` call fails with
    /// [`Error::StaleConnection`], and their eventual `close` is steered
    /// to a physical close by the type-code check in `release`.
    pub fn force_close_all(&self) {
        self.inner.force_close_all();
    }

    /// Current statistics, captured atomically under the pool's mutex.
    #[must_use]
    pub fn status(&self) -> PoolStatistics {
        self.inner.status()
    }

    /// Set the connection URL. Flushes the pool.
    pub fn set_url(&self, url: impl Into<String>) {
        self.inner.reconfigure_driver(|c| c.url = url.into());
    }

    /// Set the default username. Flushes the pool.
    pub fn set_username(&self, username: Option<String>) {
        self.inner.reconfigure_driver(|c| c.username = username);
    }

    /// Set the default password. Flushes the pool.
    pub fn set_password(&self, password: Option<String>) {
        self.inner.reconfigure_driver(|c| c.password = password);
    }

    /// Set the registered driver class name to connect through. Flushes the pool.
    pub fn set_driver_class(&self, driver_class: impl Into<String>) {
        self.inner.reconfigure_driver(|c| c.driver_class = driver_class.into());
    }

    /// Replace the driver property bag. Flushes the pool.
    pub fn set_driver_properties(&self, properties: crate::driver::Properties) {
        self.inner.reconfigure_driver(|c| c.driver_properties = properties);
    }

    /// Set the default auto-commit applied to new connections. Flushes the pool.
    pub fn set_auto_commit(&self, auto_commit: Option<bool>) {
        self.inner.reconfigure_driver(|c| c.auto_commit = auto_commit);
    }

    /// Set the default transaction isolation applied to new connections. Flushes the pool.
    pub fn set_default_transaction_isolation_level(&self, level: Option<crate::isolation::IsolationLevel>) {
        self.inner.reconfigure_driver(|c| c.default_transaction_isolation_level = level);
    }

    /// Set the default network timeout applied to new connections. Flushes the pool.
    pub fn set_default_network_timeout(&self, timeout: Option<Duration>) {
        self.inner.reconfigure_driver(|c| c.default_network_timeout = timeout);
    }

    /// Set `poolMaximumActiveConnections`. Flushes the pool.
    pub fn set_max_active(&self, value: u32) {
        self.inner.reconfigure_pool(|c| c.max_active = value);
    }

    /// Set `poolMaximumIdleConnections`. Flushes the pool.
    pub fn set_max_idle(&self, value: u32) {
        self.inner.reconfigure_pool(|c| c.max_idle = value);
    }

    /// Set `poolMaximumCheckoutTime`. Flushes the pool.
    pub fn set_max_checkout_time(&self, value: Duration) {
        self.inner.reconfigure_pool(|c| c.max_checkout_time = value);
    }

    /// Set `poolTimeToWait`. Flushes the pool.
    pub fn set_time_to_wait(&self, value: Duration) {
        self.inner.reconfigure_pool(|c| c.time_to_wait = value);
    }

    /// Set `poolMaximumLocalBadConnectionTolerance`. Flushes the pool.
    pub fn set_max_local_bad_connection_tolerance(&self, value: u32) {
        self.inner.reconfigure_pool(|c| c.max_local_bad_connection_tolerance = value);
    }

    /// Set `poolPingQuery`. Flushes the pool.
    pub fn set_ping_query(&self, value: impl Into<String>) {
        self.inner.reconfigure_pool(|c| c.ping_query = value.into());
    }

    /// Set `poolPingEnabled`. Flushes the pool.
    pub fn set_ping_enabled(&self, value: bool) {
        self.inner.reconfigure_pool(|c| c.ping_enabled = value);
    }

    /// Set `poolPingConnectionsNotUsedFor`. Flushes the pool.
    pub fn set_ping_connections_not_used_for(&self, value: Duration) {
        self.inner.reconfigure_pool(|c| c.ping_connections_not_used_for = value);
    }

    /// The driver gateway this pool opens connections through.
    #[must_use]
    pub fn gateway(&self) -> Arc<DriverGateway> {
        self.inner.gateway.clone()
    }

    /// A snapshot of the current driver configuration.
    #[must_use]
    pub fn driver_config(&self) -> DriverConfig {
        self.inner.driver_config.lock().clone()
    }

    /// A snapshot of the current pool configuration.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        self.inner.pool_config.lock().clone()
    }
}

impl PoolInner {
    fn reconfigure_driver(&self, mutate: impl FnOnce(&mut DriverConfig)) {
        {
            let mut driver_config = self.driver_config.lock();
            mutate(&mut driver_config);
            let code = connection_type_code(
                &driver_config.url,
                driver_config.username.as_deref(),
                driver_config.password.as_deref(),
            );
            self.expected_connection_type_code.store(code, Ordering::SeqCst);
        }
        self.force_close_all();
    }

    fn reconfigure_pool(&self, mutate: impl FnOnce(&mut PoolConfig)) {
        {
            let mut pool_config = self.pool_config.lock();
            mutate(&mut pool_config);
        }
        self.force_close_all();
    }

    fn open_new_physical(&self, username: Option<&str>, password: Option<&str>) -> Result<Box<dyn crate::driver::Connection>, Error> {
        let driver_config = self.driver_config.lock().clone();
        let source = UnpooledDataSource::new(self.gateway.clone(), driver_config);
        source.open(username, password)
    }

    fn borrow(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        cancel: Option<&std::sync::atomic::AtomicBool>,
    ) -> Result<PooledConnectionProxy, Error> {
        let call_start = Instant::now();
        let pool_config = self.pool_config.lock().clone();

        let effective_code = {
            let driver_config = self.driver_config.lock();
            connection_type_code(
                &driver_config.url,
                username.or(driver_config.username.as_deref()),
                password.or(driver_config.password.as_deref()),
            )
        };

        let mut bad_count: u32 = 0;
        let mut waited_already = false;
        let mut guard = self.state.lock();

        loop {
            if let Some(cancel) = cancel {
                if cancel.load(Ordering::SeqCst) {
                    tracing::debug!("borrow cancelled by caller while waiting");
                    return Err(Error::PoolExhausted {
                        bad_connection_attempts: bad_count,
                    });
                }
            }

            let candidate: PooledRecord = if let Some(record) = guard.idle.pop_front() {
                record
            } else if (guard.active.len() as u32) < pool_config.max_active {
                let physical = self.open_new_physical(username, password)?;
                RecordCore::new(physical, self.self_ref.clone())
            } else {
                let oldest = match guard.active.front() {
                    Some(record) => record.clone(),
                    None => {
                        // max_active == 0 is rejected by PoolConfig::validate, so
                        // this branch is only reachable with an empty active list
                        // and zero capacity, which cannot happen here.
                        return Err(Error::PoolExhausted { bad_connection_attempts: 0 });
                    }
                };
                let overdue_for = oldest.checked_out_at().elapsed();
                if overdue_for > pool_config.max_checkout_time {
                    guard.active.pop_front();
                    guard.counters.overdue_count += 1;
                    guard.counters.accumulated_overdue_checkout_time += overdue_for;
                    guard.counters.accumulated_checkout_time += overdue_for;
                    tracing::debug!(checkout_time = ?overdue_for, "reclaiming overdue connection");

                    match oldest.take_physical() {
                        Some(mut physical) => {
                            let is_auto_commit = physical.auto_commit().unwrap_or(true);
                            if !is_auto_commit {
                                if let Err(error) = physical.rollback() {
                                    tracing::warn!(%error, "rollback on overdue reclaim failed; continuing");
                                }
                            }
                            let fresh = RecordCore::transplant_from(physical, &oldest, self.self_ref.clone());
                            oldest.invalidate();
                            fresh
                        }
                        None => {
                            oldest.invalidate();
                            continue;
                        }
                    }
                } else {
                    if !waited_already {
                        guard.counters.had_to_wait_count += 1;
                        waited_already = true;
                    }
                    let wait_start = Instant::now();
                    let _ = self.cond.wait_for(&mut guard, pool_config.time_to_wait);
                    guard.counters.accumulated_wait_time += wait_start.elapsed();
                    continue;
                }
            };

            if !self.validate(&candidate, &pool_config) {
                guard.counters.bad_connection_count += 1;
                if let Some(mut physical) = candidate.take_physical() {
                    let _ = physical.close();
                }
                candidate.invalidate();
                bad_count += 1;
                if bad_count > pool_config.max_idle + pool_config.max_local_bad_connection_tolerance {
                    return Err(Error::PoolExhausted {
                        bad_connection_attempts: bad_count,
                    });
                }
                continue;
            }

            if !candidate.auto_commit().unwrap_or(true) {
                if let Err(error) = candidate.rollback() {
                    tracing::warn!(%error, "rollback on borrow failed; continuing");
                }
            }
            candidate.set_connection_type_code(effective_code);
            candidate.touch_checked_out();
            candidate.touch_last_used();
            guard.active.push_back(candidate.clone());
            guard.counters.request_count += 1;
            guard.counters.accumulated_request_time += call_start.elapsed();
            guard.debug_check_invariants(&pool_config);
            drop(guard);
            return Ok(PooledConnectionProxy::new(candidate));
        }
    }

    /// Invoked by [`PooledConnectionProxy::close`]. Never surfaces a
    /// driver error to the caller; statistics are updated regardless.
    pub(crate) fn release(&self, record: PooledRecord) {
        let pool_config = self.pool_config.lock().clone();
        let mut guard = self.state.lock();

        let Some(position) = guard.active.iter().position(|r| Arc::ptr_eq(r, &record)) else {
            // Either already returned (second close on the same proxy) or
            // reclaimed out from under the caller; either way, a no-op.
            return;
        };
        guard.active.remove(position);

        if !record.is_valid() || !self.validate(&record, &pool_config) {
            guard.counters.bad_connection_count += 1;
            if let Some(mut physical) = record.take_physical() {
                let _ = physical.close();
            }
            record.invalidate();
            guard.debug_check_invariants(&pool_config);
            return;
        }

        let checkout_duration = record.checked_out_at().elapsed();
        guard.counters.accumulated_checkout_time += checkout_duration;

        let expected_code = self.expected_connection_type_code.load(Ordering::SeqCst);
        let fits_in_idle = (guard.idle.len() as u32) < pool_config.max_idle;
        let identity_matches = record.connection_type_code() == expected_code;

        if !record.auto_commit().unwrap_or(true) {
            let rollback_result = record.rollback();
            if let Err(error) = rollback_result {
                // Resolved Open Question (a): swallow-and-log. A caller
                // closing a connection must never observe a failure.
                tracing::warn!(%error, "rollback on return failed; connection still processed per configured policy");
            }
        }

        if fits_in_idle && identity_matches {
            match record.take_physical() {
                Some(physical) => {
                    record.invalidate();
                    let fresh = RecordCore::transplant_from(physical, &record, self.self_ref.clone());
                    guard.idle.push_back(fresh);
                    guard.debug_check_invariants(&pool_config);
                    drop(guard);
                    self.cond.notify_one();
                }
                None => {
                    record.invalidate();
                }
            }
        } else {
            if let Some(mut physical) = record.take_physical() {
                let _ = physical.close();
            }
            record.invalidate();
            guard.debug_check_invariants(&pool_config);
        }
    }

    fn force_close_all(&self) {
        let mut guard = self.state.lock();
        for record in guard.idle.drain(..) {
            if let Some(mut physical) = record.take_physical() {
                let _ = physical.close();
            }
            record.invalidate();
        }
        for record in guard.active.drain(..) {
            if let Some(mut physical) = record.take_physical() {
                let _ = physical.close();
            }
            record.invalidate();
        }
        drop(guard);
        self.cond.notify_all();
        tracing::info!("pool flushed: all connections invalidated");
    }

    /// Liveness probe, shared by `borrow` (before handing a candidate to
    /// the caller) and `release` (before a returned connection is placed
    /// back into `idle`). `true` means the candidate is live; `false`
    /// means it has already been closed and invalidated.
    fn validate(&self, candidate: &PooledRecord, pool_config: &PoolConfig) -> bool {
        if candidate.is_closed() {
            return false;
        }
        let should_ping = pool_config.ping_enabled
            && candidate.last_used_at().elapsed() >= pool_config.ping_connections_not_used_for;
        if !should_ping {
            return true;
        }
        let probe: Result<(), crate::driver::DriverError> = (|| {
            candidate.execute(&pool_config.ping_query)?;
            if !candidate.auto_commit()? {
                candidate.rollback()?;
            }
            Ok(())
        })();
        match probe {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(%error, "ping probe failed; closing connection");
                if let Some(mut physical) = candidate.take_physical() {
                    let _ = physical.close();
                }
                candidate.invalidate();
                false
            }
        }
    }

    fn status(&self) -> PoolStatistics {
        let pool_config = self.pool_config.lock().clone();
        let guard = self.state.lock();
        PoolStatistics {
            idle_count: guard.idle.len() as u32,
            active_count: guard.active.len() as u32,
            max_active: pool_config.max_active,
            max_idle: pool_config.max_idle,
            request_count: guard.counters.request_count,
            accumulated_request_time: guard.counters.accumulated_request_time,
            accumulated_checkout_time: guard.counters.accumulated_checkout_time,
            overdue_count: guard.counters.overdue_count,
            accumulated_overdue_checkout_time: guard.counters.accumulated_overdue_checkout_time,
            accumulated_wait_time: guard.counters.accumulated_wait_time,
            had_to_wait_count: guard.counters.had_to_wait_count,
            bad_connection_count: guard.counters.bad_connection_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverGateway;
    use crate::testing::FakeDriver;
    use crate::unpooled::DriverConfig;
    use std::collections::HashMap;
    use std::thread;

    fn make_pool(pool_config: PoolConfig) -> (Pool, Arc<crate::testing::FakeDriverState>) {
        let gateway = Arc::new(DriverGateway::new());
        let driver = FakeDriver::default();
        let state = driver.state();
        gateway.register("fake", Arc::new(driver));
        let driver_config = DriverConfig {
            driver_class: "fake".into(),
            url: "fake://host/db".into(),
            username: None,
            password: None,
            driver_properties: HashMap::new(),
            default_transaction_isolation_level: None,
            default_network_timeout: None,
            auto_commit: None,
        };
        (Pool::new(gateway, driver_config, pool_config), state)
    }

    #[test]
    fn happy_path_borrow_execute_close() {
        let (pool, _state) = make_pool(PoolConfig::new().max_active(4).max_idle(2));
        let mut conn = pool.borrow(None, None).unwrap();
        conn.execute("SELECT 1").unwrap();
        conn.close().unwrap();

        let status = pool.status();
        assert_eq!(status.active_count, 0);
        assert_eq!(status.idle_count, 1);
        assert_eq!(status.request_count, 1);
        assert_eq!(status.bad_connection_count, 0);
    }

    #[test]
    fn idle_reuse_across_ten_sequential_borrows() {
        let (pool, state) = make_pool(PoolConfig::new().max_active(4).max_idle(2));
        for _ in 0..10 {
            let mut conn = pool.borrow(None, None).unwrap();
            conn.execute("SELECT 1").unwrap();
            conn.close().unwrap();
            assert_eq!(pool.status().idle_count, 1);
        }
        assert_eq!(pool.status().request_count, 10);
        assert_eq!(state.opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn borrow_then_close_restores_list_sizes() {
        let (pool, _state) = make_pool(PoolConfig::new().max_active(2).max_idle(2));
        let before = (pool.status().idle_count, pool.status().active_count);
        let mut conn = pool.borrow(None, None).unwrap();
        conn.close().unwrap();
        let after = (pool.status().idle_count, pool.status().active_count);
        assert_eq!(before.1, after.1);
    }

    #[test]
    fn force_close_all_empties_both_lists_and_invalidates() {
        let (pool, _state) = make_pool(PoolConfig::new().max_active(2).max_idle(2));
        let held = pool.borrow(None, None).unwrap();
        let mut idle_one = pool.borrow(None, None).unwrap();
        idle_one.close().unwrap();

        pool.force_close_all();

        let status = pool.status();
        assert_eq!(status.idle_count, 0);
        assert_eq!(status.active_count, 0);
        assert!(!held.is_valid());
    }

    #[test]
    fn second_close_on_same_proxy_is_a_no_op() {
        let (pool, _state) = make_pool(PoolConfig::new().max_active(1).max_idle(1));
        let mut conn = pool.borrow(None, None).unwrap();
        conn.close().unwrap();
        assert_eq!(pool.status().idle_count, 1);
        conn.close().unwrap();
        assert_eq!(pool.status().idle_count, 1);
    }

    #[test]
    fn overdue_checkout_is_reclaimed_by_a_second_borrower() {
        let (pool, _state) = make_pool(
            PoolConfig::new()
                .max_active(1)
                .max_idle(1)
                .max_checkout_time(Duration::from_millis(30)),
        );
        let t1 = pool.borrow(None, None).unwrap();
        thread::sleep(Duration::from_millis(100));
        let t2 = pool.borrow(None, None).unwrap();

        assert_eq!(pool.status().overdue_count, 1);
        assert!(!t1.is_valid());
        assert!(t2.is_valid());
    }

    #[test]
    fn waiter_succeeds_once_the_holder_closes() {
        let (pool, _state) = make_pool(
            PoolConfig::new()
                .max_active(1)
                .max_idle(1)
                .time_to_wait(Duration::from_millis(200)),
        );
        let mut t1 = pool.borrow(None, None).unwrap();
        let pool2 = pool.clone();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let conn = pool2.borrow(None, None).unwrap();
            (conn, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        t1.close().unwrap();

        let (conn, elapsed) = waiter.join().unwrap();
        assert!(conn.is_valid());
        assert!(elapsed < Duration::from_millis(180));
        assert_eq!(pool.status().had_to_wait_count, 1);
    }

    #[test]
    fn reconfiguration_flushes_held_and_idle_connections() {
        let (pool, _state) = make_pool(PoolConfig::new().max_active(2).max_idle(2));
        let held = pool.borrow(None, None).unwrap();

        pool.set_url("fake://different-host/db");

        assert_eq!(pool.status().active_count, 0);
        assert_eq!(pool.status().idle_count, 0);
        assert!(!held.is_valid());
    }

    #[test]
    fn cancelled_waiter_aborts_with_pool_exhausted() {
        let (pool, _state) = make_pool(
            PoolConfig::new()
                .max_active(1)
                .max_idle(1)
                .time_to_wait(Duration::from_millis(500)),
        );
        let _held = pool.borrow(None, None).unwrap();

        let pool2 = pool.clone();
        let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let cancel2 = cancel.clone();
        let waiter = thread::spawn(move || pool2.borrow_cancellable(None, None, &cancel2));

        thread::sleep(Duration::from_millis(30));
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(Error::PoolExhausted { .. })));
    }

    #[test]
    fn ping_failure_rejects_idle_connection_and_counts_as_bad() {
        let (pool, state) = make_pool(
            PoolConfig::new()
                .max_active(2)
                .max_idle(2)
                .ping_enabled(true)
                .ping_connections_not_used_for(Duration::ZERO),
        );
        let mut first = pool.borrow(None, None).unwrap();
        first.close().unwrap();

        state.fail_execute.store(true, std::sync::atomic::Ordering::SeqCst);
        let second = pool.borrow(None, None).unwrap();

        assert!(second.is_valid());
        assert_eq!(pool.status().bad_connection_count, 1);
    }

    #[test]
    fn ping_failure_on_return_rejects_connection_before_it_reaches_idle() {
        let (pool, state) = make_pool(
            PoolConfig::new()
                .max_active(2)
                .max_idle(2)
                .ping_enabled(true)
                .ping_connections_not_used_for(Duration::ZERO),
        );
        let mut conn = pool.borrow(None, None).unwrap();

        state.fail_execute.store(true, std::sync::atomic::Ordering::SeqCst);
        conn.close().unwrap();

        let status = pool.status();
        assert_eq!(status.idle_count, 0);
        assert_eq!(status.bad_connection_count, 1);
    }
}
