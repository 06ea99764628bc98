//! End-to-end scenarios exercising the pool and transaction layer
//! together through the public API, using the in-memory test driver.

use pooled_datasource::driver::DriverGateway;
use pooled_datasource::pool::{Pool, PoolConfig};
use pooled_datasource::testing::FakeDriver;
use pooled_datasource::transaction::{LocalTransactionFactory, ManagedTransactionFactory, Transaction};
use pooled_datasource::unpooled::DriverConfig;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn make_pool(pool_config: PoolConfig) -> (Pool, Arc<pooled_datasource::testing::FakeDriverState>) {
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
fn scenario_1_happy_path() {
    let (pool, _state) = make_pool(PoolConfig::new().max_active(4).max_idle(2).ping_enabled(false));
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
fn scenario_2_idle_reuse() {
    let (pool, state) = make_pool(PoolConfig::new().max_active(4).max_idle(2).ping_enabled(false));
    for _ in 0..10 {
        let mut conn = pool.borrow(None, None).unwrap();
        conn.execute("SELECT 1").unwrap();
        conn.close().unwrap();
        assert_eq!(pool.status().idle_count, 1);
    }
    assert_eq!(pool.status().request_count, 10);
    assert_eq!(state.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn scenario_3_overdue_reclaim() {
    let (pool, _state) = make_pool(
        PoolConfig::new()
            .max_active(1)
            .max_checkout_time(Duration::from_millis(30)),
    );
    let t1 = pool.borrow(None, None).unwrap();

    let pool2 = pool.clone();
    let t2_handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        pool2.borrow(None, None).unwrap()
    });
    let t2 = t2_handle.join().unwrap();

    assert_eq!(pool.status().overdue_count, 1);
    assert!(!t1.is_valid());
    assert!(t2.is_valid());

    let mut t1 = t1;
    let err = t1.execute("SELECT 1").unwrap_err();
    assert!(err.downcast_ref::<pooled_datasource::Error>().is_some());
}

#[test]
fn scenario_4_wait_path() {
    let (pool, _state) = make_pool(
        PoolConfig::new()
            .max_active(1)
            .time_to_wait(Duration::from_millis(200)),
    );
    let mut t1 = pool.borrow(None, None).unwrap();

    let pool2 = pool.clone();
    let start = Instant::now();
    let t2_handle = thread::spawn(move || {
        let conn = pool2.borrow(None, None).unwrap();
        (conn, Instant::now())
    });

    thread::sleep(Duration::from_millis(50));
    t1.close().unwrap();

    let (t2, t2_finished_at) = t2_handle.join().unwrap();
    assert!(t2.is_valid());
    assert!(t2_finished_at.duration_since(start) < Duration::from_millis(150));
    assert_eq!(pool.status().had_to_wait_count, 1);
}

#[test]
fn scenario_5_reconfiguration_flush() {
    let (pool, state) = make_pool(PoolConfig::new().max_active(2).max_idle(2));
    let held = pool.borrow(None, None).unwrap();

    pool.set_url("fake://new-host/db");

    assert_eq!(pool.status().active_count, 0);
    assert_eq!(pool.status().idle_count, 0);
    assert!(!held.is_valid());

    let _fresh = pool.borrow(None, None).unwrap();
    assert_eq!(state.opens.load(Ordering::SeqCst), 2);
}

#[test]
fn scenario_6_managed_vs_local_commit() {
    let (pool, state) = make_pool(PoolConfig::new().max_active(2).max_idle(2));

    let local_factory = LocalTransactionFactory::default();
    let source: Arc<dyn pooled_datasource::DataSource> = Arc::new(pool.clone());
    let mut local = local_factory.new_transaction(source.clone(), None, Some(false));
    local.connection().unwrap();
    local.commit().unwrap();
    local.close().unwrap();

    let managed_factory = ManagedTransactionFactory::from_properties(&{
        let mut props = HashMap::new();
        props.insert("closeConnection".to_string(), "true".to_string());
        props
    });
    let mut managed = managed_factory.new_transaction(source, None);
    managed.connection().unwrap();
    managed.commit().unwrap();
    managed.close().unwrap();

    // Both transactions returned their pooled connection through `close`,
    // which routes back through the pool rather than physically closing it.
    assert_eq!(state.closes.load(Ordering::SeqCst), 0);
    assert_eq!(pool.status().idle_count, 2);
}
