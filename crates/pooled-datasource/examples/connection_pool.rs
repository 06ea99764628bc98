//! Borrowing and returning connections through a pool, with
//! configuration-driven reconfiguration and a status report.
//!
//! This example uses the in-memory test driver (`test-util` feature)
//! since a real wire-protocol driver is out of scope for this crate.
//!
//! # Running
//!
//! ```bash
//! cargo run --example connection_pool --features test-util
//! ```

use pooled_datasource::driver::DriverGateway;
use pooled_datasource::pool::{Pool, PoolConfig};
use pooled_datasource::testing::FakeDriver;
use pooled_datasource::unpooled::DriverConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt::init();

    let gateway = Arc::new(DriverGateway::new());
    gateway.register("fake", Arc::new(FakeDriver::default()));

    let driver_config = DriverConfig {
        driver_class: "fake".into(),
        url: "fake://localhost/example".into(),
        username: Some("app".into()),
        password: Some("secret".into()),
        driver_properties: HashMap::new(),
        default_transaction_isolation_level: None,
        default_network_timeout: None,
        auto_commit: None,
    };

    let pool_config = PoolConfig::new().max_active(4).max_idle(2).time_to_wait(Duration::from_secs(1));

    let pool = Pool::new(gateway, driver_config, pool_config);

    println!("1. Basic borrow/execute/close:");
    {
        let mut conn = pool.borrow(None, None).unwrap();
        conn.execute("SELECT 1").unwrap();
        conn.close().unwrap();
    }
    println!("   {}", pool.status());

    println!("\n2. Four threads competing for four connections:");
    let mut handles = Vec::new();
    for i in 0..4 {
        let pool = pool.clone();
        handles.push(thread::spawn(move || {
            let mut conn = pool.borrow(None, None).unwrap();
            conn.execute(&format!("SELECT {i}")).unwrap();
            thread::sleep(Duration::from_millis(20));
            conn.close().unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    println!("   {}", pool.status());

    println!("\n3. Reconfiguring the pool flushes existing connections:");
    let held = pool.borrow(None, None).unwrap();
    pool.set_max_active(8);
    println!("   held connection still valid? {}", held.is_valid());
    println!("   {}", pool.status());
}
