//! Driver gateway (component A): registers driver instances by class
//! name and opens physical connections through them.
//!
//! The physical driver layer itself is out of scope for this crate —
//! only its contract is assumed, expressed here as the [`Connection`]
//! and [`Driver`] traits. A real crate would implement `Driver` for a
//! concrete wire protocol; tests in this crate implement it for an
//! in-memory double (see `crate::testing`).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::Error;
use crate::isolation::IsolationLevel;

/// A boxed, send-safe driver-level error, wrapped by this crate's
/// [`Error`] variants at the boundary where it crosses into pool-facing
/// code.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A flat string-to-string property bag, as passed to driver `connect`
/// calls and used to configure datasources from flat external
/// configuration.
pub type Properties = HashMap<String, String>;

/// The contract a physical driver must satisfy.
///
/// Out of scope: how a concrete driver actually speaks to a database.
/// In scope: that `connect` is the only operation the rest of this
/// crate needs from it.
pub trait Driver: Send + Sync {
    /// Open a physical connection to `url` using `properties`.
    fn connect(&self, url: &str, properties: &Properties) -> Result<Box<dyn Connection>, DriverError>;
}

/// The opaque handle to a physical database connection.
///
/// Every method other than `identity` and `is_closed` is expected to
/// reach the network; callers holding this trait object directly
/// (rather than through the pooled proxy) get no liveness protection.
pub trait Connection: Send {
    /// Current auto-commit setting.
    fn auto_commit(&self) -> Result<bool, DriverError>;

    /// Change the auto-commit setting.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError>;

    /// Change the transaction isolation level.
    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), DriverError>;

    /// Change the network timeout applied to subsequent operations.
    fn set_network_timeout(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Close the physical connection. Idempotent.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Whether the physical connection reports itself closed.
    fn is_closed(&self) -> bool;

    /// Execute a throwaway statement and discard any result set.
    ///
    /// Used only by the pool's liveness probe (`SELECT 1`-style
    /// queries); not a general statement-execution API.
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// A stable identity fingerprint for this physical connection,
    /// used for proxy equality/hashing.
    fn identity(&self) -> u64;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Process-wide registry of driver instances, keyed by a class-name
/// string.
///
/// Registration is idempotent: the first successful registration for a
/// given class name wins, and later calls for the same name return the
/// already-registered driver without re-running the constructor.
pub struct DriverGateway {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl Default for DriverGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an already-constructed driver under `class_name`.
    ///
    /// A no-op if `class_name` is already registered.
    pub fn register(&self, class_name: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.write().entry(class_name.into()).or_insert(driver);
    }

    /// Register a driver under `class_name`, constructing it lazily via
    /// `init` only if no driver is registered under that name yet.
    ///
    /// Mirrors "a driver class is loaded ... and instantiated at most
    /// once per process" without requiring an actual class loader.
    pub fn register_with<F, E>(&self, class_name: impl Into<String>, init: F) -> Result<Arc<dyn Driver>, Error>
    where
        F: FnOnce() -> Result<Arc<dyn Driver>, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let class_name = class_name.into();
        if let Some(driver) = self.drivers.read().get(&class_name) {
            return Ok(driver.clone());
        }
        let mut guard = self.drivers.write();
        if let Some(driver) = guard.get(&class_name) {
            return Ok(driver.clone());
        }
        let driver = init().map_err(|source| Error::DriverSetup {
            class_name: class_name.clone(),
            source: Box::new(source),
        })?;
        guard.insert(class_name, driver.clone());
        Ok(driver)
    }

    /// Look up a previously-registered driver.
    #[must_use]
    pub fn driver(&self, class_name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().get(class_name).cloned()
    }

    /// Open a physical connection through the driver registered under
    /// `class_name`.
    pub fn connect(
        &self,
        class_name: &str,
        url: &str,
        properties: &Properties,
    ) -> Result<Box<dyn Connection>, Error> {
        let driver = self.driver(class_name).ok_or_else(|| Error::DriverSetup {
            class_name: class_name.to_string(),
            source: Box::from(format!("no driver registered under {class_name:?}")),
        })?;
        driver.connect(url, properties).map_err(|source| Error::ConnectionOpen {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;

    #[test]
    fn registration_is_idempotent() {
        let gateway = DriverGateway::new();
        let first = Arc::new(FakeDriver::default());
        let second = Arc::new(FakeDriver::default());
        gateway.register("fake", first.clone());
        gateway.register("fake", second);
        let resolved = gateway.driver("fake").unwrap();
        assert!(Arc::ptr_eq(&(resolved as Arc<dyn Driver>), &(first as Arc<dyn Driver>)));
    }

    #[test]
    fn register_with_runs_init_once() {
        let gateway = DriverGateway::new();
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            gateway
                .register_with::<_, std::convert::Infallible>("fake", || {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(Arc::new(FakeDriver::default()))
                })
                .unwrap();
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_without_registration_is_driver_setup_error() {
        let gateway = DriverGateway::new();
        let err = gateway.connect("missing", "url", &Properties::new()).unwrap_err();
        assert!(matches!(err, Error::DriverSetup { .. }));
    }
}
