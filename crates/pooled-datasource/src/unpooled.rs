//! Unpooled source (component B): opens one fresh physical connection
//! per request and applies the configured auto-commit, isolation, and
//! network-timeout settings.
//!
//! The pool engine (component D) uses this internally to create new
//! physical connections when it needs one; applications can also use
//! it directly when pooling is not wanted.

use std::sync::Arc;
use std::time::Duration;

use crate::driver::{Connection, DriverGateway, Properties};
use crate::error::Error;
use crate::isolation::IsolationLevel;

/// Prefix stripped from `driver.`-namespaced property keys when
/// collecting them into [`DriverConfig::driver_properties`].
const DRIVER_PROPERTY_PREFIX: &str = "driver.";

/// Everything needed to open a physical connection: which driver, to
/// which URL, with which credentials and session defaults.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// The class name a driver was registered under in the
    /// [`DriverGateway`].
    pub driver_class: String,
    /// The connection URL passed to the driver.
    pub url: String,
    /// Default username, used when `open` is called without one.
    pub username: Option<String>,
    /// Default password, used when `open` is called without one.
    pub password: Option<String>,
    /// Properties forwarded to the driver verbatim (already stripped
    /// of the `driver.` prefix they were collected under).
    pub driver_properties: Properties,
    /// Isolation level applied to every opened connection, if set.
    pub default_transaction_isolation_level: Option<IsolationLevel>,
    /// Network timeout applied to every opened connection, if set.
    pub default_network_timeout: Option<Duration>,
    /// Auto-commit applied to every opened connection, if set and it
    /// differs from the connection's own default.
    pub auto_commit: Option<bool>,
}

impl DriverConfig {
    /// Build a configuration from a flat property bag using the key
    /// names `driver`, `url`, `username`, `password`,
    /// `defaultTransactionIsolationLevel`, `defaultNetworkTimeout`,
    /// `autoCommit`, and any `driver.`-prefixed key.
    pub fn from_properties(properties: &Properties) -> Result<Self, Error> {
        let mut driver_properties = Properties::new();
        for (key, value) in properties {
            if let Some(stripped) = key.strip_prefix(DRIVER_PROPERTY_PREFIX) {
                driver_properties.insert(stripped.to_string(), value.clone());
            }
        }

        let parse_bool = |key: &str| -> Option<bool> { properties.get(key).map(|v| v == "true") };
        let parse_i32 = |key: &str| -> Option<i32> { properties.get(key).and_then(|v| v.parse().ok()) };
        let parse_u64 = |key: &str| -> Option<u64> { properties.get(key).and_then(|v| v.parse().ok()) };

        Ok(Self {
            driver_class: properties.get("driver").cloned().unwrap_or_default(),
            url: properties.get("url").cloned().unwrap_or_default(),
            username: properties.get("username").cloned(),
            password: properties.get("password").cloned(),
            driver_properties,
            default_transaction_isolation_level: parse_i32("defaultTransactionIsolationLevel")
                .and_then(IsolationLevel::from_code),
            default_network_timeout: parse_u64("defaultNetworkTimeout").map(Duration::from_millis),
            auto_commit: parse_bool("autoCommit"),
        })
    }
}

/// Opens a fresh physical connection for every request.
pub struct UnpooledDataSource {
    gateway: Arc<DriverGateway>,
    config: DriverConfig,
}

impl UnpooledDataSource {
    /// Build a source over a driver gateway and configuration. The
    /// driver named by `config.driver_class` must already be
    /// registered on `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<DriverGateway>, config: DriverConfig) -> Self {
        Self { gateway, config }
    }

    /// The configuration this source was built from.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Open one fresh physical connection, overlaying `username`/
    /// `password` onto the configured defaults, then applying network
    /// timeout, auto-commit, and isolation in that order.
    pub fn open(&self, username: Option<&str>, password: Option<&str>) -> Result<Box<dyn Connection>, Error> {
        let mut properties = self.config.driver_properties.clone();
        let effective_user = username.or(self.config.username.as_deref());
        let effective_password = password.or(self.config.password.as_deref());
        if let Some(user) = effective_user {
            properties.insert("user".to_string(), user.to_string());
        }
        if let Some(pass) = effective_password {
            properties.insert("password".to_string(), pass.to_string());
        }

        let mut connection = self.gateway.connect(&self.config.driver_class, &self.config.url, &properties)?;
        self.configure(connection.as_mut())?;
        Ok(connection)
    }

    fn configure(&self, connection: &mut dyn Connection) -> Result<(), Error> {
        let wrap = |source| Error::ConnectionOpen {
            url: self.config.url.clone(),
            source,
        };

        if let Some(timeout) = self.config.default_network_timeout {
            connection.set_network_timeout(timeout).map_err(wrap)?;
        }
        if let Some(desired) = self.config.auto_commit {
            let current = connection.auto_commit().map_err(wrap)?;
            if current != desired {
                connection.set_auto_commit(desired).map_err(wrap)?;
            }
        }
        if let Some(level) = self.config.default_transaction_isolation_level {
            connection.set_transaction_isolation(level).map_err(wrap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;

    fn gateway_with_fake() -> Arc<DriverGateway> {
        let gateway = Arc::new(DriverGateway::new());
        gateway.register("fake", Arc::new(FakeDriver::default()));
        gateway
    }

    #[test]
    fn open_applies_configured_settings_in_order() {
        let gateway = gateway_with_fake();
        let config = DriverConfig {
            driver_class: "fake".into(),
            url: "fake://host/db".into(),
            username: Some("alice".into()),
            password: Some("secret".into()),
            driver_properties: Properties::new(),
            default_transaction_isolation_level: Some(IsolationLevel::ReadCommitted),
            default_network_timeout: Some(Duration::from_secs(5)),
            auto_commit: Some(false),
        };
        let source = UnpooledDataSource::new(gateway, config);
        let connection = source.open(None, None).unwrap();
        assert!(!connection.auto_commit().unwrap());
    }

    #[test]
    fn from_properties_strips_driver_prefix() {
        let mut raw = Properties::new();
        raw.insert("driver".into(), "fake".into());
        raw.insert("url".into(), "fake://host".into());
        raw.insert("driver.applicationName".into(), "myapp".into());
        raw.insert("autoCommit".into(), "false".into());
        raw.insert("defaultTransactionIsolationLevel".into(), "2".into());

        let config = DriverConfig::from_properties(&raw).unwrap();
        assert_eq!(config.driver_class, "fake");
        assert_eq!(config.url, "fake://host");
        assert_eq!(config.driver_properties.get("applicationName").unwrap(), "myapp");
        assert_eq!(config.auto_commit, Some(false));
        assert_eq!(config.default_transaction_isolation_level, Some(IsolationLevel::ReadCommitted));
    }

    #[test]
    fn open_overlays_call_site_credentials() {
        let gateway = gateway_with_fake();
        let config = DriverConfig {
            driver_class: "fake".into(),
            url: "fake://host/db".into(),
            username: Some("default_user".into()),
            password: None,
            driver_properties: Properties::new(),
            default_transaction_isolation_level: None,
            default_network_timeout: None,
            auto_commit: None,
        };
        let source = UnpooledDataSource::new(gateway, config);
        // Should not panic or fail even though call-site overrides differ
        // from the configured defaults.
        assert!(source.open(Some("override_user"), Some("override_pw")).is_ok());
    }
}
