//! Pool capacity and policy configuration: the seven `pool*` keys of
//! the external configuration surface.

use std::time::Duration;

use crate::driver::Properties;
use crate::error::Error;

/// Default probe SQL used when no ping query has been configured.
pub const DEFAULT_PING_QUERY: &str = "NO PING QUERY SET";

/// Pool capacity and liveness-check policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// `poolMaximumActiveConnections` — hard cap on `|active|`.
    pub max_active: u32,
    /// `poolMaximumIdleConnections` — hard cap on `|idle|`.
    pub max_idle: u32,
    /// `poolMaximumCheckoutTime` — age after which a borrow is reclaimable.
    pub max_checkout_time: Duration,
    /// `poolTimeToWait` — duration of a single wait cycle on the condvar.
    pub time_to_wait: Duration,
    /// `poolMaximumLocalBadConnectionTolerance` — extra validation
    /// failures tolerated within a single borrow call before it fails.
    pub max_local_bad_connection_tolerance: u32,
    /// `poolPingQuery` — probe SQL executed by the liveness check.
    pub ping_query: String,
    /// `poolPingEnabled` — whether the liveness check runs at all.
    pub ping_enabled: bool,
    /// `poolPingConnectionsNotUsedFor` — idle duration that triggers a
    /// probe. A value of zero (the default) pings every non-closed
    /// connection whenever pinging is enabled, since the comparison is
    /// `>=` — see `DESIGN.md` for why `>=` rather than `>` was chosen.
    pub ping_connections_not_used_for: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: 10,
            max_idle: 5,
            max_checkout_time: Duration::from_millis(20_000),
            time_to_wait: Duration::from_millis(20_000),
            max_local_bad_connection_tolerance: 3,
            ping_query: DEFAULT_PING_QUERY.to_string(),
            ping_enabled: false,
            ping_connections_not_used_for: Duration::from_millis(0),
        }
    }
}

impl PoolConfig {
    /// The documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `poolMaximumActiveConnections`.
    #[must_use]
    pub fn max_active(mut self, value: u32) -> Self {
        self.max_active = value;
        self
    }

    /// Set `poolMaximumIdleConnections`.
    #[must_use]
    pub fn max_idle(mut self, value: u32) -> Self {
        self.max_idle = value;
        self
    }

    /// Set `poolMaximumCheckoutTime`.
    #[must_use]
    pub fn max_checkout_time(mut self, value: Duration) -> Self {
        self.max_checkout_time = value;
        self
    }

    /// Set `poolTimeToWait`.
    #[must_use]
    pub fn time_to_wait(mut self, value: Duration) -> Self {
        self.time_to_wait = value;
        self
    }

    /// Set `poolMaximumLocalBadConnectionTolerance`.
    #[must_use]
    pub fn max_local_bad_connection_tolerance(mut self, value: u32) -> Self {
        self.max_local_bad_connection_tolerance = value;
        self
    }

    /// Set `poolPingQuery`.
    #[must_use]
    pub fn ping_query(mut self, value: impl Into<String>) -> Self {
        self.ping_query = value.into();
        self
    }

    /// Set `poolPingEnabled`.
    #[must_use]
    pub fn ping_enabled(mut self, value: bool) -> Self {
        self.ping_enabled = value;
        self
    }

    /// Set `poolPingConnectionsNotUsedFor`.
    #[must_use]
    pub fn ping_connections_not_used_for(mut self, value: Duration) -> Self {
        self.ping_connections_not_used_for = value;
        self
    }

    /// Build from a flat property bag using the `pool*` key names.
    pub fn from_properties(properties: &Properties) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(v) = properties.get("poolMaximumActiveConnections") {
            config.max_active = parse_u32(v, "poolMaximumActiveConnections")?;
        }
        if let Some(v) = properties.get("poolMaximumIdleConnections") {
            config.max_idle = parse_u32(v, "poolMaximumIdleConnections")?;
        }
        if let Some(v) = properties.get("poolMaximumCheckoutTime") {
            config.max_checkout_time = Duration::from_millis(parse_u64(v, "poolMaximumCheckoutTime")?);
        }
        if let Some(v) = properties.get("poolTimeToWait") {
            config.time_to_wait = Duration::from_millis(parse_u64(v, "poolTimeToWait")?);
        }
        if let Some(v) = properties.get("poolMaximumLocalBadConnectionTolerance") {
            config.max_local_bad_connection_tolerance = parse_u32(v, "poolMaximumLocalBadConnectionTolerance")?;
        }
        if let Some(v) = properties.get("poolPingQuery") {
            config.ping_query = v.clone();
        }
        if let Some(v) = properties.get("poolPingEnabled") {
            config.ping_enabled = v == "true";
        }
        if let Some(v) = properties.get("poolPingConnectionsNotUsedFor") {
            config.ping_connections_not_used_for = Duration::from_millis(parse_u64(v, "poolPingConnectionsNotUsedFor")?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never satisfy the pool's
    /// invariants (an empty pool, or idle capacity that can never hold
    /// anything returned).
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_active == 0 {
            return Err(Error::DriverSetup {
                class_name: "pool".to_string(),
                source: Box::from("poolMaximumActiveConnections must be greater than 0"),
            });
        }
        Ok(())
    }
}

fn parse_u32(value: &str, key: &str) -> Result<u32, Error> {
    value.parse().map_err(|_| Error::DriverSetup {
        class_name: "pool".to_string(),
        source: Box::from(format!("invalid value for {key}: {value:?}")),
    })
}

fn parse_u64(value: &str, key: &str) -> Result<u64, Error> {
    value.parse().map_err(|_| Error::DriverSetup {
        class_name: "pool".to_string(),
        source: Box::from(format!("invalid value for {key}: {value:?}")),
    })
}
