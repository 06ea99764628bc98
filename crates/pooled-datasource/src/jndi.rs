//! Directory-lookup variant: resolves a datasource by name against a
//! naming service instead of constructing one from driver/pool
//! configuration directly.
//!
//! No real naming service is in scope, so lookups are expressed
//! against a caller-supplied [`NamingContext`] rather than a concrete
//! LDAP/etcd backend.

use std::sync::Arc;

use crate::driver::Properties;
use crate::error::Error;
use crate::transaction::DataSource;

/// Prefix stripped from `env.`-namespaced property keys before they are
/// forwarded to a [`NamingContext`] as its lookup environment.
const ENV_PROPERTY_PREFIX: &str = "env.";

/// A handle to something a name resolves to in a directory service.
pub trait NamingContext: Send + Sync {
    /// Look up `name`, returning an opaque handle the caller knows how
    /// to downcast or otherwise interpret.
    ///
    /// `env` carries the `env.`-prefixed keys collected from the
    /// factory's configuration (already stripped of the prefix) — the
    /// equivalent of the `Hashtable` environment a JNDI `InitialContext`
    /// is constructed with, forwarded verbatim to every lookup made
    /// through this context.
    fn lookup(&self, name: &str, env: &Properties) -> Result<Arc<dyn std::any::Any + Send + Sync>, Error>;
}

/// Builds a [`DataSource`] handle by directory lookup.
///
/// Recognises two lookup modes, controlled by the `initial_context`/
/// `data_source` keys, plus any `env.`-prefixed keys forwarded to the
/// naming context's environment on every lookup this factory performs:
/// - `data_source` alone: looked up directly under the initial context
///   (or the default context if `initial_context` is absent).
/// - `initial_context` set: that name is looked up first, and
///   `data_source` is then looked up relative to the returned context.
pub struct NamingLookupDataSourceFactory {
    context: Arc<dyn NamingContext>,
}

impl NamingLookupDataSourceFactory {
    /// Build a factory over a naming context implementation.
    #[must_use]
    pub fn new(context: Arc<dyn NamingContext>) -> Self {
        Self { context }
    }

    /// Resolve a datasource using the `initial_context`/`data_source`
    /// keys of `properties`; any `env.`-prefixed key is stripped and
    /// forwarded to every [`NamingContext::lookup`] call this performs.
    pub fn lookup(&self, properties: &Properties) -> Result<Arc<dyn DataSource>, Error> {
        let data_source_name = properties.get("data_source").ok_or_else(|| Error::DriverSetup {
            class_name: "jndi".to_string(),
            source: Box::from("missing required property `data_source`"),
        })?;

        let env: Properties = properties
            .iter()
            .filter_map(|(key, value)| key.strip_prefix(ENV_PROPERTY_PREFIX).map(|stripped| (stripped.to_string(), value.clone())))
            .collect();

        let resolved = if let Some(initial_context_name) = properties.get("initial_context") {
            let initial = self.context.lookup(initial_context_name, &env)?;
            let nested = initial
                .downcast_ref::<Arc<dyn NamingContext>>()
                .ok_or_else(|| Error::DriverSetup {
                    class_name: "jndi".to_string(),
                    source: Box::from(format!("{initial_context_name:?} did not resolve to a naming context")),
                })?;
            nested.lookup(data_source_name, &env)?
        } else {
            self.context.lookup(data_source_name, &env)?
        };

        resolved.downcast::<Arc<dyn DataSource>>().map(|boxed| (*boxed).clone()).map_err(|_| Error::DriverSetup {
            class_name: "jndi".to_string(),
            source: Box::from(format!("{data_source_name:?} did not resolve to a data source")),
        })
    }
}
