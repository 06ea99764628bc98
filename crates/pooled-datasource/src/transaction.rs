//! Transaction layer (component E): lets higher layers drive commit
//! and rollback without caring whether the transaction is owned
//! locally or by an external transaction manager.

use std::sync::Arc;

use crate::driver::{Connection, DriverError, Properties};
use crate::error::Error;
use crate::isolation::IsolationLevel;

/// Anything that can hand out a connection to open a transaction
/// against: [`crate::unpooled::UnpooledDataSource`] or [`crate::pool::Pool`].
pub trait DataSource: Send + Sync {
    /// Obtain a connection using this source's configured defaults.
    fn get_connection(&self) -> Result<Box<dyn Connection>, Error>;
}

impl DataSource for crate::unpooled::UnpooledDataSource {
    fn get_connection(&self) -> Result<Box<dyn Connection>, Error> {
        self.open(None, None)
    }
}

impl DataSource for crate::pool::Pool {
    fn get_connection(&self) -> Result<Box<dyn Connection>, Error> {
        self.borrow(None, None).map(|proxy| Box::new(proxy) as Box<dyn Connection>)
    }
}

/// The common contract both transaction variants satisfy.
pub trait Transaction {
    /// Lazily acquire (on first call) and return the underlying
    /// connection.
    fn connection(&mut self) -> Result<&mut dyn Connection, Error>;

    /// Commit, per the variant's policy.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back, per the variant's policy.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Close. Idempotent: closing an already-closed transaction is a no-op.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Statement timeout, in seconds, applied to operations run through
    /// this transaction. Both variants always return `None`: neither
    /// owns a statement-timeout concept of its own, only whatever the
    /// underlying connection/driver enforces.
    fn timeout(&self) -> Option<u64>;
}

/// A transaction whose commit/rollback is driven by this layer,
/// directly against the borrowed connection.
pub struct LocalTransaction {
    source: Option<Arc<dyn DataSource>>,
    desired_isolation: Option<IsolationLevel>,
    desired_auto_commit: Option<bool>,
    skip_auto_commit_reset_on_close: bool,
    connection: Option<Box<dyn Connection>>,
}

impl LocalTransaction {
    /// Construction mode A: acquire a connection from `source` on
    /// first use, applying `isolation`/`auto_commit` if configured.
    #[must_use]
    pub fn new(
        source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: Option<bool>,
        skip_auto_commit_reset_on_close: bool,
    ) -> Self {
        Self {
            source: Some(source),
            desired_isolation: isolation,
            desired_auto_commit: auto_commit,
            skip_auto_commit_reset_on_close,
            connection: None,
        }
    }

    /// Construction mode B: drive commit/rollback/close against a
    /// connection the caller already holds. No isolation/auto-commit
    /// negotiation happens on open.
    #[must_use]
    pub fn from_connection(connection: Box<dyn Connection>, skip_auto_commit_reset_on_close: bool) -> Self {
        Self {
            source: None,
            desired_isolation: None,
            desired_auto_commit: None,
            skip_auto_commit_reset_on_close,
            connection: Some(connection),
        }
    }
}

impl Transaction for LocalTransaction {
    fn connection(&mut self) -> Result<&mut dyn Connection, Error> {
        if self.connection.is_none() {
            let source = self.source.as_ref().expect("mode-B transaction already holds a connection");
            let mut connection = source.get_connection()?;
            if let Some(level) = self.desired_isolation {
                connection.set_transaction_isolation(level).map_err(|source| Error::ConnectionOpen {
                    url: "<transaction connection>".to_string(),
                    source,
                })?;
            }
            if let Some(desired) = self.desired_auto_commit {
                let current = connection.auto_commit().map_err(|source| Error::AutoCommitConfig { source })?;
                if current != desired {
                    connection
                        .set_auto_commit(desired)
                        .map_err(|source| Error::AutoCommitConfig { source })?;
                }
            }
            self.connection = Some(connection);
        }
        Ok(self.connection.as_mut().expect("just materialised above").as_mut())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if let Some(connection) = &mut self.connection {
            if !connection.auto_commit()? {
                tracing::debug!("committing local transaction");
                connection.commit()?;
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if let Some(connection) = &mut self.connection {
            if !connection.auto_commit()? {
                tracing::debug!("rolling back local transaction");
                connection.rollback()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(connection) = &mut self.connection {
            let should_reset = !self.skip_auto_commit_reset_on_close && !connection.auto_commit()?;
            if should_reset {
                if let Err(error) = connection.set_auto_commit(true) {
                    tracing::warn!(%error, "resetting auto-commit before close failed; continuing");
                }
            }
            connection.close()?;
        }
        self.connection = None;
        Ok(())
    }

    fn timeout(&self) -> Option<u64> {
        None
    }
}

/// A transaction whose commit/rollback is driven by an outer system;
/// this layer only exposes the connection and optionally closes it.
pub struct ManagedTransaction {
    source: Option<Arc<dyn DataSource>>,
    desired_isolation: Option<IsolationLevel>,
    close_connection: bool,
    connection: Option<Box<dyn Connection>>,
}

impl ManagedTransaction {
    /// Construction mode A: acquire a connection from `source` on
    /// first use. `auto_commit` is intentionally not a parameter here:
    /// the managed route never negotiates it.
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>, isolation: Option<IsolationLevel>, close_connection: bool) -> Self {
        Self {
            source: Some(source),
            desired_isolation: isolation,
            close_connection,
            connection: None,
        }
    }

    /// Construction mode B: wrap a connection the caller already holds.
    #[must_use]
    pub fn from_connection(connection: Box<dyn Connection>, close_connection: bool) -> Self {
        Self {
            source: None,
            desired_isolation: None,
            close_connection,
            connection: Some(connection),
        }
    }
}

impl Transaction for ManagedTransaction {
    fn connection(&mut self) -> Result<&mut dyn Connection, Error> {
        if self.connection.is_none() {
            let source = self.source.as_ref().expect("mode-B transaction already holds a connection");
            let mut connection = source.get_connection()?;
            if let Some(level) = self.desired_isolation {
                connection.set_transaction_isolation(level).map_err(|source| Error::ConnectionOpen {
                    url: "<transaction connection>".to_string(),
                    source,
                })?;
            }
            self.connection = Some(connection);
        }
        Ok(self.connection.as_mut().expect("just materialised above").as_mut())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(mut connection) = self.connection.take() {
            if self.close_connection {
                connection.close()?;
            }
        }
        Ok(())
    }

    fn timeout(&self) -> Option<u64> {
        None
    }
}

/// Builds [`LocalTransaction`]s.
pub struct LocalTransactionFactory {
    skip_auto_commit_reset_on_close: bool,
}

impl Default for LocalTransactionFactory {
    fn default() -> Self {
        Self {
            skip_auto_commit_reset_on_close: false,
        }
    }
}

impl LocalTransactionFactory {
    /// Build from `skipSetAutoCommitOnClose`.
    #[must_use]
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            skip_auto_commit_reset_on_close: properties
                .get("skipSetAutoCommitOnClose")
                .is_some_and(|v| v == "true"),
        }
    }

    /// Build a transaction against a freshly-acquired connection.
    #[must_use]
    pub fn new_transaction(
        &self,
        source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: Option<bool>,
    ) -> LocalTransaction {
        LocalTransaction::new(source, isolation, auto_commit, self.skip_auto_commit_reset_on_close)
    }

    /// Build a transaction over a connection the caller already holds.
    #[must_use]
    pub fn new_transaction_from_connection(&self, connection: Box<dyn Connection>) -> LocalTransaction {
        LocalTransaction::from_connection(connection, self.skip_auto_commit_reset_on_close)
    }
}

/// Builds [`ManagedTransaction`]s.
pub struct ManagedTransactionFactory {
    close_connection: bool,
}

impl Default for ManagedTransactionFactory {
    fn default() -> Self {
        Self { close_connection: true }
    }
}

impl ManagedTransactionFactory {
    /// Build from `closeConnection` (defaults to `true` when absent).
    #[must_use]
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            close_connection: properties.get("closeConnection").is_none_or(|v| v == "true"),
        }
    }

    /// Build a transaction against a freshly-acquired connection.
    /// `auto_commit` on the underlying source, if any, is never touched.
    #[must_use]
    pub fn new_transaction(&self, source: Arc<dyn DataSource>, isolation: Option<IsolationLevel>) -> ManagedTransaction {
        ManagedTransaction::new(source, isolation, self.close_connection)
    }

    /// Build a transaction over a connection the caller already holds.
    #[must_use]
    pub fn new_transaction_from_connection(&self, connection: Box<dyn Connection>) -> ManagedTransaction {
        ManagedTransaction::from_connection(connection, self.close_connection)
    }
}
