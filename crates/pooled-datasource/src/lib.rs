//! # pooled-datasource
//!
//! A database connection pool and transaction abstraction for a
//! data-access layer. Applications obtain logical connections from a
//! [`pool::Pool`]; when a logical connection is closed, its physical
//! connection is returned to the pool for reuse rather than destroyed.
//! Layered on top, the [`transaction`] module lets higher layers drive
//! commit/rollback without caring whether the transaction is owned
//! locally or by an external transaction manager.
//!
//! The physical driver layer is deliberately out of scope: this crate
//! only assumes the [`driver::Driver`]/[`driver::Connection`] contract
//! and leaves concrete wire-protocol implementations to downstream
//! crates. An in-memory test double is available behind the
//! `test-util` feature (see [`testing`]) for exercising the pool
//! without a live database.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooled_datasource::driver::DriverGateway;
//! use pooled_datasource::pool::{Pool, PoolConfig};
//! use pooled_datasource::unpooled::DriverConfig;
//! use std::sync::Arc;
//!
//! let gateway = Arc::new(DriverGateway::new());
//! gateway.register("my-driver", Arc::new(MyDriver::new()));
//!
//! let pool = Pool::new(
//!     gateway,
//!     DriverConfig::from_properties(&properties)?,
//!     PoolConfig::from_properties(&properties)?,
//! );
//!
//! let mut conn = pool.borrow(None, None)?;
//! conn.execute("SELECT 1")?;
//! conn.close()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod isolation;
pub mod jndi;
pub mod pool;
pub mod pooled;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transaction;
pub mod unpooled;

pub use driver::{Driver, DriverError, DriverGateway, Properties};
pub use error::{Error, Result};
pub use isolation::IsolationLevel;
pub use pool::{Pool, PoolConfig, PoolStatistics};
pub use pooled::PooledConnectionProxy;
pub use transaction::{
    DataSource, LocalTransaction, LocalTransactionFactory, ManagedTransaction, ManagedTransactionFactory, Transaction,
};
pub use unpooled::{DriverConfig, UnpooledDataSource};
