//! Error taxonomy for the pool and transaction layer.
//!
//! A single flat, tagged error type rather than an exception hierarchy:
//! the causes a caller needs to distinguish are few and a `match` over
//! one enum is cheaper to reason about than a class tree.

use thiserror::Error;

/// Errors produced by the driver gateway, the pool engine, the pooled
/// connection proxy, and the transaction layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A driver class could not be loaded or instantiated.
    #[error("could not set up driver {class_name:?}: {source}")]
    DriverSetup {
        /// The driver class name that failed to register.
        class_name: String,
        /// The underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The driver refused to open a physical connection.
    #[error("failed to open connection to {url:?}: {source}")]
    ConnectionOpen {
        /// The URL the connection was attempted against.
        url: String,
        /// The underlying driver cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// `borrow` could not produce a valid connection within this call's
    /// local retry budget.
    #[error("pool exhausted after {bad_connection_attempts} failed validation(s)")]
    PoolExhausted {
        /// Number of validation failures observed by this borrow call.
        bad_connection_attempts: u32,
    },

    /// A method was invoked through a pooled proxy whose `valid` flag is
    /// cleared.
    #[error("connection is no longer valid (returned to pool or invalidated)")]
    StaleConnection,

    /// The driver refused to negotiate auto-commit for a local transaction.
    #[error("failed to configure auto-commit: {source}")]
    AutoCommitConfig {
        /// The underlying driver cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A rollback issued during `return` failed.
    ///
    /// Never propagated out of [`crate::pool::Pool::release`] or a
    /// proxy's `close` — a caller closing a connection must never
    /// observe a failure. Constructible so tests can assert the policy
    /// decision recorded in `DESIGN.md`.
    #[error("rollback during return failed: {source}")]
    ReturnRollback {
        /// The underlying driver cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
