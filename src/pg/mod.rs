//! [`tokio-postgres`](https://docs.rs/tokio-postgres) backend.
//!
//! [`TransactionExt::session`] binds a [`PgSession`] to an open transaction.
//! Its queries are plain SQL with positional `$n` parameters, bound through
//! [`PgQuery::bind`]. Opening a query declares a server-side cursor:
//! ```text
//! DECLARE <cursor> NO SCROLL CURSOR FOR <query>
//! ```
//! which is read in batches of the fetch size:
//! ```text
//! FETCH FORWARD <fetch size> FROM <cursor>
//! ```
//! and closed by [`ResultCursor::close`](crate::ResultCursor::close). A cursor
//! that is never closed lives until the transaction ends.
//!
//! Rows are decoded into [`Entity`] values and kept in the session's identity
//! map, keyed by [`Entity::id`], as shared immutable [`Arc`](std::sync::Arc)s.
//! Reading a row whose id is already mapped yields the mapped entity.
//!
//! # Vulnerabilities
//! It's up to the user to ensure that the query passed to the session is safe
//! from SQL injection vulnerabilities. The query text is interpolated into
//! `DECLARE ... FOR`; aliases are only checked to appear in it.

mod ext;
mod scroll;
mod session;

use std::hash::Hash;

use tokio_postgres::Row;

pub use self::ext::TransactionExt;
pub use self::scroll::PgScroll;
pub use self::session::{PgQuery, PgSession};

/// A type loaded from query rows and tracked by id in the identity map.
pub trait Entity: Sized + Send + Sync + 'static {
    type Id: Eq + Hash + Send + Sync + 'static;

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>;

    fn id(&self) -> Self::Id;
}

#[derive(Debug, thiserror::Error)]
pub enum PgError {
    /// An error reported by the driver or the server.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A lock mode was requested for an alias absent from the query.
    #[error("alias `{0}` does not appear in the query")]
    UnknownAlias(String),

    /// The number of bound parameters differs from the prepared statement's.
    #[error("query expects {expected} parameters, but {actual} were bound")]
    ParameterCount { expected: usize, actual: usize },

    /// The query was configured for something this backend can't provide.
    #[error("unsupported query configuration: {0}")]
    Unsupported(&'static str),

    /// A thread panicked while holding the identity map.
    #[error("identity map lock poisoned")]
    PoisonedIdentityMap,
}
