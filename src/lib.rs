//! Forward-only streaming queries over result sets larger than memory.
//!
//! A [`QueryTemplate`] prepares a read-only, uncached, lock-free query on the
//! current session, opens a forward-only scroll over it and hands the rows out
//! through a [`ResultCursor`]. Every `fetch_size` rows the cursor clears the
//! session's identity cache, so loaded entities do not pile up in memory while
//! the results are consumed.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_postgres::{NoTls, Row};
//! use tokio_postgres_scroll::{
//!     pg::{Entity, PgQuery, TransactionExt},
//!     QueryTemplate,
//! };
//!
//! struct Account {
//!     id: i64,
//!     owner: String,
//! }
//!
//! impl Entity for Account {
//!     type Id = i64;
//!
//!     fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
//!         Ok(Self { id: row.try_get("id")?, owner: row.try_get("owner")? })
//!     }
//!
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let (mut client, connection) =
//!         tokio_postgres::connect("host=localhost user=postgres", NoTls).await?;
//!     tokio::spawn(connection);
//!
//!     // Streaming queries require an open transaction
//!     let tx = client.transaction().await?;
//!     let session = tx.session::<Account>();
//!     let template = QueryTemplate::new(&session);
//!
//!     let mut accounts = template
//!         .execute_query(
//!             "SELECT a.id, a.owner FROM accounts a WHERE a.balance > $1",
//!             ["a"],
//!             |query: &mut PgQuery<'_, Account>| {
//!                 query.bind(100_i64);
//!                 Ok::<_, tokio_postgres::Error>(())
//!             },
//!         )
//!         .await?;
//!
//!     while let Some(account) = accounts.next().await? {
//!         let account: Arc<Account> = account;
//!         println!("{}", account.owner);
//!     }
//!
//!     // Explicitly closing the cursor is highly recommended
//!     accounts.close().await?;
//!     drop(accounts);
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Eviction
//! After the cursor hands out row `k` (1-indexed) with `k % fetch_size == 0`,
//! the session's identity cache is cleared. Entities delivered before that
//! point are detached from the session; callers that need them past a fetch
//! size boundary must copy them out.
//!
//! # Concurrency
//! A session is used by a single task. Opening a second cursor on a session
//! before the first one is closed is not supported: eviction by one cursor
//! detaches entities the other one returned.
//!
//! # Backends
//! The core is written against the [`Session`], [`Query`] and
//! [`ScrollableResults`] traits. The [`pg`] module implements them on top of
//! a [`tokio_postgres::Transaction`] with server-side cursors.

mod cursor;
mod error;
pub mod pg;
mod query;
mod session;
mod template;

use std::num::NonZeroUsize;

pub use crate::cursor::{CursorState, ResultCursor};
pub use crate::error::{BoxError, Error, Result};
pub use crate::query::{NoParameters, QueryBuilder, QueryInitializer};
pub use crate::session::{
    CacheMode, LockMode, Query, ScrollableResults, Session, SessionProvider, SessionQuery,
    SessionScroll,
};
pub use crate::template::QueryTemplate;

/// Fetch size used when none is given: rows per round trip, and rows between
/// two identity cache clears.
pub const DEFAULT_FETCH_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(fetch_size) => fetch_size,
    None => panic!("fetch size must not be zero"),
};
