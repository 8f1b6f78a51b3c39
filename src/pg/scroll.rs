use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio_postgres::{types::ToSql, Row};
use tracing::{debug, trace};

use crate::{
    pg::{Entity, PgError, PgSession},
    session::ScrollableResults,
};

/// Forward-only server-side cursor, read in batches of the fetch size.
pub struct PgScroll<'s, E: Entity> {
    session: &'s PgSession<'s, E>,
    cursor: ServerCursor,
    buffer: VecDeque<Row>,
}

impl<'s, E: Entity> PgScroll<'s, E> {
    pub(crate) async fn declare(
        session: &'s PgSession<'s, E>,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
        fetch_size: NonZeroUsize,
    ) -> Result<Self, PgError> {
        let cursor = ServerCursor::new(fetch_size);
        session
            .transaction()
            .execute(&cursor.declare_statement(query), params)
            .await?;
        debug!(cursor = %cursor.name, "declared cursor");

        Ok(Self {
            session,
            cursor,
            buffer: VecDeque::with_capacity(fetch_size.get()),
        })
    }
}

impl<'s, E: Entity> ScrollableResults for PgScroll<'s, E> {
    type Entity = Arc<E>;
    type Error = PgError;

    async fn advance(&mut self) -> Result<Option<Arc<E>>, PgError> {
        if self.buffer.is_empty() {
            if let Some(fetch) = self.cursor.fetch_statement() {
                let rows = self.session.transaction().query(&fetch, &[]).await?;
                trace!(cursor = %self.cursor.name, rows = rows.len(), "fetched batch");
                self.cursor.fetched(rows.len());
                self.buffer.extend(rows);
            }
        }
        match self.buffer.pop_front() {
            Some(row) => self.session.load(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn release(&mut self) -> Result<(), PgError> {
        let Some(close) = self.cursor.close_statement() else {
            return Ok(());
        };
        self.buffer.clear();
        self.session.transaction().batch_execute(&close).await?;
        debug!(cursor = %self.cursor.name, "closed cursor");
        Ok(())
    }
}

/// Client-side bookkeeping of a server cursor: its name and how far it has
/// been read.
#[derive(Debug)]
struct ServerCursor {
    name: String,
    fetch_size: NonZeroUsize,
    exhausted: bool,
    released: bool,
}

impl ServerCursor {
    fn new(fetch_size: NonZeroUsize) -> Self {
        static NEXT_CURSOR: AtomicU64 = AtomicU64::new(1);

        Self {
            name: format!("scroll_{}", NEXT_CURSOR.fetch_add(1, Ordering::Relaxed)),
            fetch_size,
            exhausted: false,
            released: false,
        }
    }

    fn declare_statement(&self, query: &str) -> String {
        format!("DECLARE {} NO SCROLL CURSOR FOR {query}", self.name)
    }

    /// The next `FETCH`, or `None` once the server has nothing left or the
    /// cursor is closed.
    fn fetch_statement(&self) -> Option<String> {
        if self.exhausted || self.released {
            return None;
        }
        Some(format!("FETCH FORWARD {} FROM {}", self.fetch_size, self.name))
    }

    /// Records a batch of `rows`. A short batch means the server has nothing
    /// left.
    fn fetched(&mut self, rows: usize) {
        self.exhausted = rows < self.fetch_size.get();
    }

    /// The `CLOSE` to send, only on the first call.
    fn close_statement(&mut self) -> Option<String> {
        if self.released {
            return None;
        }
        self.released = true;
        Some(format!("CLOSE {}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::ServerCursor;

    fn cursor(fetch_size: usize) -> ServerCursor {
        ServerCursor::new(NonZeroUsize::new(fetch_size).unwrap())
    }

    #[test]
    fn test_cursor_names_are_unique() {
        let (a, b) = (cursor(10), cursor(10));
        assert_ne!(a.name, b.name);
        assert_eq!(
            a.declare_statement("SELECT 1"),
            format!("DECLARE {} NO SCROLL CURSOR FOR SELECT 1", a.name)
        );
    }

    #[test]
    fn test_full_batch_keeps_fetching() {
        let mut cursor = cursor(10);
        let fetch = format!("FETCH FORWARD 10 FROM {}", cursor.name);
        assert_eq!(cursor.fetch_statement(), Some(fetch.clone()));

        cursor.fetched(10);
        assert_eq!(cursor.fetch_statement(), Some(fetch));
    }

    #[test]
    fn test_short_batch_exhausts() {
        let mut short = cursor(10);
        short.fetched(9);
        assert_eq!(short.fetch_statement(), None);

        let mut empty = cursor(10);
        empty.fetched(0);
        assert_eq!(empty.fetch_statement(), None);
    }

    #[test]
    fn test_close_once() {
        let mut cursor = cursor(10);
        assert_eq!(cursor.close_statement(), Some(format!("CLOSE {}", cursor.name)));
        assert_eq!(cursor.close_statement(), None);
        assert_eq!(cursor.fetch_statement(), None);
    }
}
