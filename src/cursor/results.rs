use std::{num::NonZeroUsize, sync::Arc};

use tracing::{debug, trace, warn};

use crate::{
    error::{Error, Result},
    session::{ScrollableResults, Session, SessionScroll},
};

/// Lifecycle of a [`ResultCursor`].
///
/// `Open -> Exhausted`, `Open -> Closed` and `Exhausted -> Closed` are the only
/// transitions; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// Lazy, forward-only sequence of entities read from a streaming query.
///
/// The cursor borrows the session it was opened on and clears the session's
/// identity cache every `fetch_size` delivered rows, so the cache never holds
/// more than one fetch of this query's entities (plus the row just returned),
/// provided the caller does not keep them around.
///
/// It is highly recommended to [`close`](ResultCursor::close) the cursor
/// explicitly. Dropping an open cursor cannot release the underlying handle,
/// which then lives until the surrounding transaction ends.
pub struct ResultCursor<'s, S: Session + 's> {
    session: &'s S,
    scroll: SessionScroll<'s, S>,
    fetch_size: NonZeroUsize,
    consumed: u64,
    state: CursorState,
    eviction_failure: Option<Arc<S::Error>>,
}

impl<'s, S: Session + 's> ResultCursor<'s, S> {
    pub(crate) fn new(
        session: &'s S,
        scroll: SessionScroll<'s, S>,
        fetch_size: NonZeroUsize,
    ) -> Self {
        Self {
            session,
            scroll,
            fetch_size,
            consumed: 0,
            state: CursorState::Open,
            eviction_failure: None,
        }
    }

    /// Advances the cursor, returning the next entity or `None` once the
    /// results are exhausted.
    ///
    /// When the returned row is a multiple of the fetch size, the session's
    /// identity cache is cleared before this method returns. Entities
    /// delivered earlier are detached at that point.
    ///
    /// Errors:
    /// - [`Error::CursorClosed`] if the cursor was closed. No I/O is done.
    /// - [`Error::UnderlyingRead`] if the scroll fails. The cursor stays open
    ///   and must still be closed.
    /// - [`Error::Eviction`] on every call after a failed cache clear. The row
    ///   that triggered the clear has already been returned. The source
    ///   downcasts to `Arc<S::Error>`.
    pub async fn next(&mut self) -> Result<Option<S::Entity>> {
        match self.state {
            CursorState::Closed => return Err(Error::CursorClosed),
            CursorState::Exhausted => return Ok(None),
            CursorState::Open => {}
        }

        if let Some(failure) = &self.eviction_failure {
            return Err(Error::Eviction {
                row: self.consumed,
                source: Box::new(Arc::clone(failure)),
            });
        }

        let row = self.consumed + 1;
        let entity = match self.scroll.advance().await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                debug!(consumed = self.consumed, "result cursor exhausted");
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::UnderlyingRead {
                    row,
                    source: e.into(),
                })
            }
        };

        self.consumed = row;
        if self.consumed % self.fetch_size.get() as u64 == 0 {
            self.evict();
        }
        Ok(Some(entity))
    }

    /// Releases the underlying scroll.
    ///
    /// Idempotent: only the first call reaches the scroll, later calls return
    /// `Ok(())`. The session's identity cache is left untouched.
    ///
    /// Errors:
    /// - [`Error::Release`] if the scroll fails to release. The cursor is
    ///   closed nonetheless.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        self.state = CursorState::Closed;
        debug!(consumed = self.consumed, "closing result cursor");

        self.scroll
            .release()
            .await
            .map_err(|e| Error::Release { source: e.into() })
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Number of rows delivered so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn fetch_size(&self) -> NonZeroUsize {
        self.fetch_size
    }

    fn evict(&mut self) {
        trace!(row = self.consumed, "clearing session identity cache");
        if let Err(e) = self.session.clear() {
            warn!(row = self.consumed, error = %e, "failed to clear session identity cache");
            self.eviction_failure = Some(Arc::new(e));
        }
    }
}

impl<'s, S: Session + 's> Drop for ResultCursor<'s, S> {
    fn drop(&mut self) {
        if self.state != CursorState::Closed {
            warn!(
                consumed = self.consumed,
                "result cursor dropped without being closed"
            );
        }
    }
}
