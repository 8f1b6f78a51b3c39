use std::num::NonZeroUsize;

use tracing::{debug, warn};

use crate::{
    cursor::ResultCursor,
    error::{Error, Result},
    query::{QueryBuilder, QueryInitializer},
    session::{Query, Session, SessionProvider, SessionQuery},
    DEFAULT_FETCH_SIZE,
};

type EntityOf<P> = <<P as SessionProvider>::Session as Session>::Entity;

/// Runs streaming queries against the current session of a
/// [`SessionProvider`].
///
/// The template neither begins nor commits transactions; a transaction must
/// already be open on the session when a query is executed.
#[derive(Debug, Clone)]
pub struct QueryTemplate<P> {
    provider: P,
    default_fetch_size: NonZeroUsize,
}

impl<P: SessionProvider> QueryTemplate<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            default_fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Fetch size used by [`execute_query`](Self::execute_query). Defaults to
    /// [`DEFAULT_FETCH_SIZE`].
    pub fn with_default_fetch_size(mut self, fetch_size: NonZeroUsize) -> Self {
        self.default_fetch_size = fetch_size;
        self
    }

    pub fn default_fetch_size(&self) -> NonZeroUsize {
        self.default_fetch_size
    }

    pub fn session(&self) -> &P::Session {
        self.provider.current_session()
    }

    /// Opens a [`ResultCursor`] over `expression` with the default fetch size.
    ///
    /// Parameters:
    /// - `expression`: the query, in the session's query language.
    /// - `aliases`: every alias used in the expression.
    /// - `initializer`: binds the query parameters, see [`NoParameters`](crate::NoParameters).
    ///
    /// The caller owns the returned cursor and should close it. A cursor
    /// dropped while open, for instance when `?` returns early, keeps its
    /// driver handle until the surrounding transaction ends; prefer
    /// [`for_each`](Self::for_each) or
    /// [`into_stream`](ResultCursor::into_stream) when that matters.
    pub async fn execute_query<'s, A, I>(
        &'s self,
        expression: &str,
        aliases: A,
        initializer: I,
    ) -> Result<ResultCursor<'s, P::Session>>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        I: QueryInitializer<SessionQuery<'s, P::Session>>,
    {
        let fetch_size = self.default_fetch_size;
        self.execute_query_with_fetch_size(expression, aliases, initializer, fetch_size)
            .await
    }

    /// Opens a [`ResultCursor`] over `expression`.
    ///
    /// `fetch_size` is handed to the driver as the number of rows per round
    /// trip, and the session's identity cache is cleared every `fetch_size`
    /// rows read through the cursor. An initializer that changes the fetch
    /// size of the query moves both: the cursor clears at the size the query
    /// is opened with.
    ///
    /// As with [`execute_query`](Self::execute_query), a cursor dropped while
    /// open is only released when the transaction ends.
    ///
    /// Errors:
    /// - [`Error::QueryPreparation`] if the query cannot be built or executed.
    ///   No cursor is opened in that case.
    pub async fn execute_query_with_fetch_size<'s, A, I>(
        &'s self,
        expression: &str,
        aliases: A,
        initializer: I,
        fetch_size: NonZeroUsize,
    ) -> Result<ResultCursor<'s, P::Session>>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        I: QueryInitializer<SessionQuery<'s, P::Session>>,
    {
        let session = self.session();
        let query = QueryBuilder::new(expression)
            .aliases(aliases)
            .fetch_size(fetch_size)
            .build(session, initializer)
            .await?;

        let effective = query.fetch_size();
        if effective != fetch_size {
            debug!(
                requested = fetch_size.get(),
                effective = effective.get(),
                "initializer changed the fetch size"
            );
        }
        let scroll = query
            .scroll()
            .await
            .map_err(|e| Error::query_preparation(expression, e))?;

        debug!(expression, fetch_size = effective.get(), "opened result cursor");
        Ok(ResultCursor::new(session, scroll, effective))
    }

    /// Executes `expression`, passing each entity to `handler`.
    ///
    /// The cursor is closed whether the results are exhausted, the handler
    /// fails, or reading fails. The first error is returned after closing; the
    /// handler's own error is returned as is. A close failure is only reported
    /// when nothing else failed.
    pub async fn for_each<'s, A, I, F, E>(
        &'s self,
        expression: &str,
        aliases: A,
        initializer: I,
        fetch_size: NonZeroUsize,
        mut handler: F,
    ) -> Result<(), E>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        I: QueryInitializer<SessionQuery<'s, P::Session>>,
        F: FnMut(EntityOf<P>) -> Result<(), E>,
        E: From<Error>,
    {
        let mut cursor = self
            .execute_query_with_fetch_size(expression, aliases, initializer, fetch_size)
            .await?;

        let outcome = loop {
            match cursor.next().await {
                Ok(Some(entity)) => {
                    if let error @ Err(_) = handler(entity) {
                        break error;
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(E::from(e)),
            }
        };

        let closed = cursor.close().await;
        match (outcome, closed) {
            (Err(e), Err(close_error)) => {
                warn!(error = %close_error, "suppressed error while closing result cursor");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), closed) => closed.map_err(E::from),
        }
    }
}
