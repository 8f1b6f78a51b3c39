use std::num::NonZeroUsize;

use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    query::QueryInitializer,
    session::{CacheMode, LockMode, Query, Session, SessionQuery},
    DEFAULT_FETCH_SIZE,
};

/// Assembles a query configured for forward-only streaming.
///
/// Every query built here is read-only, bypasses result caching, and takes
/// no row locks on any of its aliases.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    expression: &'a str,
    aliases: Vec<String>,
    fetch_size: NonZeroUsize,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(expression: &'a str) -> Self {
        Self {
            expression,
            aliases: Vec::new(),
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Aliases used in the expression. Each one is given lock mode
    /// [`LockMode::None`].
    pub fn aliases<I>(mut self, aliases: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn fetch_size(mut self, fetch_size: NonZeroUsize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Prepares the query against `session` and hands it to `initializer`.
    ///
    /// Errors:
    /// - [`Error::QueryPreparation`] if the expression cannot be prepared, an
    ///   alias is unknown, or the initializer fails.
    #[instrument(
        name = "QueryBuilder",
        level = "debug",
        skip_all,
        fields(expression = self.expression)
    )]
    pub async fn build<'s, S, I>(
        &self,
        session: &'s S,
        initializer: I,
    ) -> Result<SessionQuery<'s, S>>
    where
        S: Session,
        I: QueryInitializer<SessionQuery<'s, S>>,
    {
        let mut query = session
            .create_query(self.expression)
            .await
            .map_err(|e| Error::query_preparation(self.expression, e))?;

        query.set_fetch_size(self.fetch_size);
        query.set_read_only(true);
        query.set_cacheable(false);
        query.set_cache_mode(CacheMode::Ignore);

        for alias in &self.aliases {
            query
                .set_lock_mode(alias, LockMode::None)
                .map_err(|e| Error::query_preparation(self.expression, e))?;
        }

        initializer
            .bind(&mut query)
            .map_err(|e| Error::query_preparation(self.expression, e))?;

        debug!(fetch_size = self.fetch_size.get(), aliases = ?self.aliases, "query prepared");
        Ok(query)
    }
}
