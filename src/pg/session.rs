use std::{
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio_postgres::{types::ToSql, Row, Statement, Transaction};
use tracing::debug;

use crate::{
    pg::{Entity, PgError, PgScroll},
    session::{CacheMode, LockMode, Query, Session},
    DEFAULT_FETCH_SIZE,
};

/// Session over an open transaction, with an identity map of `E` entities.
pub struct PgSession<'t, E: Entity> {
    tx: &'t Transaction<'t>,
    identity_map: Mutex<HashMap<E::Id, Arc<E>>>,
}

impl<'t, E: Entity> PgSession<'t, E> {
    pub fn new(tx: &'t Transaction<'t>) -> Self {
        Self {
            tx,
            identity_map: Mutex::new(HashMap::new()),
        }
    }

    pub fn transaction(&self) -> &'t Transaction<'t> {
        self.tx
    }

    /// Number of entities currently in the identity map.
    pub fn len(&self) -> Result<usize, PgError> {
        Ok(self.map()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PgError> {
        Ok(self.map()?.is_empty())
    }

    pub fn contains(&self, id: &E::Id) -> Result<bool, PgError> {
        Ok(self.map()?.contains_key(id))
    }

    /// Decodes `row`, returning the mapped entity if its id is already known.
    pub(crate) fn load(&self, row: &Row) -> Result<Arc<E>, PgError> {
        let entity = E::from_row(row)?;
        let mut map = self.map()?;
        let entity = map
            .entry(entity.id())
            .or_insert_with(|| Arc::new(entity));
        Ok(Arc::clone(entity))
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<E::Id, Arc<E>>>, PgError> {
        self.identity_map
            .lock()
            .map_err(|_| PgError::PoisonedIdentityMap)
    }
}

impl<'t, E: Entity> fmt::Debug for PgSession<'t, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSession")
            .field("identity_map_len", &self.len().ok())
            .finish_non_exhaustive()
    }
}

impl<'t, E: Entity> Session for PgSession<'t, E> {
    type Entity = Arc<E>;
    type Error = PgError;
    type Query<'s> = PgQuery<'s, E> where Self: 's;

    async fn create_query<'s>(&'s self, expression: &str) -> Result<PgQuery<'s, E>, PgError> {
        let statement = self.tx.prepare(expression).await?;
        Ok(PgQuery::new(self, expression, statement))
    }

    fn clear(&self) -> Result<(), PgError> {
        self.map()?.clear();
        Ok(())
    }
}

/// A prepared SQL query, opened as a server-side cursor.
pub struct PgQuery<'s, E: Entity> {
    session: &'s PgSession<'s, E>,
    expression: String,
    statement: Statement,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
    fetch_size: NonZeroUsize,
    read_only: bool,
    cacheable: bool,
    cache_mode: CacheMode,
}

impl<'s, E: Entity> PgQuery<'s, E> {
    fn new(session: &'s PgSession<'s, E>, expression: &str, statement: Statement) -> Self {
        Self {
            session,
            expression: expression.to_owned(),
            statement,
            params: Vec::new(),
            fetch_size: DEFAULT_FETCH_SIZE,
            read_only: false,
            cacheable: false,
            cache_mode: CacheMode::default(),
        }
    }

    /// Binds the next positional parameter (`$1`, `$2`, ...).
    pub fn bind<T>(&mut self, value: T) -> &mut Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.params.push(Box::new(value));
        self
    }

}

impl<'s, E: Entity> Query for PgQuery<'s, E> {
    type Entity = Arc<E>;
    type Error = PgError;
    type Scroll = PgScroll<'s, E>;

    fn set_fetch_size(&mut self, fetch_size: NonZeroUsize) {
        self.fetch_size = fetch_size;
    }

    fn fetch_size(&self) -> NonZeroUsize {
        self.fetch_size
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn set_cacheable(&mut self, cacheable: bool) {
        self.cacheable = cacheable;
    }

    fn set_cache_mode(&mut self, cache_mode: CacheMode) {
        self.cache_mode = cache_mode;
    }

    fn set_lock_mode(&mut self, alias: &str, lock_mode: LockMode) -> Result<(), PgError> {
        if !identifiers(&self.expression).any(|ident| ident.eq_ignore_ascii_case(alias)) {
            return Err(PgError::UnknownAlias(alias.to_owned()));
        }
        match lock_mode {
            LockMode::None => Ok(()),
        }
    }

    async fn scroll(self) -> Result<PgScroll<'s, E>, PgError> {
        check_scrollable(
            self.read_only,
            self.cacheable,
            self.statement.params().len(),
            self.params.len(),
        )?;

        debug!(cache_mode = ?self.cache_mode, "declaring cursor");
        let params: Vec<&(dyn ToSql + Sync)> = self
            .params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect();
        let query = cursor_query(&self.expression);
        PgScroll::declare(self.session, query, &params, self.fetch_size).await
    }
}

/// `expression` without the trailing terminator, ready to follow
/// `DECLARE ... FOR`.
fn cursor_query(expression: &str) -> &str {
    expression.trim_end().trim_end_matches(';').trim_end()
}

/// Rejects configurations a server-side cursor cannot honour.
fn check_scrollable(
    read_only: bool,
    cacheable: bool,
    expected_params: usize,
    bound_params: usize,
) -> Result<(), PgError> {
    if !read_only {
        return Err(PgError::Unsupported("dirty tracking of streamed entities"));
    }
    if cacheable {
        return Err(PgError::Unsupported("query result cache"));
    }
    if expected_params != bound_params {
        return Err(PgError::ParameterCount {
            expected: expected_params,
            actual: bound_params,
        });
    }
    Ok(())
}

/// Identifier-like tokens of a SQL expression.
fn identifiers(expression: &str) -> impl Iterator<Item = &str> {
    expression
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
}
