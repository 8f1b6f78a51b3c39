//! Collaborator contracts consumed by the query template.
//!
//! A backend provides a [`Session`] owning an identity cache, the [`Query`]
//! objects it prepares, and the forward-only [`ScrollableResults`] those
//! queries open. The [`pg`](crate::pg) module is the bundled backend.

use std::{future::Future, num::NonZeroUsize};

/// Interaction of a query with the second-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from and write to the cache.
    #[default]
    Normal,
    /// Neither read from nor write to the cache.
    Ignore,
}

/// Row lock requested for an alias of a query.
///
/// Streaming reads never lock the rows they return, so `None` is the only
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// No lock beyond what the isolation level implies.
    #[default]
    None,
}

/// Produces the session of the current unit of work.
pub trait SessionProvider {
    type Session: Session;

    fn current_session(&self) -> &Self::Session;
}

impl<S: Session> SessionProvider for &S {
    type Session = S;

    fn current_session(&self) -> &S {
        self
    }
}

/// A unit of work owning a first-level identity cache.
pub trait Session: Sync {
    /// Element type produced by queries of this session.
    type Entity: Send;

    /// Error type shared by the session, its queries and their scrolls.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Query type prepared by this session.
    type Query<'s>: Query<Entity = Self::Entity, Error = Self::Error> + Send
    where
        Self: 's;

    /// Parses and prepares `expression` against this session.
    fn create_query<'s>(
        &'s self,
        expression: &str,
    ) -> impl Future<Output = Result<Self::Query<'s>, Self::Error>> + Send;

    /// Clears the identity cache, detaching every loaded entity.
    fn clear(&self) -> Result<(), Self::Error>;
}

/// A prepared query, configurable before it is opened.
pub trait Query {
    type Entity;
    type Error;

    /// Forward-only handle opened by [`scroll`](Query::scroll).
    type Scroll: ScrollableResults<Entity = Self::Entity, Error = Self::Error> + Send;

    /// Number of rows the driver should fetch per round trip.
    fn set_fetch_size(&mut self, fetch_size: NonZeroUsize);

    /// Fetch size the query will be opened with.
    fn fetch_size(&self) -> NonZeroUsize;

    /// Read-only entities are not enrolled in dirty tracking.
    fn set_read_only(&mut self, read_only: bool);

    fn set_cacheable(&mut self, cacheable: bool);

    fn set_cache_mode(&mut self, cache_mode: CacheMode);

    /// Requests `lock_mode` for `alias`. Fails if the alias is unknown to the
    /// query expression.
    fn set_lock_mode(&mut self, alias: &str, lock_mode: LockMode) -> Result<(), Self::Error>;

    /// Executes the query, opening a forward-only scroll over its results.
    fn scroll(self) -> impl Future<Output = Result<Self::Scroll, Self::Error>> + Send;
}

/// Forward-only handle over the results of an executed query.
pub trait ScrollableResults {
    type Entity;
    type Error;

    /// Moves to the next row and returns it, or `None` once the results are
    /// exhausted.
    fn advance(&mut self) -> impl Future<Output = Result<Option<Self::Entity>, Self::Error>> + Send;

    /// Releases the handle. Further calls must be no-ops.
    fn release(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Query type prepared by session `S`.
pub type SessionQuery<'s, S> = <S as Session>::Query<'s>;

/// Scroll type opened by queries of session `S`.
pub type SessionScroll<'s, S> = <SessionQuery<'s, S> as Query>::Scroll;
