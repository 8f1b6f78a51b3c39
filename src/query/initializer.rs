use crate::error::BoxError;

/// Binds parameters onto a prepared query.
///
/// An initializer is consumed by [`bind`](QueryInitializer::bind) and only
/// ever sees the query through a mutable borrow, so it runs at most once per
/// query and cannot hold on to the query once it returns.
///
/// Closures taking `&mut Q` implement this trait:
///
/// ```ignore
/// let initializer = |query: &mut PgQuery<'_, Account>| {
///     query.bind(owner_id);
///     Ok::<_, PgError>(())
/// };
/// ```
pub trait QueryInitializer<Q> {
    fn bind(self, query: &mut Q) -> Result<(), BoxError>;
}

impl<Q, F, E> QueryInitializer<Q> for F
where
    F: FnOnce(&mut Q) -> Result<(), E>,
    E: Into<BoxError>,
{
    fn bind(self, query: &mut Q) -> Result<(), BoxError> {
        self(query).map_err(Into::into)
    }
}

/// Initializer for queries without parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParameters;

impl<Q> QueryInitializer<Q> for NoParameters {
    fn bind(self, _query: &mut Q) -> Result<(), BoxError> {
        Ok(())
    }
}
