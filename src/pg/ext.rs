use tokio_postgres::Transaction;

use crate::pg::{Entity, PgSession};

/// Extension trait for
/// [`Transaction`](https://docs.rs/tokio-postgres/latest/tokio_postgres/struct.Transaction.html)
/// to add streaming session support.
pub trait TransactionExt {
    /// Method to create a new [`PgSession`] loading entities of type `E`.
    ///
    /// The session starts with an empty identity map. Any number of sessions
    /// may be bound to one transaction; each keeps its own identity map.
    fn session<E: Entity>(&self) -> PgSession<'_, E>;
}

/// Implementation of [`TransactionExt`] for
/// [`Transaction`](https://docs.rs/tokio-postgres/latest/tokio_postgres/struct.Transaction.html)
impl<'t> TransactionExt for Transaction<'t> {
    fn session<E: Entity>(&self) -> PgSession<'_, E> {
        PgSession::new(self)
    }
}
