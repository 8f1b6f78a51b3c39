use futures_core::Stream;
use futures_util::stream;
use tracing::warn;

use crate::{
    cursor::ResultCursor,
    error::Result,
    session::Session,
};

impl<'s, S: Session + 's> ResultCursor<'s, S> {
    /// Turns the cursor into a [`Stream`] of entities.
    ///
    /// The stream closes the cursor when the results are exhausted and after
    /// the first error, which is yielded as the last item. A close failure at
    /// the end of the results is yielded as an error too. Dropping the stream
    /// early behaves like dropping an open cursor.
    pub fn into_stream(self) -> impl Stream<Item = Result<S::Entity>> + 's {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(entity)) => Some((Ok(entity), Some(cursor))),
                Ok(None) => match cursor.close().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
                Err(e) => {
                    if let Err(close_error) = cursor.close().await {
                        warn!(error = %close_error, "suppressed error while closing result cursor");
                    }
                    Some((Err(e), None))
                }
            }
        })
    }
}
