/// Boxed error produced by a collaborator: a session, a query, a scroll or a
/// parameter initializer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The expression could not be prepared, an alias is unknown to it, or the
    /// parameter initializer failed. The initializer's error is kept as the
    /// source, unchanged.
    #[error("failed to prepare query `{expression}`")]
    QueryPreparation {
        expression: String,
        #[source]
        source: BoxError,
    },

    /// The streaming handle failed while reading row `row` (1-indexed). The
    /// cursor stays open.
    #[error("failed to read row {row} from the result cursor")]
    UnderlyingRead {
        row: u64,
        #[source]
        source: BoxError,
    },

    /// `next` was called on a closed cursor.
    #[error("result cursor is closed")]
    CursorClosed,

    /// The session identity cache could not be cleared after row `row`.
    ///
    /// The failure is reported on every later read, so `source` shares it:
    /// its concrete type is `Arc<S::Error>` for the session type `S`.
    #[error("failed to clear the session identity cache after row {row}")]
    Eviction {
        row: u64,
        #[source]
        source: BoxError,
    },

    /// The streaming handle could not be released.
    #[error("failed to release the result cursor")]
    Release {
        #[source]
        source: BoxError,
    },

    /// A per-row handler failed.
    #[error("row handler failed")]
    Handler {
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wraps an arbitrary error raised by a per-row handler.
    pub fn handler(source: impl Into<BoxError>) -> Self {
        Error::Handler {
            source: source.into(),
        }
    }

    pub(crate) fn query_preparation(expression: &str, source: impl Into<BoxError>) -> Self {
        Error::QueryPreparation {
            expression: expression.to_owned(),
            source: source.into(),
        }
    }
}
