//! Store error types.

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure, with the operation that hit it.
    #[error("sqlite error in {context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Wrap a `rusqlite` error without extra context.
    #[must_use]
    pub fn backend(source: rusqlite::Error) -> Self {
        Self::Backend {
            context: "query",
            source,
        }
    }

    /// Wrap a `rusqlite` error, naming the operation for diagnostics.
    #[must_use]
    pub fn backend_context(context: &'static str, source: rusqlite::Error) -> Self {
        Self::Backend { context, source }
    }

    /// The underlying `rusqlite` error, if this is a backend failure.
    #[must_use]
    pub fn backend_source(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::Backend { source, .. } => Some(source),
            Self::Io(_) | Self::LockPoisoned => None,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
