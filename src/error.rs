use thiserror::Error;

/// Errors that can cross a component boundary inside the server.
///
/// Per the dispatch contract, only LOGIN's handler turns a variant of this
/// into a wire-visible `errno`; everywhere else an `Err` is logged and
/// swallowed at the boundary that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database query error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("failed to build database pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame missing msgId")]
    MissingMsgId,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: the database pool could not be established at startup")]
    StoreUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
