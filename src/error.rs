use thiserror::Error;

/// Stable, externally-visible error codes.
///
/// Ordinals are part of the wire/API contract (see `SPEC_FULL.md` §6): a future FFI
/// shim built on top of this crate would hand these integers across the boundary, so
/// existing values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    AppendToOldBlock = 1,
    InvalidUpstream = 2,
    TooLargeQuery = 3,
    NodeRequestError = 4,
    OutOfMemory = 5,
    FilesystemError = 6,
    LibraryError = 7,
    QueryOverflow = 8,
    InvalidDataDir = 9,
    Unknown = 10,
    InvalidBatch = 11,
}

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("insert batch contains a block number older than the last committed block")]
    AppendToOldBlock,

    #[error("invalid upstream url: {0}")]
    InvalidUpstream(String),

    #[error("prepared query exceeds the 4 MiB size cap")]
    TooLargeQuery,

    #[error("upstream request failed: {0}")]
    NodeRequestError(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("filesystem error: {0}")]
    FilesystemError(#[from] std::io::Error),

    #[error("library error: {0}")]
    LibraryError(String),

    #[error("query result exceeded the configured row-count limit")]
    QueryOverflow,

    #[error("invalid data directory: {0}")]
    InvalidDataDir(String),

    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("invalid insert batch: {0}")]
    InvalidBatch(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::AppendToOldBlock => ErrorCode::AppendToOldBlock,
            Error::InvalidUpstream(_) => ErrorCode::InvalidUpstream,
            Error::TooLargeQuery => ErrorCode::TooLargeQuery,
            Error::NodeRequestError(_) => ErrorCode::NodeRequestError,
            Error::OutOfMemory(_) => ErrorCode::OutOfMemory,
            Error::FilesystemError(_) => ErrorCode::FilesystemError,
            Error::LibraryError(_) => ErrorCode::LibraryError,
            Error::QueryOverflow => ErrorCode::QueryOverflow,
            Error::InvalidDataDir(_) => ErrorCode::InvalidDataDir,
            Error::Unknown(_) => ErrorCode::Unknown,
            Error::InvalidBatch(_) => ErrorCode::InvalidBatch,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
