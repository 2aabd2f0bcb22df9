//! Append-only columnar index for blockchain event logs.
//!
//! Ingests a linear, block-ordered stream of logs, persists them as memory-mapped
//! paged columns, and answers count queries over a block range filtered by contract
//! address and up to four indexed topics. See [`StoreEngine`] for the main entry
//! point.

mod block_index;
mod bloom;
mod config;
mod error;
mod fetch;
mod hash;
mod manifest;
mod mmap_file;
mod paged_column;
mod query;
mod row_store;
mod store;
mod types;

pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use fetch::FetchPool;
pub use hash::Fingerprint;
pub use query::{Candidate, PreparedQuery, Query};
pub use store::StoreEngine;
pub use types::{Address, LogRecord, Topic};
