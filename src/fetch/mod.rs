//! Background HTTP ingest worker (FP, §4.7).

mod pool;
mod upstream;

pub use pool::FetchPool;
