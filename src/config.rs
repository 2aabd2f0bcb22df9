//! Engine configuration surface (§6): directory, memory budget, upstream URL, tip
//! height, grouped into one plain struct the way `node/db`'s crates take explicit
//! constructor arguments rather than reading a global.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dir: PathBuf,
    /// Advisory; `0` means let the OS decide (see `DESIGN.md` Open Question 3).
    #[serde(default)]
    pub memory_budget_bytes: u64,
    #[serde(default)]
    pub upstream_url: Option<String>,
    #[serde(default)]
    pub tip_height: u64,
}

impl Config {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory_budget_bytes: 0,
            upstream_url: None,
            tip_height: 0,
        }
    }

    pub fn with_memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    pub fn with_tip_height(mut self, height: u64) -> Self {
        self.tip_height = height;
        self
    }
}
