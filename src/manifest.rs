//! Manifest (MN): the two-integer commit record that defines the store's logical
//! length. Grounded on `original_source/db/db.hh`'s `_read_manifest`/`_write_manifest`,
//! hardened per `DESIGN.md` Open Question 7 (truncate after rewrite).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

const FILE_NAME: &str = "toc.txt";

pub struct Manifest {
    file: File,
    blocks_count: u64,
    rows_count: u64,
}

impl Manifest {
    /// Opens `dir/toc.txt`, creating it with zero counters if absent.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(FILE_NAME);
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if existed {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let mut parts = contents.split_whitespace();
            let blocks_count = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::FilesystemError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "manifest missing blocks_count",
                )))?;
            let rows_count = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::FilesystemError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "manifest missing rows_count",
                )))?;
            Ok(Self {
                file,
                blocks_count,
                rows_count,
            })
        } else {
            let mut manifest = Self {
                file,
                blocks_count: 0,
                rows_count: 0,
            };
            manifest.rewrite()?;
            Ok(manifest)
        }
    }

    pub fn blocks_count(&self) -> u64 {
        self.blocks_count
    }

    pub fn rows_count(&self) -> u64 {
        self.rows_count
    }

    pub fn set(&mut self, blocks_count: u64, rows_count: u64) -> Result<()> {
        self.blocks_count = blocks_count;
        self.rows_count = rows_count;
        self.rewrite()
    }

    /// Seeks to the start, writes the formatted counters, and truncates the file to the
    /// bytes just written. See `DESIGN.md` Open Question 7 for why this truncates
    /// rather than overwriting in place like the C reference.
    fn rewrite(&mut self) -> Result<()> {
        let line = format!("{} {}", self.blocks_count, self.rows_count);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(line.as_bytes())?;
        self.file.set_len(line.len() as u64)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_with_zero_counters() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.blocks_count(), 0);
        assert_eq!(manifest.rows_count(), 0);
        assert!(dir.path().join("toc.txt").exists());
    }

    #[test]
    fn round_trips_through_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut manifest = Manifest::open(dir.path()).unwrap();
            manifest.set(12345, 9999999).unwrap();
        }
        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.blocks_count(), 12345);
        assert_eq!(manifest.rows_count(), 9999999);
    }

    #[test]
    fn shrinking_value_leaves_no_stale_trailing_bytes() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::open(dir.path()).unwrap();
        manifest.set(1_000_000_000, 1_000_000_000).unwrap();
        manifest.set(1, 1).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("toc.txt")).unwrap();
        assert_eq!(contents, "1 1");
    }
}
