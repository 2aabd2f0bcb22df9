//! A single memory-mapped file: one file descriptor, one fixed-length read-write shared
//! mapping. This is the fundamental storage primitive paged columns are built from (see
//! `original_source/db/db.hh` for the `open`/`mmap`/`ftruncate`/0600 shape this mirrors).

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{Error, Result};

/// Owns a file descriptor and a mapping over exactly `len` bytes of it.
///
/// Every `MmapFile` in this crate backs one fixed-capacity page of a [`crate::paged_column::PagedColumn`];
/// pages are always created at their full nominal size (see `DESIGN.md`, Open Question 6),
/// so there is no separate "reserve extra, grow later" window to manage here — the
/// mapping length simply *is* the page's logical capacity in bytes.
pub struct MmapFile {
    file: File,
    mmap: MmapMut,
}

impl MmapFile {
    /// Opens `path`, creating it with mode 0600 if absent and sizing it to exactly
    /// `len` bytes on first creation, then maps it read-write/shared.
    pub fn open(path: &Path, len: u64) -> Result<Self> {
        let existed = path.exists();

        let file = open_with_mode_0600(path)?;
        if !existed {
            file.set_len(len)?;
        }

        // SAFETY: the mapped file is exclusively owned by this process's store
        // directory for the lifetime of the handle; no other process is expected to
        // write it concurrently. Bounds on logical reads/writes are enforced by the
        // paged column above us, never by this type.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { file, mmap })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Best-effort residency hint; see `DESIGN.md` Open Question 3. Never fails loudly —
    /// `madvise` is advisory and a failure here should not turn into a query error.
    pub fn advise(&self, advice: memmap2::Advice) {
        if let Err(err) = self.mmap.advise(advice) {
            tracing::debug!(?err, "mmap advise failed, ignoring");
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap.flush().map_err(Error::from)
    }
}

#[cfg(unix)]
fn open_with_mode_0600(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o600)
        .open(path)
        .map_err(Error::from)
}

#[cfg(not(unix))]
fn open_with_mode_0600(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(Error::from)
}
