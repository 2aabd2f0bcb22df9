//! A logical fixed-item array backed by a sequence of fixed-capacity [`MmapFile`] pages
//! (see `original_source/liboracle.c`'s `rcl_page_t`/`rcl_page_filename`, and the
//! directory-scan-for-existing-pages idiom in `node/db/src/rolling/rolling_store.rs`).

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mmap_file::MmapFile;

/// Global index split into (page index, in-page slot index).
pub fn locate(index: u64, page_capacity: u64) -> (u64, u64) {
    (index / page_capacity, index % page_capacity)
}

fn page_file_name(page_index: u64, role: char) -> String {
    format!("{page_index:02x}.{role}.rcl")
}

/// Sequence of same-role pages, each holding exactly `page_capacity` fixed-size items.
pub struct PagedColumn {
    dir: PathBuf,
    role: char,
    page_capacity: u64,
    item_size: usize,
    pages: Vec<MmapFile>,
}

impl PagedColumn {
    pub fn new(dir: &Path, role: char, page_capacity: u64, item_size: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            role,
            page_capacity,
            item_size,
            pages: Vec::new(),
        }
    }

    /// Opens pages `0..=highest_needed_page` so that `logical_len` items are addressable.
    /// Used at store-open time to reopen exactly as many pages as the manifest implies
    /// are needed, per `spec.md` §4.5.
    pub fn open_existing(
        dir: &Path,
        role: char,
        page_capacity: u64,
        item_size: usize,
        logical_len: u64,
    ) -> Result<Self> {
        let mut column = Self::new(dir, role, page_capacity, item_size);
        if logical_len > 0 {
            column.extend_to(logical_len - 1)?;
        }
        Ok(column)
    }

    pub fn page_capacity(&self) -> u64 {
        self.page_capacity
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Ensures the page covering global item index `index` exists, opening new (fully
    /// allocated) pages as needed.
    pub fn extend_to(&mut self, index: u64) -> Result<()> {
        let (page_index, _) = locate(index, self.page_capacity);
        while (self.pages.len() as u64) <= page_index {
            let next = self.pages.len() as u64;
            let path = self.dir.join(page_file_name(next, self.role));
            let bytes = self.page_capacity * self.item_size as u64;
            self.pages.push(MmapFile::open(&path, bytes)?);
        }
        Ok(())
    }

    /// Byte slice for the item at global index `index`. Caller guarantees `index` is
    /// within the column's already-extended range and within the logical length
    /// tracked by the manifest.
    pub fn get(&self, index: u64) -> &[u8] {
        let (page_index, slot) = locate(index, self.page_capacity);
        let page = &self.pages[page_index as usize];
        let start = slot as usize * self.item_size;
        &page.as_slice()[start..start + self.item_size]
    }

    pub fn get_mut(&mut self, index: u64) -> &mut [u8] {
        let (page_index, slot) = locate(index, self.page_capacity);
        let page = &mut self.pages[page_index as usize];
        let start = slot as usize * self.item_size;
        &mut page.as_mut_slice()[start..start + self.item_size]
    }

    pub fn flush(&self) -> Result<()> {
        for page in &self.pages {
            page.flush()?;
        }
        Ok(())
    }

    /// Applies a residency hint to pages beyond `keep_resident_pages`, most-recent pages
    /// preferred (see `DESIGN.md` Open Question 3). No-op if `keep_resident_pages` is 0,
    /// which this crate treats as "let the OS decide" per `spec.md` §4.6.
    pub fn apply_memory_budget(&self, keep_resident_pages: Option<usize>) {
        let Some(keep) = keep_resident_pages else {
            return;
        };
        let total = self.pages.len();
        for (i, page) in self.pages.iter().enumerate() {
            let distance_from_tail = total - i;
            if distance_from_tail <= keep {
                page.advise(memmap2::Advice::WillNeed);
            } else {
                page.advise(memmap2::Advice::DontNeed);
            }
        }
    }
}
