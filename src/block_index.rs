//! Block Index (BI): one [`crate::paged_column::PagedColumn`] of fixed-size block slots.
//! Grounded on `original_source/liboracle.c`'s `rcl_block_t`/`rcl_add_block`/`rcl_get_block`.

use std::path::Path;

use crate::bloom::{Bloom, BLOOM_BYTES};
use crate::error::Result;
use crate::paged_column::PagedColumn;

pub const BI_PAGE_CAPACITY: u64 = 100_000;
/// `logs_count: u64 | offset: u64 | bloom: [u8; 256]`
const SLOT_SIZE: usize = 8 + 8 + BLOOM_BYTES;

const LOGS_COUNT_RANGE: std::ops::Range<usize> = 0..8;
const OFFSET_RANGE: std::ops::Range<usize> = 8..16;
const BLOOM_RANGE: std::ops::Range<usize> = 16..16 + BLOOM_BYTES;

/// Owned, read-only view of one block slot.
#[derive(Clone, Copy)]
pub struct BlockSlot {
    pub logs_count: u64,
    pub offset: u64,
    pub bloom: Bloom,
}

pub struct BlockIndex {
    column: PagedColumn,
}

impl BlockIndex {
    pub fn new(dir: &Path) -> Self {
        Self {
            column: PagedColumn::new(dir, 'b', BI_PAGE_CAPACITY, SLOT_SIZE),
        }
    }

    pub fn open_existing(dir: &Path, blocks_count: u64) -> Result<Self> {
        Ok(Self {
            column: PagedColumn::open_existing(dir, 'b', BI_PAGE_CAPACITY, SLOT_SIZE, blocks_count)?,
        })
    }

    pub fn get(&self, block_number: u64) -> BlockSlot {
        let raw = self.column.get(block_number);
        let logs_count = u64::from_le_bytes(raw[LOGS_COUNT_RANGE].try_into().unwrap());
        let offset = u64::from_le_bytes(raw[OFFSET_RANGE].try_into().unwrap());
        let mut bloom_bytes = [0u8; BLOOM_BYTES];
        bloom_bytes.copy_from_slice(&raw[BLOOM_RANGE]);
        BlockSlot {
            logs_count,
            offset,
            bloom: Bloom::from_bytes(bloom_bytes),
        }
    }

    /// Creates slot `block_number` as empty, with `offset` continuing from the previous
    /// slot (`0` if this is the very first block). Does not touch `logs_count`/`offset`
    /// of any other slot.
    pub fn create_slot(&mut self, block_number: u64, offset: u64) -> Result<()> {
        self.column.extend_to(block_number)?;
        let raw = self.column.get_mut(block_number);
        raw[LOGS_COUNT_RANGE].copy_from_slice(&0u64.to_le_bytes());
        raw[OFFSET_RANGE].copy_from_slice(&offset.to_le_bytes());
        raw[BLOOM_RANGE].fill(0);
        Ok(())
    }

    pub fn increment_logs_count(&mut self, block_number: u64) {
        let raw = self.column.get_mut(block_number);
        let current = u64::from_le_bytes(raw[LOGS_COUNT_RANGE].try_into().unwrap());
        raw[LOGS_COUNT_RANGE].copy_from_slice(&(current + 1).to_le_bytes());
    }

    pub fn add_to_bloom(&mut self, block_number: u64, data: &[u8]) {
        let raw = self.column.get_mut(block_number);
        let mut bloom_bytes = [0u8; BLOOM_BYTES];
        bloom_bytes.copy_from_slice(&raw[BLOOM_RANGE]);
        let mut bloom = Bloom::from_bytes(bloom_bytes);
        bloom.set(data);
        raw[BLOOM_RANGE].copy_from_slice(&bloom.0);
    }

    pub fn flush(&self) -> Result<()> {
        self.column.flush()
    }

    pub fn apply_memory_budget(&self, keep_resident_pages: Option<usize>) {
        self.column.apply_memory_budget(keep_resident_pages);
    }
}
