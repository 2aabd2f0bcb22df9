//! Row Store (RS): two parallel paged columns holding, per row, the address
//! fingerprint and the four topic fingerprints. Grounded on
//! `original_source/liboracle.c`'s `rcl_cell_address_t`/`rcl_cell_topics_t`.

use std::path::Path;

use crate::error::Result;
use crate::hash::Fingerprint;
use crate::paged_column::PagedColumn;

pub const RS_PAGE_CAPACITY: u64 = 1_000_000;
const ADDRESS_ITEM_SIZE: usize = 8;
const TOPICS_ITEM_SIZE: usize = 8 * 4;

pub struct RowStore {
    addresses: PagedColumn,
    topics: PagedColumn,
}

impl RowStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            addresses: PagedColumn::new(dir, 'a', RS_PAGE_CAPACITY, ADDRESS_ITEM_SIZE),
            topics: PagedColumn::new(dir, 't', RS_PAGE_CAPACITY, TOPICS_ITEM_SIZE),
        }
    }

    pub fn open_existing(dir: &Path, rows_count: u64) -> Result<Self> {
        Ok(Self {
            addresses: PagedColumn::open_existing(dir, 'a', RS_PAGE_CAPACITY, ADDRESS_ITEM_SIZE, rows_count)?,
            topics: PagedColumn::open_existing(dir, 't', RS_PAGE_CAPACITY, TOPICS_ITEM_SIZE, rows_count)?,
        })
    }

    pub fn extend_to(&mut self, row_index: u64) -> Result<()> {
        self.addresses.extend_to(row_index)?;
        self.topics.extend_to(row_index)?;
        Ok(())
    }

    pub fn append(&mut self, row_index: u64, address: Fingerprint, topics: [Fingerprint; 4]) -> Result<()> {
        self.extend_to(row_index)?;
        self.addresses
            .get_mut(row_index)
            .copy_from_slice(&address.as_u64().to_le_bytes());

        let raw_topics = self.topics.get_mut(row_index);
        for (i, t) in topics.iter().enumerate() {
            raw_topics[i * 8..i * 8 + 8].copy_from_slice(&t.as_u64().to_le_bytes());
        }
        Ok(())
    }

    pub fn address(&self, row_index: u64) -> Fingerprint {
        Fingerprint(u64::from_le_bytes(self.addresses.get(row_index).try_into().unwrap()))
    }

    pub fn topics(&self, row_index: u64) -> [Fingerprint; 4] {
        let raw = self.topics.get(row_index);
        let mut out = [Fingerprint(0); 4];
        for i in 0..4 {
            out[i] = Fingerprint(u64::from_le_bytes(raw[i * 8..i * 8 + 8].try_into().unwrap()));
        }
        out
    }

    pub fn flush(&self) -> Result<()> {
        self.addresses.flush()?;
        self.topics.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let mut rs = RowStore::new(dir.path());

        let addr = Fingerprint(123);
        let topics = [Fingerprint(1), Fingerprint(2), Fingerprint(0), Fingerprint(4)];
        rs.append(0, addr, topics).unwrap();

        assert_eq!(rs.address(0), addr);
        assert_eq!(rs.topics(0), topics);
    }

    #[test]
    fn distinct_rows_do_not_alias() {
        let dir = tempdir().unwrap();
        let mut rs = RowStore::new(dir.path());
        rs.append(0, Fingerprint(1), [Fingerprint(10); 4]).unwrap();
        rs.append(1, Fingerprint(2), [Fingerprint(20); 4]).unwrap();

        assert_eq!(rs.address(0), Fingerprint(1));
        assert_eq!(rs.address(1), Fingerprint(2));
        assert_eq!(rs.topics(0), [Fingerprint(10); 4]);
        assert_eq!(rs.topics(1), [Fingerprint(20); 4]);
    }
}
