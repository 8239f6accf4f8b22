//! In-memory block store backing a single disk process. A disk holds
//! exactly one copy of every block assigned to it; `fail` discards an
//! entire DSS's worth of blocks in one shot, modelling a disk crash.

use std::collections::{BTreeMap, HashMap};

use dss_core::BlockTag;

use crate::error::DiskError;

type FileBlocks = BTreeMap<u64, (Vec<u8>, BlockTag)>;

#[derive(Default)]
pub struct BlockStore {
    storage: HashMap<String, HashMap<String, FileBlocks>>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore::default()
    }

    pub fn write_block(
        &mut self,
        dss_name: &str,
        file_name: &str,
        stripe_num: u64,
        block_type: BlockTag,
        block_data: Vec<u8>,
    ) {
        self.storage
            .entry(dss_name.to_string())
            .or_default()
            .entry(file_name.to_string())
            .or_default()
            .insert(stripe_num, (block_data, block_type));
    }

    pub fn read_block(
        &self,
        dss_name: &str,
        file_name: &str,
        stripe_num: u64,
    ) -> Result<(Vec<u8>, BlockTag), DiskError> {
        self.storage
            .get(dss_name)
            .and_then(|files| files.get(file_name))
            .and_then(|blocks| blocks.get(&stripe_num))
            .cloned()
            .ok_or(DiskError::BlockNotFound)
    }

    /// Drop every block belonging to `dss_name`, simulating the disk
    /// losing its contents.
    pub fn fail(&mut self, dss_name: &str) {
        self.storage.remove(dss_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut store = BlockStore::new();
        store.write_block("A", "f.txt", 0, BlockTag::Data, vec![1, 2, 3]);
        let (data, tag) = store.read_block("A", "f.txt", 0).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(tag, BlockTag::Data);
    }

    #[test]
    fn read_missing_block_fails() {
        let store = BlockStore::new();
        assert_eq!(
            store.read_block("A", "f.txt", 0).unwrap_err(),
            DiskError::BlockNotFound
        );
    }

    #[test]
    fn fail_drops_only_the_named_dss() {
        let mut store = BlockStore::new();
        store.write_block("A", "f.txt", 0, BlockTag::Data, vec![9]);
        store.write_block("B", "g.txt", 0, BlockTag::Parity, vec![8]);

        store.fail("A");

        assert_eq!(
            store.read_block("A", "f.txt", 0).unwrap_err(),
            DiskError::BlockNotFound
        );
        assert!(store.read_block("B", "g.txt", 0).is_ok());
    }

    #[test]
    fn rewriting_a_stripe_overwrites_the_previous_block() {
        let mut store = BlockStore::new();
        store.write_block("A", "f.txt", 0, BlockTag::Data, vec![1]);
        store.write_block("A", "f.txt", 0, BlockTag::Data, vec![2]);
        let (data, _) = store.read_block("A", "f.txt", 0).unwrap();
        assert_eq!(data, vec![2]);
    }
}
