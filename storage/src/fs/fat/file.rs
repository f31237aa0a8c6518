//! Byte-range access to file content through cluster chains.
use super::{Cluster, FatFs, dir::DirSlot, dirent::DirEntry};
use crate::{BlockDevice, FsError, FsResult, oft::OpenFile};
use alloc::vec::Vec;

impl<D: BlockDevice> FatFs<D> {
    /// Re-reads the directory entry backing `file`.
    fn file_slot(&mut self, file: &OpenFile) -> FsResult<DirSlot> {
        self.find_short(file.dir(), file.name())?
            .ok_or(FsError::NotFound)
    }

    /// Splits a byte offset into a chain index and an offset inside that cluster.
    fn split_offset(&self, offset: u64) -> (usize, u32) {
        let cluster_size = u64::from(self.bytes_per_cluster());
        #[expect(clippy::cast_possible_truncation, reason = "remainder of a u32")]
        let within = (offset % cluster_size) as u32;
        let index = usize::try_from(offset / cluster_size).unwrap_or(usize::MAX);
        (index, within)
    }

    /// Reads up to `len` bytes at the offset of `file` and advances it.
    ///
    /// The request is clamped to the end of the file, which is the only case
    /// where fewer bytes than asked are returned.
    pub fn read_file(&mut self, file: &mut OpenFile, len: usize) -> FsResult<Vec<u8>> {
        if !file.mode().can_read() {
            return Err(FsError::BadMode);
        }
        let size = u64::from(file.size());
        if file.offset() >= size {
            return Err(FsError::AtEof);
        }
        let wanted = usize::try_from(size - file.offset()).map_or(len, |left| left.min(len));

        let slot = self.file_slot(file)?;
        let chain = self.chain(slot.entry.first_cluster())?;
        let (mut index, mut within) = self.split_offset(file.offset());
        if index >= chain.len() {
            return Err(FsError::OffsetBeyondData);
        }

        let cluster_size = self.bytes_per_cluster() as usize;
        let mut data = Vec::with_capacity(wanted);
        while data.len() < wanted {
            let Some(&cluster) = chain.get(index) else {
                log::warn!(
                    "{} is {} bytes long but its chain holds only {} clusters",
                    file.name(),
                    size,
                    chain.len()
                );
                break;
            };
            let start = data.len();
            let count = (cluster_size - within as usize).min(wanted - start);
            data.resize(start + count, 0);
            self.read_cluster(cluster, within, &mut data[start..])?;

            index += 1;
            within = 0;
        }

        file.advance(data.len() as u64);
        Ok(data)
    }

    /// Writes all of `data` at the offset of `file` and advances it.
    ///
    /// The chain grows as needed before anything is written, and the size
    /// recorded in the directory entry follows the end of the write.
    pub fn write_file(&mut self, file: &mut OpenFile, data: &[u8]) -> FsResult<usize> {
        if !file.mode().can_write() {
            return Err(FsError::BadMode);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let end = file
            .offset()
            .checked_add(data.len() as u64)
            .and_then(|end| u32::try_from(end).ok())
            .ok_or(FsError::InvalidArgument)?;

        let slot = self.file_slot(file)?;
        let mut chain = self.chain(slot.entry.first_cluster())?;
        let cluster_size = u64::from(self.bytes_per_cluster());
        let wanted = usize::try_from(u64::from(end).div_ceil(cluster_size))
            .map_err(|_| FsError::InvalidArgument)?;

        // Nothing is allocated unless the whole write fits
        let missing = wanted.saturating_sub(chain.len());
        if missing > 0 {
            let free = usize::try_from(self.count_free_clusters()?).unwrap_or(usize::MAX);
            if free < missing {
                return Err(FsError::NoSpace);
            }
        }

        while chain.len() < wanted {
            let cluster = if let Some(&tail) = chain.last() {
                self.extend_chain(tail)?
            } else {
                let head = self.allocate_terminated()?;
                let mut entry = slot.entry;
                entry.set_first_cluster(head);
                self.write_slot(slot.location, &entry)?;
                head
            };
            chain.push(cluster);
        }

        let (mut index, mut within) = self.split_offset(file.offset());
        let mut written = 0;
        while written < data.len() {
            let cluster: Cluster = *chain.get(index).ok_or(FsError::OffsetBeyondData)?;
            let count = (cluster_size as usize - within as usize).min(data.len() - written);
            self.write_cluster(cluster, within, &data[written..written + count])?;

            written += count;
            index += 1;
            within = 0;
        }

        if end > file.size() {
            self.write_slot_field(slot.location, DirEntry::FILE_SIZE, &end.to_le_bytes())?;
            file.set_size(end);
        }
        file.advance(written as u64);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::fat::tests::small_volume,
        oft::{AccessMode, OpenFile},
    };

    fn open(fs: &mut FatFs<crate::fs::dev::MemDevice>, name: &str, mode: AccessMode) -> OpenFile {
        let root = fs.root_cluster();
        let slot = fs.lookup(root, name).unwrap();
        OpenFile::new(&slot.entry, root, "/", mode)
    }

    #[test]
    fn test_write_then_read() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "FILE1", false).unwrap();

        let mut writer = open(&mut fs, "FILE1", AccessMode::Write);
        assert_eq!(fs.write_file(&mut writer, b"hello").unwrap(), 5);
        assert_eq!(writer.offset(), 5);
        assert_eq!(writer.size(), 5);

        // The entry now owns a cluster and records the size
        let entry = fs.lookup(root, "FILE1").unwrap().entry;
        assert_eq!(entry.file_size(), 5);
        assert!(fs.contains(entry.first_cluster()));

        let mut reader = open(&mut fs, "FILE1", AccessMode::Read);
        assert_eq!(fs.read_file(&mut reader, 5).unwrap(), b"hello");
        assert_eq!(fs.read_file(&mut reader, 1), Err(FsError::AtEof));
    }

    #[test]
    fn test_read_is_clamped() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "SHORT", false).unwrap();

        let mut file = open(&mut fs, "SHORT", AccessMode::ReadWrite);
        fs.write_file(&mut file, b"abcdef").unwrap();
        file.seek(2).unwrap();
        assert_eq!(fs.read_file(&mut file, 100).unwrap(), b"cdef");
        assert_eq!(file.offset(), 6);
    }

    #[test]
    fn test_mode_checks() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "F", false).unwrap();

        let mut reader = open(&mut fs, "F", AccessMode::Read);
        assert_eq!(fs.write_file(&mut reader, b"x"), Err(FsError::BadMode));

        let mut writer = open(&mut fs, "F", AccessMode::Write);
        fs.write_file(&mut writer, b"x").unwrap();
        writer.seek(0).unwrap();
        assert_eq!(fs.read_file(&mut writer, 1), Err(FsError::BadMode));

        // Empty writes allocate nothing
        let free = fs.count_free_clusters().unwrap();
        assert_eq!(fs.write_file(&mut writer, b"").unwrap(), 0);
        assert_eq!(fs.count_free_clusters().unwrap(), free);
    }

    #[test]
    fn test_growth_across_clusters() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "GROW", false).unwrap();

        let payload: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
        let mut file = open(&mut fs, "GROW", AccessMode::ReadWrite);
        fs.write_file(&mut file, &payload).unwrap();

        let entry = fs.lookup(root, "GROW").unwrap().entry;
        assert_eq!(entry.file_size(), 1300);
        assert_eq!(fs.chain(entry.first_cluster()).unwrap().len(), 3);

        // Read back across both boundaries
        file.seek(500).unwrap();
        let middle = fs.read_file(&mut file, 600).unwrap();
        assert_eq!(middle, payload[500..1100]);
    }

    #[test]
    fn test_overwrite_keeps_size() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "OVER", false).unwrap();

        let mut file = open(&mut fs, "OVER", AccessMode::ReadWrite);
        fs.write_file(&mut file, b"0123456789").unwrap();
        file.seek(3).unwrap();
        fs.write_file(&mut file, b"abc").unwrap();
        assert_eq!(file.size(), 10);
        assert_eq!(file.offset(), 6);

        // Extending from the middle grows the size to the new end
        fs.write_file(&mut file, b"WXYZW").unwrap();
        assert_eq!(file.size(), 11);

        file.seek(0).unwrap();
        assert_eq!(fs.read_file(&mut file, 11).unwrap(), b"012abcWXYZW");
        assert_eq!(fs.lookup(root, "OVER").unwrap().entry.file_size(), 11);
    }

    #[test]
    fn test_offset_beyond_data() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let slot = fs.create_entry(root, "LIAR", false).unwrap();

        // Size claims two clusters, chain holds one
        let mut entry = slot.entry;
        entry.set_first_cluster(fs.allocate_terminated().unwrap());
        entry.set_file_size(1024);
        fs.write_slot(slot.location, &entry).unwrap();

        let mut file = open(&mut fs, "LIAR", AccessMode::Read);
        file.seek(600).unwrap();
        assert_eq!(fs.read_file(&mut file, 10), Err(FsError::OffsetBeyondData));

        // Reads that start inside the chain stop where it ends
        file.seek(500).unwrap();
        assert_eq!(fs.read_file(&mut file, 100).unwrap().len(), 12);
    }

    #[test]
    fn test_write_larger_than_free_space() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "TIGHT", false).unwrap();

        // Two free clusters left, the write needs three
        let last = fs.last_cluster().value();
        for c in 3..last - 1 {
            fs.write_fat_entry(Cluster::new(c), 0x0FFF_FFFF).unwrap();
        }
        assert_eq!(fs.count_free_clusters().unwrap(), 2);
        let before = fs.device().as_bytes().to_vec();

        let mut file = open(&mut fs, "TIGHT", AccessMode::Write);
        assert_eq!(
            fs.write_file(&mut file, &[b'z'; 1300]),
            Err(FsError::NoSpace)
        );
        assert_eq!(fs.device().as_bytes(), before.as_slice());
        assert_eq!(fs.count_free_clusters().unwrap(), 2);
        let entry = fs.lookup(root, "TIGHT").unwrap().entry;
        assert_eq!(entry.first_cluster(), Cluster::FREE);
        assert_eq!(entry.file_size(), 0);
        assert_eq!(file.offset(), 0);

        // A write that fits takes exactly the remaining clusters
        assert_eq!(fs.write_file(&mut file, &[b'z'; 1024]).unwrap(), 1024);
        assert_eq!(fs.count_free_clusters().unwrap(), 0);
        let head = file_first(&mut fs, "TIGHT");
        assert_eq!(fs.chain(head).unwrap().len(), 2);
    }

    fn file_first(fs: &mut FatFs<crate::fs::dev::MemDevice>, name: &str) -> Cluster {
        let root = fs.root_cluster();
        fs.lookup(root, name).unwrap().entry.first_cluster()
    }

    #[test]
    fn test_grow_existing_chain_without_space() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "GROW", false).unwrap();

        let mut file = open(&mut fs, "GROW", AccessMode::Write);
        fs.write_file(&mut file, b"seed").unwrap();
        let head = file_first(&mut fs, "GROW");

        // One free cluster left, extending to three needs two
        let last = fs.last_cluster().value();
        for c in 4..last {
            fs.write_fat_entry(Cluster::new(c), 0x0FFF_FFFF).unwrap();
        }
        assert_eq!(fs.count_free_clusters().unwrap(), 1);
        let before = fs.device().as_bytes().to_vec();

        assert_eq!(
            fs.write_file(&mut file, &[1u8; 1200]),
            Err(FsError::NoSpace)
        );
        assert_eq!(fs.device().as_bytes(), before.as_slice());
        assert_eq!(fs.chain(head).unwrap(), [head]);
        assert_eq!(file.size(), 4);
    }

    #[test]
    fn test_write_without_space() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        fs.create_entry(root, "FULL", false).unwrap();

        for c in 3..=fs.last_cluster().value() {
            fs.write_fat_entry(Cluster::new(c), 0x0FFF_FFFF).unwrap();
        }
        let mut file = open(&mut fs, "FULL", AccessMode::Write);
        assert_eq!(fs.write_file(&mut file, b"data"), Err(FsError::NoSpace));
        assert_eq!(file.size(), 0);
        assert_eq!(file.offset(), 0);
    }
}
