//! Directory enumeration and lookup.
use super::{
    Cluster, FatFs,
    dirent::{DIR_ENTRY_SIZE, DirEntry, ShortName},
};
use crate::{BlockDevice, FsError, FsResult};
use alloc::{vec, vec::Vec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Position of a 32-byte record on the volume.
pub struct SlotLocation {
    /// Directory cluster holding the record
    pub cluster: Cluster,
    /// Record index inside the cluster
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A live directory entry together with where it was read from.
pub struct DirSlot {
    pub location: SlotLocation,
    pub entry: DirEntry,
}

impl<D: BlockDevice> FatFs<D> {
    #[must_use]
    #[inline]
    pub const fn entries_per_cluster(&self) -> u32 {
        self.bytes_per_cluster() / DIR_ENTRY_SIZE as u32
    }

    fn slot_offset(&self, location: SlotLocation) -> FsResult<u64> {
        if location.index >= self.entries_per_cluster() {
            return Err(FsError::InvalidArgument);
        }
        Ok(self.cluster_to_offset(location.cluster)?
            + u64::from(location.index) * DIR_ENTRY_SIZE as u64)
    }

    pub fn read_slot(&mut self, location: SlotLocation) -> FsResult<DirEntry> {
        let offset = self.slot_offset(location)?;
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        self.read_at(&mut raw, offset)?;
        Ok(DirEntry::from_bytes(raw))
    }

    /// Overwrites the whole 32-byte record at `location`.
    pub fn write_slot(&mut self, location: SlotLocation, entry: &DirEntry) -> FsResult<()> {
        let offset = self.slot_offset(location)?;
        self.write_at(entry.as_bytes(), offset)
    }

    /// Overwrites `bytes` at `field` bytes into the record at `location`.
    pub(crate) fn write_slot_field(
        &mut self,
        location: SlotLocation,
        field: usize,
        bytes: &[u8],
    ) -> FsResult<()> {
        if field + bytes.len() > DIR_ENTRY_SIZE {
            return Err(FsError::InvalidArgument);
        }
        let offset = self.slot_offset(location)?;
        self.write_at(bytes, offset + field as u64)
    }

    fn read_dir_cluster(&mut self, cluster: Cluster) -> FsResult<Vec<u8>> {
        let mut buf = vec![0u8; self.bytes_per_cluster() as usize];
        self.read_cluster(cluster, 0, &mut buf)?;
        Ok(buf)
    }

    /// Lists the live entries of one directory cluster, in on-disk order.
    ///
    /// Deleted records and long name records are skipped; a never used
    /// record ends the listing.
    pub fn entries_in_cluster(&mut self, cluster: Cluster) -> FsResult<Vec<DirSlot>> {
        let buf = self.read_dir_cluster(cluster)?;
        let mut slots = Vec::new();

        for (index, raw) in (0u32..).zip(buf.chunks_exact(DIR_ENTRY_SIZE)) {
            let mut bytes = [0u8; DIR_ENTRY_SIZE];
            bytes.copy_from_slice(raw);
            let entry = DirEntry::from_bytes(bytes);

            if entry.is_end() {
                break;
            }
            if entry.is_deleted() || entry.is_long_name() {
                continue;
            }
            slots.push(DirSlot {
                location: SlotLocation { cluster, index },
                entry,
            });
        }

        Ok(slots)
    }

    /// Lists the live entries of every cluster of a directory.
    pub fn entries_in_chain(&mut self, start: Cluster) -> FsResult<Vec<DirSlot>> {
        let mut slots = Vec::new();
        for cluster in self.chain(start)? {
            slots.extend(self.entries_in_cluster(cluster)?);
        }
        Ok(slots)
    }

    /// Looks `name` up in the directory starting at `dir`.
    ///
    /// The comparison ignores case and volume labels never match.
    pub fn find_by_name(&mut self, dir: Cluster, name: &str) -> FsResult<Option<DirSlot>> {
        Ok(self
            .entries_in_chain(dir)?
            .into_iter()
            .find(|slot| !slot.entry.is_volume_id() && slot.entry.name().matches(name)))
    }

    /// Finds the entry stored under exactly `name`.
    pub fn find_short(&mut self, dir: Cluster, name: &ShortName) -> FsResult<Option<DirSlot>> {
        Ok(self
            .entries_in_chain(dir)?
            .into_iter()
            .find(|slot| !slot.entry.is_volume_id() && slot.entry.name() == *name))
    }

    /// Same as [`FatFs::find_by_name`], with a miss reported as [`FsError::NotFound`].
    pub fn lookup(&mut self, dir: Cluster, name: &str) -> FsResult<DirSlot> {
        self.find_by_name(dir, name)?.ok_or(FsError::NotFound)
    }

    /// Returns the first never used or deleted record of the directory.
    pub fn find_free_slot(&mut self, dir: Cluster) -> FsResult<Option<SlotLocation>> {
        for cluster in self.chain(dir)? {
            let buf = self.read_dir_cluster(cluster)?;
            let free = (0u32..)
                .zip(buf.chunks_exact(DIR_ENTRY_SIZE))
                .find(|(_, raw)| {
                    raw[0] == DirEntry::END_OF_ENTRIES || raw[0] == DirEntry::DELETED_ENTRY
                });
            if let Some((index, _)) = free {
                return Ok(Some(SlotLocation { cluster, index }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat::{dirent::Attributes, tests::small_volume};

    fn file(name: &str) -> DirEntry {
        DirEntry::new_file(ShortName::new(name).unwrap())
    }

    fn at(cluster: Cluster, index: u32) -> SlotLocation {
        SlotLocation { cluster, index }
    }

    #[test]
    fn test_slot_io() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        fs.write_slot(at(root, 3), &file("A")).unwrap();
        assert_eq!(fs.read_slot(at(root, 3)).unwrap(), file("A"));

        // One cluster of 512 bytes holds 16 records
        assert_eq!(fs.entries_per_cluster(), 16);
        assert_eq!(
            fs.read_slot(at(root, 16)),
            Err(FsError::InvalidArgument)
        );
    }

    #[test]
    fn test_entries_in_cluster() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        let mut deleted = file("GONE");
        deleted.mark_deleted();
        let mut lfn = [0u8; DIR_ENTRY_SIZE];
        lfn[0] = 0x41;
        lfn[11] = Attributes::LONG_NAME;

        fs.write_slot(at(root, 0), &file("A")).unwrap();
        fs.write_slot(at(root, 1), &deleted).unwrap();
        fs.write_slot(at(root, 2), &DirEntry::from_bytes(lfn)).unwrap();
        fs.write_slot(at(root, 3), &file("B")).unwrap();
        // Never used record: nothing after it is listed
        fs.write_slot(at(root, 5), &file("HIDDEN")).unwrap();

        let slots = fs.entries_in_cluster(root).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].location, at(root, 0));
        assert!(slots[0].entry.name().matches("A"));
        assert_eq!(slots[1].location, at(root, 3));
        assert!(slots[1].entry.name().matches("B"));
    }

    #[test]
    fn test_entries_in_chain() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        for i in 0..16 {
            fs.write_slot(at(root, i), &file(&alloc::format!("F{i}"))).unwrap();
        }
        let second = fs.extend_chain(root).unwrap();
        fs.write_slot(at(second, 0), &file("LAST")).unwrap();

        let slots = fs.entries_in_chain(root).unwrap();
        assert_eq!(slots.len(), 17);
        assert_eq!(slots[16].location, at(second, 0));

        let found = fs.lookup(root, "last").unwrap();
        assert_eq!(found.location, at(second, 0));
        assert_eq!(fs.lookup(root, "NOPE"), Err(FsError::NotFound));
    }

    #[test]
    fn test_find_ignores_volume_label() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        let mut label = [0u8; DIR_ENTRY_SIZE];
        label[..11].copy_from_slice(b"DISK       ");
        label[11] = Attributes::VOLUME_ID;
        fs.write_slot(at(root, 0), &DirEntry::from_bytes(label)).unwrap();

        assert_eq!(fs.entries_in_chain(root).unwrap().len(), 1);
        assert_eq!(fs.find_by_name(root, "DISK").unwrap(), None);
    }

    #[test]
    fn test_find_free_slot() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        assert_eq!(fs.find_free_slot(root).unwrap(), Some(at(root, 0)));

        for i in 0..16 {
            fs.write_slot(at(root, i), &file(&alloc::format!("F{i}"))).unwrap();
        }
        assert_eq!(fs.find_free_slot(root).unwrap(), None);

        // Deleted records are reused
        let mut entry = fs.read_slot(at(root, 7)).unwrap();
        entry.mark_deleted();
        fs.write_slot(at(root, 7), &entry).unwrap();
        assert_eq!(fs.find_free_slot(root).unwrap(), Some(at(root, 7)));
    }

    #[test]
    fn test_write_slot_field() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let location = at(root, 0);

        fs.write_slot(location, &file("SIZED")).unwrap();
        fs.write_slot_field(location, 28, &1234u32.to_le_bytes()).unwrap();
        assert_eq!(fs.read_slot(location).unwrap().file_size(), 1234);

        assert_eq!(
            fs.write_slot_field(location, 30, &[0; 4]),
            Err(FsError::InvalidArgument)
        );
    }
}
