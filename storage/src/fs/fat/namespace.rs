//! Navigation and directory mutation: create, rename/move and delete entries.
use super::{
    Cluster, FatFs,
    dir::{DirSlot, SlotLocation},
    dirent::{DirEntry, ShortName},
};
use crate::{BlockDevice, FsError, FsResult, oft::OpenFileTable};

impl<D: BlockDevice> FatFs<D> {
    /// Resolves the directory `name` relative to `cwd`.
    ///
    /// `.` is `cwd` itself and `..` at the root stays at the root.
    pub fn change_dir(&mut self, cwd: Cluster, name: &str) -> FsResult<Cluster> {
        if name == "." {
            return Ok(cwd);
        }
        if name == ".." && cwd == self.root_cluster() {
            return Ok(cwd);
        }

        let slot = self.lookup(cwd, name)?;
        if !slot.entry.is_directory() {
            return Err(FsError::TypeMismatch);
        }
        self.directory_cluster(&slot.entry)
    }

    /// First cluster of the directory described by `entry`.
    fn directory_cluster(&self, entry: &DirEntry) -> FsResult<Cluster> {
        let cluster = entry.first_cluster();
        if entry.name() == ShortName::DOTDOT {
            return Ok(self.resolve_dir_cluster(cluster));
        }
        if !self.contains(cluster) {
            log::warn!("Directory {} points outside the volume ({cluster})", entry.name());
            return Err(FsError::Io);
        }
        Ok(cluster)
    }

    /// Creates an empty file or directory called `name` in `parent`.
    pub fn create_entry(&mut self, parent: Cluster, name: &str, is_dir: bool) -> FsResult<DirSlot> {
        let short = ShortName::new(name)?;
        if short.is_dot() {
            return Err(FsError::InvalidArgument);
        }
        if self.find_by_name(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        // Growing the parent and the content of a directory both take a cluster
        let needed = u32::from(self.find_free_slot(parent)?.is_none()) + u32::from(is_dir);
        if needed > 0 && self.count_free_clusters()? < needed {
            return Err(FsError::NoSpace);
        }

        let location = self.claim_slot(parent)?;
        let entry = if is_dir {
            let content = self.allocate_terminated()?;
            let up = if parent == self.root_cluster() {
                Cluster::FREE
            } else {
                parent
            };
            let dot = SlotLocation {
                cluster: content,
                index: 0,
            };
            let dotdot = SlotLocation {
                cluster: content,
                index: 1,
            };
            self.write_slot(dot, &DirEntry::new_directory(ShortName::DOT, content))?;
            self.write_slot(dotdot, &DirEntry::new_directory(ShortName::DOTDOT, up))?;
            DirEntry::new_directory(short, content)
        } else {
            DirEntry::new_file(short)
        };

        self.write_slot(location, &entry)?;
        log::debug!("Created {short} in directory {parent}");
        Ok(DirSlot { location, entry })
    }

    /// Renames `src` in place, or moves it into the directory `dest`.
    ///
    /// A move relocates the 32-byte record only: content clusters, including
    /// the `..` record of a moved directory, are left untouched.
    pub fn rename_or_move(
        &mut self,
        parent: Cluster,
        src: &str,
        dest: &str,
        open: &OpenFileTable,
    ) -> FsResult<()> {
        if ShortName::new(src)?.is_dot() || dest == "." {
            return Err(FsError::InvalidArgument);
        }
        let source = self.lookup(parent, src)?;
        if open.is_open_in(parent, &source.entry.name()) {
            return Err(FsError::Busy);
        }

        match self.find_by_name(parent, dest)? {
            Some(target) if target.location == source.location => Err(FsError::InvalidArgument),
            Some(target) if target.entry.is_directory() => {
                let into = self.directory_cluster(&target.entry)?;
                self.move_entry(&source, parent, into)
            }
            Some(_) => Err(FsError::AlreadyExists),
            None => {
                let name = ShortName::new(dest)?;
                if name.is_dot() {
                    return Err(FsError::InvalidArgument);
                }
                self.write_slot_field(source.location, 0, name.as_bytes())?;
                log::debug!("Renamed {} to {name}", source.entry.name());
                Ok(())
            }
        }
    }

    fn move_entry(&mut self, source: &DirSlot, from: Cluster, into: Cluster) -> FsResult<()> {
        if into == from {
            return Err(FsError::InvalidArgument);
        }
        if source.entry.is_directory() && self.directory_cluster(&source.entry)? == into {
            return Err(FsError::InvalidArgument);
        }
        let name = source.entry.name();
        if self.find_short(into, &name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        // Copy first: an interruption leaves a duplicate, never a loss
        let location = self.claim_slot(into)?;
        self.write_slot(location, &source.entry)?;
        self.write_slot_field(source.location, 0, &[DirEntry::DELETED_ENTRY])?;

        log::debug!("Moved {name} from directory {from} to {into}");
        Ok(())
    }

    /// Deletes the file (or empty directory, when `expect_dir` is set) `name`.
    ///
    /// The record is marked deleted before its clusters are released, so an
    /// interrupted delete can leak clusters but never leave a record pointing
    /// at freed space.
    pub fn delete_entry(
        &mut self,
        parent: Cluster,
        name: &str,
        expect_dir: bool,
        open: &OpenFileTable,
    ) -> FsResult<()> {
        if ShortName::new(name)?.is_dot() {
            return Err(FsError::InvalidArgument);
        }
        let slot = self.lookup(parent, name)?;
        if slot.entry.is_directory() != expect_dir {
            return Err(FsError::TypeMismatch);
        }

        let content = slot.entry.first_cluster();
        if !content.is_free() && !self.contains(content) {
            log::warn!("{} points outside the volume ({content})", slot.entry.name());
            return Err(FsError::Io);
        }
        if expect_dir {
            if open.has_open_in(content) {
                return Err(FsError::Busy);
            }
            let occupied = self
                .entries_in_chain(content)?
                .iter()
                .any(|inner| !inner.entry.name().is_dot());
            if occupied {
                return Err(FsError::NotEmpty);
            }
        } else if open.is_open_in(parent, &slot.entry.name()) {
            return Err(FsError::Busy);
        }

        self.write_slot_field(slot.location, 0, &[DirEntry::DELETED_ENTRY])?;
        let freed = self.free_chain(content)?;
        log::debug!(
            "Deleted {} from directory {parent}, {freed} clusters released",
            slot.entry.name()
        );
        Ok(())
    }

    /// Returns a reusable record of `dir`, growing the directory by one
    /// zeroed cluster when every record is taken.
    fn claim_slot(&mut self, dir: Cluster) -> FsResult<SlotLocation> {
        if let Some(location) = self.find_free_slot(dir)? {
            return Ok(location);
        }
        let tail = self.chain_tail(dir)?;
        let cluster = self.extend_chain(tail)?;
        log::debug!("Directory {dir} grown with cluster {cluster}");
        Ok(SlotLocation { cluster, index: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat::tests::small_volume;

    #[test]
    fn test_create_file() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        let slot = fs.create_entry(root, "file1", false).unwrap();
        assert_eq!(slot.entry.name().as_bytes(), b"FILE1      ");
        assert_eq!(slot.entry.first_cluster(), Cluster::FREE);
        assert_eq!(slot.entry.file_size(), 0);
        assert!(!slot.entry.is_directory());

        // Both spellings find it, neither can be created again
        assert!(fs.find_by_name(root, "FILE1").unwrap().is_some());
        assert!(fs.find_by_name(root, "file1").unwrap().is_some());
        assert_eq!(
            fs.create_entry(root, "File1", true).err(),
            Some(FsError::AlreadyExists)
        );
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        for name in ["", ".", "..", "TWELVECHARSX", "A B"] {
            assert_eq!(
                fs.create_entry(root, name, false).err(),
                Some(FsError::InvalidArgument),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_mkdir_dot_entries() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        let sub = fs.create_entry(root, "SUB", true).unwrap();
        let sub_cluster = sub.entry.first_cluster();
        assert!(sub.entry.is_directory());

        let inner = fs.entries_in_cluster(sub_cluster).unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].entry.name(), ShortName::DOT);
        assert_eq!(inner[0].entry.first_cluster(), sub_cluster);
        assert_eq!(inner[1].entry.name(), ShortName::DOTDOT);
        // The root is referenced as cluster 0
        assert_eq!(inner[1].entry.first_cluster(), Cluster::FREE);

        let nested = fs.create_entry(sub_cluster, "NESTED", true).unwrap();
        let inner = fs.entries_in_cluster(nested.entry.first_cluster()).unwrap();
        assert_eq!(inner[1].entry.first_cluster(), sub_cluster);
    }

    #[test]
    fn test_change_dir() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        let sub = fs.create_entry(root, "SUB1", true).unwrap().entry.first_cluster();
        fs.create_entry(root, "PLAIN", false).unwrap();

        let inside = fs.change_dir(root, "sub1").unwrap();
        assert_eq!(inside, sub);
        assert_eq!(fs.change_dir(inside, ".").unwrap(), sub);
        assert_eq!(fs.change_dir(inside, "..").unwrap(), root);

        assert_eq!(fs.change_dir(root, "..").unwrap(), root);
        assert_eq!(fs.change_dir(root, ".").unwrap(), root);
        assert_eq!(fs.change_dir(root, "PLAIN"), Err(FsError::TypeMismatch));
        assert_eq!(fs.change_dir(root, "NOPE"), Err(FsError::NotFound));
    }

    #[test]
    fn test_directory_growth() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        // 16 records fill the root cluster, the 17th needs a new one
        for i in 0..17 {
            fs.create_entry(root, &alloc::format!("F{i}"), false).unwrap();
        }
        let chain = fs.chain(root).unwrap();
        assert_eq!(chain.len(), 2);

        let last = fs.lookup(root, "F16").unwrap();
        assert_eq!(last.location.cluster, chain[1]);
        assert_eq!(last.location.index, 0);
        assert_eq!(fs.entries_in_chain(root).unwrap().len(), 17);
    }

    #[test]
    fn test_deleted_slot_is_reused() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        fs.create_entry(root, "A", false).unwrap();
        let b = fs.create_entry(root, "B", false).unwrap();
        fs.create_entry(root, "C", false).unwrap();

        fs.delete_entry(root, "B", false, &table).unwrap();
        let d = fs.create_entry(root, "D", false).unwrap();
        assert_eq!(d.location, b.location);
    }

    #[test]
    fn test_rename_in_place() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        let slot = fs.create_entry(root, "OLD", true).unwrap();
        fs.rename_or_move(root, "old", "new", &table).unwrap();

        let renamed = fs.lookup(root, "NEW").unwrap();
        assert_eq!(renamed.location, slot.location);
        assert_eq!(renamed.entry.first_cluster(), slot.entry.first_cluster());
        assert_eq!(fs.lookup(root, "OLD"), Err(FsError::NotFound));

        // Only the name bytes differ
        assert_eq!(renamed.entry.as_bytes()[11..], slot.entry.as_bytes()[11..]);
    }

    #[test]
    fn test_rename_errors() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let mut table = OpenFileTable::new();

        fs.create_entry(root, "A", false).unwrap();
        fs.create_entry(root, "B", false).unwrap();

        assert_eq!(
            fs.rename_or_move(root, "NOPE", "X", &table),
            Err(FsError::NotFound)
        );
        assert_eq!(
            fs.rename_or_move(root, "A", "B", &table),
            Err(FsError::AlreadyExists)
        );
        assert_eq!(
            fs.rename_or_move(root, "A", ".", &table),
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            fs.rename_or_move(root, "A", "..", &table),
            Err(FsError::InvalidArgument)
        );

        table.open(&mut fs, root, "/", "A", "-r").unwrap();
        assert_eq!(
            fs.rename_or_move(root, "A", "C", &table),
            Err(FsError::Busy)
        );
    }

    #[test]
    fn test_move_into_directory() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        let dest = fs.create_entry(root, "DEST", true).unwrap().entry.first_cluster();
        let file = fs.create_entry(root, "FILE", false).unwrap();

        fs.rename_or_move(root, "FILE", "DEST", &table).unwrap();
        assert_eq!(fs.lookup(root, "FILE"), Err(FsError::NotFound));
        let moved = fs.lookup(dest, "FILE").unwrap();
        assert_eq!(moved.entry, file.entry);

        // The old record is only marked deleted
        let old = fs.read_slot(file.location).unwrap();
        assert!(old.is_deleted());
        assert_eq!(old.as_bytes()[1..], file.entry.as_bytes()[1..]);

        // And back up through `..`
        fs.rename_or_move(dest, "FILE", "..", &table).unwrap();
        assert!(fs.find_by_name(root, "FILE").unwrap().is_some());
        assert!(fs.find_by_name(dest, "FILE").unwrap().is_none());
    }

    #[test]
    fn test_move_conflicts() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        let outer = fs.create_entry(root, "OUTER", true).unwrap().entry.first_cluster();
        fs.create_entry(outer, "INNER", true).unwrap();
        fs.create_entry(outer, "SAME", false).unwrap();
        fs.create_entry(root, "SAME", false).unwrap();

        // Name already taken in the target
        assert_eq!(
            fs.rename_or_move(root, "SAME", "OUTER", &table),
            Err(FsError::AlreadyExists)
        );
        // Nor onto itself
        assert_eq!(
            fs.rename_or_move(outer, "INNER", "inner", &table),
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            fs.rename_or_move(root, "OUTER", "OUTER", &table),
            Err(FsError::InvalidArgument)
        );
    }

    #[test]
    fn test_delete_file_frees_chain() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        let slot = fs.create_entry(root, "BIG", false).unwrap();
        let head = fs.allocate_terminated().unwrap();
        let tail = fs.extend_chain(head).unwrap();
        let mut entry = slot.entry;
        entry.set_first_cluster(head);
        fs.write_slot(slot.location, &entry).unwrap();

        assert_eq!(
            fs.delete_entry(root, "BIG", true, &table),
            Err(FsError::TypeMismatch)
        );
        fs.delete_entry(root, "big", false, &table).unwrap();

        assert_eq!(fs.read_fat_entry(head).unwrap(), 0);
        assert_eq!(fs.read_fat_entry(tail).unwrap(), 0);
        assert!(fs.read_slot(slot.location).unwrap().is_deleted());
        assert_eq!(fs.find_free_cluster().unwrap(), Some(head));
    }

    #[test]
    fn test_rmdir() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let mut table = OpenFileTable::new();

        let sub = fs.create_entry(root, "SUB", true).unwrap();
        let sub_cluster = sub.entry.first_cluster();
        fs.create_entry(sub_cluster, "KEEP", false).unwrap();

        let free_before = fs.count_free_clusters().unwrap();
        assert_eq!(
            fs.delete_entry(root, "SUB", false, &table),
            Err(FsError::TypeMismatch)
        );

        // An open file inside takes precedence over the content check
        table.open(&mut fs, sub_cluster, "/SUB/", "KEEP", "-r").unwrap();
        assert_eq!(
            fs.delete_entry(root, "SUB", true, &table),
            Err(FsError::Busy)
        );
        table.close("KEEP").unwrap();

        assert_eq!(
            fs.delete_entry(root, "SUB", true, &table),
            Err(FsError::NotEmpty)
        );
        // Nothing was touched
        assert_eq!(fs.count_free_clusters().unwrap(), free_before);
        assert_eq!(fs.lookup(root, "SUB").unwrap(), sub);

        fs.delete_entry(sub_cluster, "KEEP", false, &table).unwrap();
        fs.delete_entry(root, "SUB", true, &table).unwrap();
        assert_eq!(fs.read_fat_entry(sub_cluster).unwrap(), 0);
        assert_eq!(fs.count_free_clusters().unwrap(), free_before + 1);
    }

    #[test]
    fn test_mkdir_without_room_to_grow() {
        let mut fs = small_volume();
        let root = fs.root_cluster();

        // Root cluster full, a single free cluster left
        for i in 0..16 {
            fs.create_entry(root, &alloc::format!("F{i}"), false).unwrap();
        }
        let last = fs.last_cluster().value();
        for c in 3..last {
            fs.write_fat_entry(Cluster::new(c), 0x0FFF_FFFF).unwrap();
        }
        let before = fs.device().as_bytes().to_vec();

        // The parent would need a cluster and so would the new directory
        assert_eq!(fs.create_entry(root, "D", true).err(), Some(FsError::NoSpace));
        assert_eq!(fs.device().as_bytes(), before.as_slice());
        assert_eq!(fs.chain(root).unwrap().len(), 1);
        assert_eq!(fs.count_free_clusters().unwrap(), 1);

        // A plain file only needs the parent to grow
        let file = fs.create_entry(root, "G", false).unwrap();
        assert_eq!(file.location.cluster, Cluster::new(last));
        assert_eq!(fs.count_free_clusters().unwrap(), 0);
    }

    #[test]
    fn test_delete_corrupt_entry() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let table = OpenFileTable::new();

        let slot = fs.create_entry(root, "BROKEN", false).unwrap();
        let mut entry = slot.entry;
        entry.set_first_cluster(Cluster::new(5000));
        fs.write_slot(slot.location, &entry).unwrap();

        // The record stays when its chain cannot be released
        assert_eq!(
            fs.delete_entry(root, "BROKEN", false, &table),
            Err(FsError::Io)
        );
        assert_eq!(fs.lookup(root, "BROKEN").unwrap().entry, entry);
    }

    #[test]
    fn test_rm_open_file() {
        let mut fs = small_volume();
        let root = fs.root_cluster();
        let mut table = OpenFileTable::new();

        fs.create_entry(root, "OPENED", false).unwrap();
        table.open(&mut fs, root, "/", "OPENED", "-w").unwrap();
        assert_eq!(
            fs.delete_entry(root, "OPENED", false, &table),
            Err(FsError::Busy)
        );
        assert_eq!(
            fs.delete_entry(root, ".", true, &table),
            Err(FsError::InvalidArgument)
        );
    }
}
