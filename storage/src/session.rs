//! A mounted volume together with the state of one user working on it.
use crate::{
    BlockDevice, FsResult,
    fs::{
        PathBuf,
        fat::{Bpb, Cluster, FatFs, dir::DirSlot},
    },
    oft::{OpenFile, OpenFileTable},
};
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Volume geometry plus allocation figures.
pub struct VolumeInfo {
    pub bpb: Bpb,
    pub total_clusters: u32,
    pub free_clusters: u32,
}

/// Session over a mounted volume.
///
/// Owns the current directory (as a cluster), its display path and the
/// open file table; every operation works relative to them.
pub struct Session<D: BlockDevice> {
    fs: FatFs<D>,
    cwd: Cluster,
    path: PathBuf,
    table: OpenFileTable,
}

impl<D: BlockDevice> Session<D> {
    /// Mounts `device` and starts at the root directory.
    pub fn mount(device: D) -> FsResult<Self> {
        let fs = FatFs::mount(device)?;
        let cwd = fs.root_cluster();
        Ok(Self {
            fs,
            cwd,
            path: PathBuf::root(),
            table: OpenFileTable::new(),
        })
    }

    #[must_use]
    #[inline]
    pub const fn fs(&self) -> &FatFs<D> {
        &self.fs
    }

    #[inline]
    pub const fn fs_mut(&mut self) -> &mut FatFs<D> {
        &mut self.fs
    }

    #[must_use]
    #[inline]
    pub const fn cwd(&self) -> Cluster {
        self.cwd
    }

    #[must_use]
    #[inline]
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    #[must_use]
    #[inline]
    pub const fn open_files(&self) -> &OpenFileTable {
        &self.table
    }

    #[must_use]
    pub fn into_inner(self) -> D {
        self.fs.into_inner()
    }

    pub fn info(&mut self) -> FsResult<VolumeInfo> {
        Ok(VolumeInfo {
            bpb: *self.fs.bpb(),
            total_clusters: self.fs.total_clusters(),
            free_clusters: self.fs.count_free_clusters()?,
        })
    }

    /// Lists the current directory.
    pub fn ls(&mut self) -> FsResult<Vec<DirSlot>> {
        let entries = self.fs.entries_in_chain(self.cwd)?;
        Ok(entries
            .into_iter()
            .filter(|slot| !slot.entry.is_volume_id())
            .collect())
    }

    /// Enters the directory `name`, updating the display path on success.
    pub fn cd(&mut self, name: &str) -> FsResult<()> {
        let target = self.fs.change_dir(self.cwd, name)?;
        self.cwd = target;
        if target == self.fs.root_cluster() {
            self.path = PathBuf::root();
        } else {
            match name {
                "." | ".." => self.path.push(name),
                _ => self.path.push(&name.to_ascii_uppercase()),
            }
        }
        Ok(())
    }

    pub fn mkdir(&mut self, name: &str) -> FsResult<()> {
        self.fs.create_entry(self.cwd, name, true).map(|_| ())
    }

    pub fn creat(&mut self, name: &str) -> FsResult<()> {
        self.fs.create_entry(self.cwd, name, false).map(|_| ())
    }

    /// Opens `name` with one of the `-r`, `-w`, `-rw`, `-wr` flags.
    pub fn open(&mut self, name: &str, flag: &str) -> FsResult<usize> {
        self.table
            .open(&mut self.fs, self.cwd, self.path.as_str(), name, flag)
    }

    pub fn close(&mut self, name: &str) -> FsResult<()> {
        self.table.close(name)
    }

    /// Open files with their slot index, in slot order.
    pub fn lsof(&self) -> impl Iterator<Item = (usize, &OpenFile)> {
        self.table.iter()
    }

    pub fn lseek(&mut self, name: &str, offset: i64) -> FsResult<u64> {
        self.table.seek(name, offset)
    }

    pub fn read(&mut self, name: &str, len: usize) -> FsResult<Vec<u8>> {
        self.table.read(&mut self.fs, name, len)
    }

    pub fn write(&mut self, name: &str, data: &[u8]) -> FsResult<usize> {
        self.table.write(&mut self.fs, name, data)
    }

    pub fn mv(&mut self, src: &str, dest: &str) -> FsResult<()> {
        self.fs.rename_or_move(self.cwd, src, dest, &self.table)
    }

    pub fn rm(&mut self, name: &str) -> FsResult<()> {
        self.fs.delete_entry(self.cwd, name, false, &self.table)
    }

    pub fn rmdir(&mut self, name: &str) -> FsResult<()> {
        self.fs.delete_entry(self.cwd, name, true, &self.table)
    }
}
