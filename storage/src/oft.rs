//! Open file table.
//!
//! A fixed number of slots, each either closed or holding one open file.
//! Files are identified by name: the same name can only be open once.
use crate::{
    BlockDevice, FsError, FsResult,
    fs::fat::{Cluster, FatFs, dirent::DirEntry, dirent::ShortName},
};
use alloc::{string::String, vec::Vec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How an open file may be accessed. Fixed for the lifetime of the handle.
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Parses a shell flag: `-r`, `-w`, `-rw` or `-wr`.
    pub fn from_flag(flag: &str) -> FsResult<Self> {
        match flag {
            "-r" => Ok(Self::Read),
            "-w" => Ok(Self::Write),
            "-rw" | "-wr" => Ok(Self::ReadWrite),
            _ => Err(FsError::InvalidArgument),
        }
    }

    #[must_use]
    #[inline]
    pub const fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[must_use]
    #[inline]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl core::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(match self {
            Self::Read => "-r",
            Self::Write => "-w",
            Self::ReadWrite => "-rw",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An open file: the directory entry it was opened from and a cursor.
pub struct OpenFile {
    name: ShortName,
    dir: Cluster,
    path: String,
    mode: AccessMode,
    offset: u64,
    size: u32,
}

impl OpenFile {
    #[must_use]
    /// Opens `entry`, found in directory `dir` displayed as `path`.
    pub fn new(entry: &DirEntry, dir: Cluster, path: &str, mode: AccessMode) -> Self {
        Self {
            name: entry.name(),
            dir,
            path: String::from(path),
            mode,
            offset: 0,
            size: entry.file_size(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn name(&self) -> &ShortName {
        &self.name
    }

    #[must_use]
    #[inline]
    /// Cluster of the directory holding the entry.
    pub const fn dir(&self) -> Cluster {
        self.dir
    }

    #[must_use]
    #[inline]
    /// Directory path at the time the file was opened.
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    #[inline]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    #[must_use]
    #[inline]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    #[inline]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Moves the cursor to `offset`.
    ///
    /// An offset past the end is an error, but the cursor is still moved to
    /// the end of the file.
    pub fn seek(&mut self, offset: u64) -> FsResult<u64> {
        let size = u64::from(self.size);
        if offset > size {
            self.offset = size;
            return Err(FsError::InvalidArgument);
        }
        self.offset = offset;
        Ok(offset)
    }

    pub(crate) const fn advance(&mut self, count: u64) {
        self.offset += count;
    }

    pub(crate) const fn set_size(&mut self, size: u32) {
        self.size = size;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileTable {
    slots: [Option<OpenFile>; Self::CAPACITY],
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFileTable {
    /// Maximum number of files open at the same time.
    pub const CAPACITY: usize = 10;

    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; Self::CAPACITY],
        }
    }

    /// Opens the file `name` of directory `dir` and returns its slot index.
    ///
    /// The lowest closed slot is used.
    pub fn open<D: BlockDevice>(
        &mut self,
        fs: &mut FatFs<D>,
        dir: Cluster,
        path: &str,
        name: &str,
        flag: &str,
    ) -> FsResult<usize> {
        let mode = AccessMode::from_flag(flag)?;
        if self.is_open(name) {
            return Err(FsError::AlreadyOpen);
        }
        let slot = fs.lookup(dir, name)?;
        if slot.entry.is_directory() {
            return Err(FsError::TypeMismatch);
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TableFull)?;

        self.slots[index] = Some(OpenFile::new(&slot.entry, dir, path, mode));
        log::debug!("Opened {} {mode} in slot {index}", slot.entry.name());
        Ok(index)
    }

    pub fn close(&mut self, name: &str) -> FsResult<()> {
        let index = self.index_of(name).ok_or(FsError::NotOpen)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Moves the cursor of `name`, see [`OpenFile::seek`].
    pub fn seek(&mut self, name: &str, offset: i64) -> FsResult<u64> {
        let file = self.get_mut(name).ok_or(FsError::NotOpen)?;
        let offset = u64::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        file.seek(offset)
    }

    /// Reads up to `len` bytes from the open file `name`.
    pub fn read<D: BlockDevice>(
        &mut self,
        fs: &mut FatFs<D>,
        name: &str,
        len: usize,
    ) -> FsResult<Vec<u8>> {
        let file = self.get_mut(name).ok_or(FsError::NotOpen)?;
        fs.read_file(file, len)
    }

    /// Writes `data` to the open file `name`.
    pub fn write<D: BlockDevice>(
        &mut self,
        fs: &mut FatFs<D>,
        name: &str,
        data: &[u8],
    ) -> FsResult<usize> {
        let file = self.get_mut(name).ok_or(FsError::NotOpen)?;
        fs.write_file(file, data)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|file| file.name.matches(name)))
    }

    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OpenFile> {
        self.index_of(name).and_then(|i| self.slots[i].as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut OpenFile> {
        self.index_of(name).and_then(|i| self.slots[i].as_mut())
    }

    #[must_use]
    /// Returns true if the entry `name` of directory `dir` is open.
    pub fn is_open_in(&self, dir: Cluster, name: &ShortName) -> bool {
        self.iter().any(|(_, file)| file.dir == dir && file.name == *name)
    }

    #[must_use]
    /// Returns true if any file of directory `dir` is open.
    pub fn has_open_in(&self, dir: Cluster) -> bool {
        self.iter().any(|(_, file)| file.dir == dir)
    }

    /// Open files with their slot index, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &OpenFile)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|file| (i, file)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
