use super::Cluster;
use crate::{FsError, FsResult};

/// Size of a directory entry in bytes (always 32 bytes)
pub const DIR_ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Directory entry attributes
pub struct Attributes(u8);

impl Attributes {
    /// Read-only attribute
    pub const READ_ONLY: u8 = 0x01;
    /// Hidden attribute
    pub const HIDDEN: u8 = 0x02;
    /// System attribute
    pub const SYSTEM: u8 = 0x04;
    /// Volume ID attribute
    pub const VOLUME_ID: u8 = 0x08;
    /// Directory attribute
    pub const DIRECTORY: u8 = 0x10;
    /// Archive attribute
    pub const ARCHIVE: u8 = 0x20;
    /// Long file name attribute
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    /// Long file name mask
    pub const LONG_NAME_MASK: u8 = Self::LONG_NAME | Self::DIRECTORY | Self::ARCHIVE;

    #[must_use]
    #[inline]
    pub const fn new(attributes: u8) -> Self {
        Self(attributes)
    }

    #[must_use]
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a volume ID
    pub const fn is_volume_id(self) -> bool {
        self.0 & Self::VOLUME_ID != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a directory
    pub const fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is archived
    pub const fn is_archive(self) -> bool {
        self.0 & Self::ARCHIVE != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a long file name
    pub const fn is_long_name(self) -> bool {
        (self.0 & Self::LONG_NAME_MASK) == Self::LONG_NAME
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Fixed-width, space padded, uppercase name as stored in a directory entry.
///
/// Names are kept whole: there is no split between base name and extension,
/// so `notes.txt` is stored as `NOTES.TXT  `.
pub struct ShortName([u8; 11]);

impl ShortName {
    pub const LEN: usize = 11;
    /// Dot entry (current directory)
    pub const DOT: Self = Self(*b".          ");
    /// Dotdot entry (parent directory)
    pub const DOTDOT: Self = Self(*b"..         ");

    /// Builds the stored form of `name`.
    ///
    /// `name` must be 1 to 11 printable ASCII characters without `/`.
    pub fn new(name: &str) -> FsResult<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty()
            || bytes.len() > Self::LEN
            || !bytes.iter().all(|b| b.is_ascii_graphic() && *b != b'/')
        {
            return Err(FsError::InvalidArgument);
        }

        let mut raw = [b' '; Self::LEN];
        for (dst, src) in raw.iter_mut().zip(bytes) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(Self(raw))
    }

    #[must_use]
    #[inline]
    pub const fn from_raw(raw: [u8; 11]) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    #[must_use]
    #[inline]
    /// Returns true for the `.` and `..` records.
    pub fn is_dot(&self) -> bool {
        *self == Self::DOT || *self == Self::DOTDOT
    }

    #[must_use]
    /// Stored name without its padding.
    pub fn trimmed(&self) -> &[u8] {
        let len = self.0.iter().rposition(|b| *b != b' ').map_or(0, |i| i + 1);
        &self.0[..len]
    }

    #[must_use]
    /// Case-insensitive comparison against a name typed by the user.
    pub fn matches(&self, name: &str) -> bool {
        self.trimmed().eq_ignore_ascii_case(name.as_bytes())
    }
}

impl core::fmt::Display for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let trimmed = self.trimmed();
        let mut shown = [b'?'; 11];
        for (dst, &b) in shown.iter_mut().zip(trimmed) {
            if b.is_ascii_graphic() {
                *dst = b;
            }
        }
        f.pad(core::str::from_utf8(&shown[..trimmed.len()]).unwrap_or("?"))
    }
}

impl core::fmt::Debug for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ShortName(\"{self}\")")
    }
}

/// FAT directory entry
///
/// The record is kept as raw bytes so that fields this engine does not
/// interpret (timestamps, reserved bytes) survive a rewrite unchanged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    raw: [u8; DIR_ENTRY_SIZE],
}

impl DirEntry {
    /// Deleted entry marker (first byte)
    pub const DELETED_ENTRY: u8 = 0xE5;
    /// End of directory marker (first byte)
    pub const END_OF_ENTRIES: u8 = 0x00;

    const ATTR: usize = 11;
    const CLUSTER_HIGH: usize = 20;
    const CLUSTER_LOW: usize = 26;
    /// Offset of the file size field inside the record
    pub const FILE_SIZE: usize = 28;

    #[must_use]
    #[inline]
    pub const fn from_bytes(raw: [u8; DIR_ENTRY_SIZE]) -> Self {
        Self { raw }
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; DIR_ENTRY_SIZE] {
        &self.raw
    }

    #[must_use]
    /// Creates an empty regular file entry.
    pub fn new_file(name: ShortName) -> Self {
        let mut entry = Self {
            raw: [0; DIR_ENTRY_SIZE],
        };
        entry.set_name(name);
        entry.raw[Self::ATTR] = Attributes::ARCHIVE;
        entry
    }

    #[must_use]
    /// Creates a directory entry whose content starts at `cluster`.
    pub fn new_directory(name: ShortName, cluster: Cluster) -> Self {
        let mut entry = Self {
            raw: [0; DIR_ENTRY_SIZE],
        };
        entry.set_name(name);
        entry.raw[Self::ATTR] = Attributes::DIRECTORY;
        entry.set_first_cluster(cluster);
        entry
    }

    #[must_use]
    #[inline]
    /// Returns true if no entry was ever stored here or after this slot
    pub const fn is_end(&self) -> bool {
        self.raw[0] == Self::END_OF_ENTRIES
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is deleted
    pub const fn is_deleted(&self) -> bool {
        self.raw[0] == Self::DELETED_ENTRY
    }

    #[must_use]
    #[inline]
    /// Returns true if the slot can receive a new entry
    pub const fn is_reusable(&self) -> bool {
        self.is_end() || self.is_deleted()
    }

    #[inline]
    pub const fn mark_deleted(&mut self) {
        self.raw[0] = Self::DELETED_ENTRY;
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        Attributes::new(self.raw[Self::ATTR])
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.attributes().is_directory()
    }

    #[must_use]
    #[inline]
    pub const fn is_volume_id(&self) -> bool {
        !self.is_long_name() && self.attributes().is_volume_id()
    }

    #[must_use]
    #[inline]
    pub const fn is_long_name(&self) -> bool {
        self.attributes().is_long_name()
    }

    #[must_use]
    pub fn name(&self) -> ShortName {
        let mut raw = [0u8; ShortName::LEN];
        raw.copy_from_slice(&self.raw[..ShortName::LEN]);
        ShortName::from_raw(raw)
    }

    pub fn set_name(&mut self, name: ShortName) {
        self.raw[..ShortName::LEN].copy_from_slice(name.as_bytes());
    }

    #[must_use]
    /// Returns the first cluster number
    pub const fn first_cluster(&self) -> Cluster {
        let high = u16::from_le_bytes([
            self.raw[Self::CLUSTER_HIGH],
            self.raw[Self::CLUSTER_HIGH + 1],
        ]);
        let low = u16::from_le_bytes([
            self.raw[Self::CLUSTER_LOW],
            self.raw[Self::CLUSTER_LOW + 1],
        ]);
        Cluster::new(((high as u32) << 16) | low as u32)
    }

    /// Sets the first cluster number
    pub fn set_first_cluster(&mut self, cluster: Cluster) {
        let [b0, b1, b2, b3] = cluster.value().to_le_bytes();
        self.raw[Self::CLUSTER_LOW..Self::CLUSTER_LOW + 2].copy_from_slice(&[b0, b1]);
        self.raw[Self::CLUSTER_HIGH..Self::CLUSTER_HIGH + 2].copy_from_slice(&[b2, b3]);
    }

    #[must_use]
    #[inline]
    /// Returns the file size
    pub const fn file_size(&self) -> u32 {
        u32::from_le_bytes([
            self.raw[Self::FILE_SIZE],
            self.raw[Self::FILE_SIZE + 1],
            self.raw[Self::FILE_SIZE + 2],
            self.raw[Self::FILE_SIZE + 3],
        ])
    }

    /// Sets the file size
    pub fn set_file_size(&mut self, size: u32) {
        self.raw[Self::FILE_SIZE..Self::FILE_SIZE + 4].copy_from_slice(&size.to_le_bytes());
    }
}

impl core::fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &self.name())
            .field("attributes", &self.attributes())
            .field("first_cluster", &self.first_cluster())
            .field("file_size", &self.file_size())
            .finish()
    }
}
