//! Boot sector codec and volume formatter.
use crate::{BlockDevice, FsError, FsResult};
use alloc::vec;

/// BIOS Parameter Block (BPB) of a FAT32 volume.
///
/// Only the fields needed to locate the FATs and the data region are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bpb {
    /// Bytes per sector.
    ///
    /// This field is either 512, 1024, 2048, or 4096 on volumes
    /// written by conforming formatters.
    bytes_per_sector: u16,
    /// Sectors per cluster.
    sectors_per_cluster: u8,
    /// Reserved sectors, boot sector included.
    reserved_sectors: u16,
    /// Number of FATs.
    fat_count: u8,
    /// Total sectors in the file system.
    total_sectors: u32,
    /// Sectors per FAT.
    sectors_per_fat: u32,
    /// Cluster number of the root directory.
    root_cluster: u32,
    /// Whether the sector ends with `0x55 0xAA`.
    signature: bool,
}

impl Bpb {
    pub const SECTOR_SIZE: usize = 512;

    const BYTES_PER_SECTOR: usize = 11;
    const SECTORS_PER_CLUSTER: usize = 13;
    const RESERVED_SECTORS: usize = 14;
    const FAT_COUNT: usize = 16;
    const MEDIA: usize = 21;
    const TOTAL_SECTORS: usize = 32;
    const SECTORS_PER_FAT: usize = 36;
    const ROOT_CLUSTER: usize = 44;
    const FS_INFO_SECTOR: usize = 48;
    const BACKUP_BOOT_SECTOR: usize = 50;
    const DRIVE_NUMBER: usize = 64;
    const BOOT_SIGNATURE: usize = 66;
    const VOLUME_ID: usize = 67;
    const VOLUME_LABEL: usize = 71;
    const FS_TYPE: usize = 82;
    const SIGNATURE: usize = 510;

    /// Sector holding the copy of the boot sector written by [`format`].
    pub const BACKUP_SECTOR: u16 = 6;

    #[must_use]
    pub const fn new(
        bytes_per_sector: u16,
        sectors_per_cluster: u8,
        reserved_sectors: u16,
        fat_count: u8,
        total_sectors: u32,
        sectors_per_fat: u32,
        root_cluster: u32,
    ) -> Self {
        Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            total_sectors,
            sectors_per_fat,
            root_cluster,
            signature: true,
        }
    }

    /// Decodes the geometry fields of a boot sector.
    ///
    /// Only the length of `sector` is checked here, see [`Bpb::validate`].
    pub fn decode(sector: &[u8]) -> FsResult<Self> {
        let sector: &[u8; Self::SECTOR_SIZE] = sector
            .get(..Self::SECTOR_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(FsError::InvalidBootSector)?;

        Ok(Self {
            bytes_per_sector: read_u16(sector, Self::BYTES_PER_SECTOR),
            sectors_per_cluster: sector[Self::SECTORS_PER_CLUSTER],
            reserved_sectors: read_u16(sector, Self::RESERVED_SECTORS),
            fat_count: sector[Self::FAT_COUNT],
            total_sectors: read_u32(sector, Self::TOTAL_SECTORS),
            sectors_per_fat: read_u32(sector, Self::SECTORS_PER_FAT),
            root_cluster: read_u32(sector, Self::ROOT_CLUSTER),
            signature: sector[Self::SIGNATURE] == 0x55 && sector[Self::SIGNATURE + 1] == 0xAA,
        })
    }

    /// Checks that the geometry describes a usable volume.
    pub fn validate(&self) -> FsResult<()> {
        if self.bytes_per_sector == 0
            || self.sectors_per_cluster == 0
            || self.fat_count == 0
            || self.sectors_per_fat == 0
            || self.root_cluster < 2
        {
            return Err(FsError::InvalidBootSector);
        }
        if self.total_clusters() == 0 || self.root_cluster > self.total_clusters() + 1 {
            return Err(FsError::InvalidBootSector);
        }
        Ok(())
    }

    #[must_use]
    /// Encodes a complete boot sector for this geometry.
    pub fn encode(&self, volume_id: u32) -> [u8; Self::SECTOR_SIZE] {
        let mut sector = [0u8; Self::SECTOR_SIZE];

        sector[..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        sector[3..11].copy_from_slice(b"FATVOL  ");
        write_u16(&mut sector, Self::BYTES_PER_SECTOR, self.bytes_per_sector);
        sector[Self::SECTORS_PER_CLUSTER] = self.sectors_per_cluster;
        write_u16(&mut sector, Self::RESERVED_SECTORS, self.reserved_sectors);
        sector[Self::FAT_COUNT] = self.fat_count;
        sector[Self::MEDIA] = 0xF8;
        write_u32(&mut sector, Self::TOTAL_SECTORS, self.total_sectors);
        write_u32(&mut sector, Self::SECTORS_PER_FAT, self.sectors_per_fat);
        write_u32(&mut sector, Self::ROOT_CLUSTER, self.root_cluster);
        write_u16(&mut sector, Self::FS_INFO_SECTOR, 1);
        write_u16(&mut sector, Self::BACKUP_BOOT_SECTOR, Self::BACKUP_SECTOR);
        sector[Self::DRIVE_NUMBER] = 0x80;
        sector[Self::BOOT_SIGNATURE] = 0x29;
        write_u32(&mut sector, Self::VOLUME_ID, volume_id);
        sector[Self::VOLUME_LABEL..Self::VOLUME_LABEL + 11].copy_from_slice(b"NO NAME    ");
        sector[Self::FS_TYPE..Self::FS_TYPE + 8].copy_from_slice(b"FAT32   ");
        sector[Self::SIGNATURE] = 0x55;
        sector[Self::SIGNATURE + 1] = 0xAA;

        sector
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    pub const fn reserved_sectors(&self) -> u16 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    pub const fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn has_signature(&self) -> bool {
        self.signature
    }

    #[must_use]
    #[inline]
    /// Returns the number of bytes per cluster.
    pub const fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    #[must_use]
    #[inline]
    /// Size in bytes of one FAT copy.
    pub const fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    #[must_use]
    #[inline]
    /// Byte offset of the first FAT.
    pub const fn fat_start(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    #[must_use]
    #[inline]
    /// Byte offset of the data region (cluster 2).
    pub const fn data_start(&self) -> u64 {
        self.fat_start() + self.fat_count as u64 * self.fat_size_bytes()
    }

    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "bounded by `max_valid`")]
    /// Number of data clusters.
    ///
    /// This is the number of whole clusters after the FATs, capped by the
    /// number of entries one FAT can hold (the first two are reserved).
    pub const fn total_clusters(&self) -> u32 {
        if self.sectors_per_cluster == 0 {
            return 0;
        }
        let meta =
            self.reserved_sectors as u64 + self.fat_count as u64 * self.sectors_per_fat as u64;
        let data_sectors = (self.total_sectors as u64).saturating_sub(meta);
        let by_data = data_sectors / self.sectors_per_cluster as u64;
        let by_fat = (self.fat_size_bytes() / 4).saturating_sub(2);
        let max_valid = 0x0FFF_FFF6 - 1;

        let count = if by_data < by_fat { by_data } else { by_fat };
        let count = if count > max_valid { max_valid } else { count };
        count as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Geometry choices for [`format`].
///
/// The total sector count and FAT size are derived from the device size.
pub struct FormatOptions {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub volume_id: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            volume_id: 0x1234_5678,
        }
    }
}

impl FormatOptions {
    fn validate(&self) -> FsResult<()> {
        if !matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096)
            || !self.sectors_per_cluster.is_power_of_two()
            || self.reserved_sectors <= Bpb::BACKUP_SECTOR
            || self.fat_count == 0
        {
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }
}

/// Writes an empty FAT32 volume spanning the whole device.
///
/// The root directory is a single zeroed cluster right after the FATs.
pub fn format<D: BlockDevice>(device: &mut D, options: &FormatOptions) -> FsResult<Bpb> {
    options.validate()?;

    let bps = u64::from(options.bytes_per_sector);
    let spc = u64::from(options.sectors_per_cluster);
    let total_sectors = u32::try_from(device.size() / bps).unwrap_or(u32::MAX);

    let after_reserved = u64::from(total_sectors)
        .checked_sub(u64::from(options.reserved_sectors))
        .ok_or(FsError::InvalidArgument)?;
    // Upper bound: enough entries as if the FATs took no room.
    let entries = after_reserved / spc + 2;
    let sectors_per_fat =
        u32::try_from((entries * 4).div_ceil(bps)).map_err(|_| FsError::InvalidArgument)?;

    let bpb = Bpb::new(
        options.bytes_per_sector,
        options.sectors_per_cluster,
        options.reserved_sectors,
        options.fat_count,
        total_sectors,
        sectors_per_fat,
        2,
    );
    if bpb.total_clusters() == 0 {
        return Err(FsError::InvalidArgument);
    }

    // Reserved area and FATs start out zeroed
    let zeroes = vec![0u8; usize::from(options.bytes_per_sector)];
    let metadata_sectors = u64::from(options.reserved_sectors)
        + u64::from(options.fat_count) * u64::from(sectors_per_fat);
    for sector in 0..metadata_sectors {
        device.write(&zeroes, sector * bps)?;
    }

    let boot = bpb.encode(options.volume_id);
    device.write(&boot, 0)?;
    device.write(&boot, u64::from(Bpb::BACKUP_SECTOR) * bps)?;

    let mut head = [0u8; 12];
    head[..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    head[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    head[8..].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    for fat in 0..u64::from(options.fat_count) {
        device.write(&head, bpb.fat_start() + fat * bpb.fat_size_bytes())?;
    }

    let root = vec![0u8; bpb.bytes_per_cluster() as usize];
    device.write(&root, bpb.data_start())?;
    device.flush()?;

    log::debug!(
        "Formatted {} sectors: {} FAT sectors, {} clusters",
        total_sectors,
        sectors_per_fat,
        bpb.total_clusters()
    );

    Ok(bpb)
}

#[inline]
fn read_u16(sector: &[u8; Bpb::SECTOR_SIZE], at: usize) -> u16 {
    u16::from_le_bytes([sector[at], sector[at + 1]])
}

#[inline]
fn read_u32(sector: &[u8; Bpb::SECTOR_SIZE], at: usize) -> u32 {
    u32::from_le_bytes([sector[at], sector[at + 1], sector[at + 2], sector[at + 3]])
}

#[inline]
fn write_u16(sector: &mut [u8; Bpb::SECTOR_SIZE], at: usize, value: u16) {
    sector[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u32(sector: &mut [u8; Bpb::SECTOR_SIZE], at: usize, value: u32) {
    sector[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
