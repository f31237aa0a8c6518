//! FAT32 volume engine.
//!
//! Every structure lives on the backing device and is re-read whenever it is
//! needed: nothing decoded from the image is cached past the operation that
//! read it, except the boot sector geometry.
use crate::{BlockDevice, FsError, FsResult};
use alloc::vec;

pub mod bpb;
pub mod dir;
pub mod dirent;
#[expect(clippy::module_inception, reason = "FS is named after this table")]
pub mod fat;
pub mod file;
pub mod namespace;

pub use bpb::{Bpb, FormatOptions, format};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cluster(u32);

impl Cluster {
    /// Cluster number stored in the entry of an empty file.
    pub const FREE: Self = Self(0);
    /// First cluster of the data region.
    pub const FIRST_DATA: Self = Self(2);

    #[must_use]
    #[inline]
    pub const fn new(cluster: u32) -> Self {
        Self(cluster)
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 >= 2 && self.0 <= 0x0FFF_FFF6
    }

    #[must_use]
    #[inline]
    pub const fn is_end_of_chain(&self) -> bool {
        self.0 >= 0x0FFF_FFF8 && self.0 <= 0x0FFF_FFFF
    }

    #[must_use]
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 == 0x0FFF_FFF7
    }

    #[must_use]
    #[inline]
    pub const fn is_free(&self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for Cluster {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of following one link of a cluster chain.
pub enum ChainLink {
    /// The chain continues at this cluster.
    Next(Cluster),
    /// The chain ends here.
    End,
}

/// A mounted FAT32 volume.
pub struct FatFs<D: BlockDevice> {
    device: D,
    bpb: Bpb,
    total_clusters: u32,
}

impl<D: BlockDevice> FatFs<D> {
    /// Decodes the boot sector of `device` and mounts the volume.
    pub fn mount(mut device: D) -> FsResult<Self> {
        let mut sector = [0u8; Bpb::SECTOR_SIZE];
        device.read(&mut sector, 0)?;

        let bpb = Bpb::decode(&sector)?;
        if !bpb.has_signature() {
            log::warn!("Boot sector has no 0x55AA signature, mounting anyway");
        }
        bpb.validate()?;

        let total_clusters = bpb.total_clusters();
        let data_end =
            bpb.data_start() + u64::from(total_clusters) * u64::from(bpb.bytes_per_cluster());
        if data_end > device.size() {
            log::warn!(
                "Volume claims {} bytes but the device only holds {}",
                data_end,
                device.size()
            );
        }

        log::info!(
            "Mounted FAT32 volume: {} clusters of {} bytes, root at cluster {}",
            total_clusters,
            bpb.bytes_per_cluster(),
            bpb.root_cluster()
        );

        Ok(Self {
            device,
            bpb,
            total_clusters,
        })
    }

    #[must_use]
    #[inline]
    pub const fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> D {
        self.device
    }

    #[must_use]
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> Cluster {
        Cluster::new(self.bpb.root_cluster())
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_cluster(&self) -> u32 {
        self.bpb.bytes_per_cluster()
    }

    #[must_use]
    #[inline]
    /// Number of data clusters, bounded by what the FAT can describe.
    pub const fn total_clusters(&self) -> u32 {
        self.total_clusters
    }

    #[must_use]
    #[inline]
    /// Highest cluster number of the data region.
    pub const fn last_cluster(&self) -> Cluster {
        Cluster::new(self.total_clusters + 1)
    }

    #[must_use]
    #[inline]
    /// Returns true if `cluster` addresses the data region of this volume.
    pub const fn contains(&self, cluster: Cluster) -> bool {
        cluster.value() >= Cluster::FIRST_DATA.value() && cluster.value() <= self.total_clusters + 1
    }

    /// Byte offset of the first byte of `cluster`.
    pub fn cluster_to_offset(&self, cluster: Cluster) -> FsResult<u64> {
        if !self.contains(cluster) {
            return Err(FsError::InvalidArgument);
        }
        let index = u64::from(cluster.value() - Cluster::FIRST_DATA.value());
        Ok(self.bpb.data_start() + index * u64::from(self.bytes_per_cluster()))
    }

    #[must_use]
    #[inline]
    /// Byte offset of the entry of `cluster` in the first FAT.
    pub fn fat_entry_offset(&self, cluster: Cluster) -> u64 {
        self.bpb.fat_start() + u64::from(cluster.value()) * 4
    }

    #[must_use]
    #[inline]
    /// Resolves a cluster read from a `..` record, where 0 stands for the root.
    pub const fn resolve_dir_cluster(&self, cluster: Cluster) -> Cluster {
        if cluster.is_free() {
            self.root_cluster()
        } else {
            cluster
        }
    }

    pub(crate) fn read_at(&mut self, dst: &mut [u8], offset: u64) -> FsResult<()> {
        self.device.read(dst, offset)?;
        Ok(())
    }

    /// Positioned write, flushed before returning.
    pub(crate) fn write_at(&mut self, src: &[u8], offset: u64) -> FsResult<()> {
        self.device.write(src, offset)?;
        self.device.flush()?;
        Ok(())
    }

    /// Reads `dst.len()` bytes of `cluster` starting `offset` bytes into it.
    pub(crate) fn read_cluster(
        &mut self,
        cluster: Cluster,
        offset: u32,
        dst: &mut [u8],
    ) -> FsResult<()> {
        let base = self.cluster_range(cluster, offset, dst.len())?;
        self.read_at(dst, base)
    }

    /// Writes `src` into `cluster` starting `offset` bytes into it.
    pub(crate) fn write_cluster(
        &mut self,
        cluster: Cluster,
        offset: u32,
        src: &[u8],
    ) -> FsResult<()> {
        let base = self.cluster_range(cluster, offset, src.len())?;
        self.write_at(src, base)
    }

    pub(crate) fn zero_cluster(&mut self, cluster: Cluster) -> FsResult<()> {
        let zeroes = vec![0u8; self.bytes_per_cluster() as usize];
        self.write_cluster(cluster, 0, &zeroes)
    }

    fn cluster_range(&self, cluster: Cluster, offset: u32, len: usize) -> FsResult<u64> {
        let end = u64::from(offset) + len as u64;
        if end > u64::from(self.bytes_per_cluster()) {
            return Err(FsError::InvalidArgument);
        }
        Ok(self.cluster_to_offset(cluster)? + u64::from(offset))
    }
}
