//! File Allocation Table access and cluster allocation.
use super::{ChainLink, Cluster, FatFs};
use crate::{BlockDevice, FsError, FsResult};
use alloc::{vec, vec::Vec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 table entry
pub enum FatEntry {
    /// Free cluster
    Free,
    /// Used cluster, pointing to the next cluster in the chain
    Next(Cluster),
    /// Last cluster in the chain
    EndOfChain,
    /// Bad cluster
    Bad,
    /// Reserved cluster
    Reserved,
}

impl FatEntry {
    /// Only the lower 28 bits of an entry are meaningful.
    pub const MASK: u32 = 0x0FFF_FFFF;
    /// Any value from this one up marks the end of a chain.
    pub const EOC_THRESHOLD: u32 = 0x0FFF_FFF8;
    /// End of chain marker written by this engine.
    pub const EOC: u32 = 0x0FFF_FFFF;
    pub const BAD: u32 = 0x0FFF_FFF7;

    #[must_use]
    /// Decodes the low 28 bits of a raw entry.
    pub const fn from_raw(raw: u32) -> Self {
        match raw & Self::MASK {
            0 => Self::Free,
            Self::BAD => Self::Bad,
            0x0FFF_FFF0..=0x0FFF_FFF6 | 1 => Self::Reserved,
            Self::EOC_THRESHOLD..=Self::MASK => Self::EndOfChain,
            val => Self::Next(Cluster::new(val)),
        }
    }

    #[must_use]
    /// Value stored in the low 28 bits for this entry.
    pub const fn raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Next(next) => next.value() & Self::MASK,
            Self::EndOfChain => Self::EOC,
            Self::Bad => Self::BAD,
            Self::Reserved => 0x0FFF_FFF6,
        }
    }
}

/// Replaces the low 28 bits of `old` with `value`, keeping the reserved top nibble.
#[must_use]
#[inline]
pub const fn merge_entry(old: u32, value: u32) -> u32 {
    (old & !FatEntry::MASK) | (value & FatEntry::MASK)
}

impl<D: BlockDevice> FatFs<D> {
    /// Reads the low 28 bits of the entry of `cluster` in the first FAT.
    pub fn read_fat_entry(&mut self, cluster: Cluster) -> FsResult<u32> {
        let mut raw = [0u8; 4];
        let offset = self.fat_entry_offset(cluster);
        self.read_at(&mut raw, offset)?;
        Ok(u32::from_le_bytes(raw) & FatEntry::MASK)
    }

    /// Writes `value` into the entry of `cluster` in every FAT copy.
    ///
    /// Each copy keeps its own top 4 bits.
    pub fn write_fat_entry(&mut self, cluster: Cluster, value: u32) -> FsResult<()> {
        let first = self.fat_entry_offset(cluster);
        let stride = self.bpb().fat_size_bytes();

        for copy in 0..u64::from(self.bpb().fat_count()) {
            let offset = first + copy * stride;
            let mut raw = [0u8; 4];
            self.read_at(&mut raw, offset)?;
            let merged = merge_entry(u32::from_le_bytes(raw), value);
            self.write_at(&merged.to_le_bytes(), offset)?;
        }
        Ok(())
    }

    #[inline]
    pub fn fat_entry(&mut self, cluster: Cluster) -> FsResult<FatEntry> {
        self.read_fat_entry(cluster).map(FatEntry::from_raw)
    }

    #[inline]
    pub fn set_fat_entry(&mut self, cluster: Cluster, entry: FatEntry) -> FsResult<()> {
        self.write_fat_entry(cluster, entry.raw())
    }

    /// Follows one link of the chain through `cluster`.
    ///
    /// Anything but a link to another cluster of this volume ends the chain.
    pub fn next_in_chain(&mut self, cluster: Cluster) -> FsResult<ChainLink> {
        match self.fat_entry(cluster)? {
            FatEntry::Next(next) if self.contains(next) => Ok(ChainLink::Next(next)),
            FatEntry::EndOfChain => Ok(ChainLink::End),
            other => {
                log::warn!("Chain broken at cluster {cluster}: {other:?}");
                Ok(ChainLink::End)
            }
        }
    }

    /// Collects every cluster of the chain starting at `start`.
    ///
    /// A `start` of 0 is the empty chain of a file without data.
    pub fn chain(&mut self, start: Cluster) -> FsResult<Vec<Cluster>> {
        let mut clusters = Vec::new();
        if start.is_free() {
            return Ok(clusters);
        }
        if !self.contains(start) {
            log::warn!("Chain starts outside the volume at cluster {start}");
            return Err(FsError::Io);
        }

        let mut current = start;
        loop {
            clusters.push(current);
            if clusters.len() > self.total_clusters() as usize {
                log::warn!("Chain starting at cluster {start} loops");
                return Err(FsError::Io);
            }
            match self.next_in_chain(current)? {
                ChainLink::Next(next) => current = next,
                ChainLink::End => return Ok(clusters),
            }
        }
    }

    /// Returns the last cluster of the chain starting at `start`.
    pub fn chain_tail(&mut self, start: Cluster) -> FsResult<Cluster> {
        self.chain(start)?
            .last()
            .copied()
            .ok_or(FsError::InvalidArgument)
    }

    /// Returns the lowest free data cluster, if any.
    pub fn find_free_cluster(&mut self) -> FsResult<Option<Cluster>> {
        let mut found = None;
        self.for_each_fat_entry(|cluster, entry| {
            if entry == 0 {
                found = Some(cluster);
                false
            } else {
                true
            }
        })?;
        Ok(found)
    }

    /// Counts the free data clusters.
    pub fn count_free_clusters(&mut self) -> FsResult<u32> {
        let mut free = 0;
        self.for_each_fat_entry(|_, entry| {
            if entry == 0 {
                free += 1;
            }
            true
        })?;
        Ok(free)
    }

    /// Allocates one cluster as a chain of its own and zero-fills it.
    ///
    /// The terminator is written before anything can reference the cluster.
    pub fn allocate_terminated(&mut self) -> FsResult<Cluster> {
        let cluster = self.find_free_cluster()?.ok_or(FsError::NoSpace)?;
        self.set_fat_entry(cluster, FatEntry::EndOfChain)?;
        self.zero_cluster(cluster)?;
        log::debug!("Allocated cluster {cluster}");
        Ok(cluster)
    }

    /// Appends a fresh, zeroed cluster after `tail` and returns it.
    pub fn extend_chain(&mut self, tail: Cluster) -> FsResult<Cluster> {
        if !self.contains(tail) {
            return Err(FsError::InvalidArgument);
        }
        let cluster = self.allocate_terminated()?;
        self.set_fat_entry(tail, FatEntry::Next(cluster))?;
        Ok(cluster)
    }

    /// Frees every cluster of the chain starting at `start`.
    ///
    /// Returns the number of clusters released. A `start` of 0 frees nothing.
    pub fn free_chain(&mut self, start: Cluster) -> FsResult<u32> {
        if start.is_free() {
            return Ok(0);
        }
        if !self.contains(start) {
            return Err(FsError::InvalidArgument);
        }

        let mut freed = 0;
        let mut current = start;
        loop {
            // The successor has to be read before the link is erased
            let next = self.next_in_chain(current)?;
            self.set_fat_entry(current, FatEntry::Free)?;
            freed += 1;

            match next {
                ChainLink::Next(cluster) if freed <= self.total_clusters() => current = cluster,
                ChainLink::Next(_) => {
                    log::warn!("Chain starting at cluster {start} loops");
                    return Err(FsError::Io);
                }
                ChainLink::End => break,
            }
        }

        log::debug!("Freed {freed} clusters starting at {start}");
        Ok(freed)
    }

    /// Calls `f` with every data cluster and its masked entry, in order,
    /// until it returns false. The FAT is read one sector at a time.
    fn for_each_fat_entry(&mut self, mut f: impl FnMut(Cluster, u32) -> bool) -> FsResult<()> {
        let sector_size = usize::from(self.bpb().bytes_per_sector()).max(4);
        let entries_per_sector = (sector_size / 4) as u32;
        let first = Cluster::FIRST_DATA.value();
        let last = self.last_cluster().value();
        let mut buf = vec![0u8; sector_size];

        let mut sector_first = first - first % entries_per_sector;
        while sector_first <= last {
            let offset = self.fat_entry_offset(Cluster::new(sector_first));
            self.read_at(&mut buf, offset)?;

            for (i, raw) in buf.chunks_exact(4).enumerate() {
                let cluster = sector_first + i as u32;
                if cluster < first {
                    continue;
                }
                if cluster > last {
                    return Ok(());
                }
                let entry = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) & FatEntry::MASK;
                if !f(Cluster::new(cluster), entry) {
                    return Ok(());
                }
            }
            sector_first += entries_per_sector;
        }
        Ok(())
    }
}
