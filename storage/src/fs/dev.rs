//! Devices backing a volume: a disk image file and an in-memory buffer.
use crate::{BlockDevice, DeviceError};
use alloc::{vec, vec::Vec};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// A volume image held in memory.
pub struct MemDevice {
    data: Vec<u8>,
}

impl MemDevice {
    #[must_use]
    #[inline]
    /// Creates a zero-filled device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    #[must_use]
    #[inline]
    /// Wraps an existing image.
    pub const fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, offset: u64, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
        let start = usize::try_from(offset).map_err(|_| DeviceError::OutOfBounds)?;
        let end = start.checked_add(len).ok_or(DeviceError::OutOfBounds)?;
        if end > self.data.len() {
            return Err(DeviceError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockDevice for MemDevice {
    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<(), DeviceError> {
        let range = self.range(offset, dst.len())?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<(), DeviceError> {
        let range = self.range(offset, src.len())?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    #[inline]
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(feature = "std")]
pub use image::ImageFile;

#[cfg(feature = "std")]
mod image {
    use crate::{BlockDevice, DeviceError};
    use std::{
        fs::{File, OpenOptions},
        io::{self, Read, Seek, SeekFrom, Write},
        path::Path,
    };

    #[derive(Debug)]
    /// A disk image file opened for reading and writing.
    ///
    /// The image is the only persistent store: every write goes straight to the
    /// file and is flushed before the next operation starts.
    pub struct ImageFile {
        file: File,
        size: u64,
    }

    impl ImageFile {
        /// Opens an existing image.
        pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            let size = file.metadata()?.len();
            Ok(Self { file, size })
        }

        /// Creates (or truncates) an image of exactly `size` zero bytes.
        pub fn create(path: impl AsRef<Path>, size: u64) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.set_len(size)?;
            Ok(Self { file, size })
        }

        /// Forces written data down to the storage medium.
        pub fn sync(&mut self) -> io::Result<()> {
            self.file.sync_all()
        }

        const fn check(&self, offset: u64, len: usize) -> Result<(), DeviceError> {
            match offset.checked_add(len as u64) {
                Some(end) if end <= self.size => Ok(()),
                _ => Err(DeviceError::OutOfBounds),
            }
        }
    }

    fn map_io(error: &io::Error) -> DeviceError {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => DeviceError::OutOfBounds,
            io::ErrorKind::Unsupported => DeviceError::Unsupported,
            _ => DeviceError::Io,
        }
    }

    impl BlockDevice for ImageFile {
        fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<(), DeviceError> {
            self.check(offset, dst.len())?;
            self.file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| map_io(&e))?;
            self.file.read_exact(dst).map_err(|e| map_io(&e))
        }

        fn write(&mut self, src: &[u8], offset: u64) -> Result<(), DeviceError> {
            self.check(offset, src.len())?;
            self.file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| map_io(&e))?;
            self.file.write_all(src).map_err(|e| map_io(&e))
        }

        fn flush(&mut self) -> Result<(), DeviceError> {
            self.file.flush().map_err(|e| map_io(&e))
        }

        #[inline]
        fn size(&self) -> u64 {
            self.size
        }
    }
}
