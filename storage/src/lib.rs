#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

extern crate alloc;
use thiserror::Error;

pub mod fs;
pub mod oft;
pub mod session;

pub use fs::{FsError, FsResult};
pub use session::{Session, VolumeInfo};

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// An error that can occur when accessing the backing device.
pub enum DeviceError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Unsupported operation")]
    Unsupported,
}

/// A trait for the device holding a volume image.
///
/// Every on-disk structure is reached through positioned reads and writes,
/// so devices are byte addressed (they behave like block devices with a
/// block size of 1 byte).
pub trait BlockDevice {
    /// Read `dst.len()` bytes starting at byte `offset`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed
    /// or if the range ends past the end of the device.
    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<(), DeviceError>;
    /// Write `src` starting at byte `offset`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed
    /// or if the range ends past the end of the device.
    fn write(&mut self, src: &[u8], offset: u64) -> Result<(), DeviceError>;
    /// Push previously written bytes out of any intermediate buffer.
    fn flush(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    /// Size of the device in bytes.
    fn size(&self) -> u64;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    #[inline]
    fn read(&mut self, dst: &mut [u8], offset: u64) -> Result<(), DeviceError> {
        (**self).read(dst, offset)
    }

    #[inline]
    fn write(&mut self, src: &[u8], offset: u64) -> Result<(), DeviceError> {
        (**self).write(src, offset)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), DeviceError> {
        (**self).flush()
    }

    #[inline]
    fn size(&self) -> u64 {
        (**self).size()
    }
}
