use alloc::string::String;
use thiserror::Error;

pub mod dev;
pub mod fat;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
/// Error kinds reported by volume operations.
///
/// Every operation either succeeds or fails with exactly one of these kinds.
/// Nothing is retried and the volume is left as it was before the failing step.
pub enum FsError {
    #[error("No such file or directory")]
    NotFound,
    #[error("File already exists")]
    AlreadyExists,
    #[error("Wrong entry type (file vs directory)")]
    TypeMismatch,
    #[error("Directory not empty")]
    NotEmpty,
    #[error("Entry is referenced by an open file")]
    Busy,
    #[error("No space left on volume")]
    NoSpace,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("File is already open")]
    AlreadyOpen,
    #[error("File is not open")]
    NotOpen,
    #[error("Open file table is full")]
    TableFull,
    #[error("End of file")]
    AtEof,
    #[error("Offset lies beyond allocated data")]
    OffsetBeyondData,
    #[error("File not opened for this access mode")]
    BadMode,
    #[error("Invalid boot sector")]
    InvalidBootSector,
    #[error("I/O error")]
    Io,
}

impl From<super::DeviceError> for FsError {
    fn from(error: super::DeviceError) -> Self {
        match error {
            super::DeviceError::Io
            | super::DeviceError::OutOfBounds
            | super::DeviceError::Unsupported => Self::Io,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// Human readable path of a directory, always slash terminated (`/`, `/SUB/`).
///
/// This is purely cosmetic: directories are addressed by cluster number.
pub struct PathBuf(String);

impl Default for PathBuf {
    fn default() -> Self {
        Self::root()
    }
}

impl PathBuf {
    #[must_use]
    #[inline]
    /// Creates the path of the volume root.
    pub fn root() -> Self {
        Self(String::from("/"))
    }

    /// Updates the path after entering the directory `name`.
    ///
    /// `.` leaves the path unchanged and `..` drops the last component.
    pub fn push(&mut self, name: &str) {
        match name {
            "." => {}
            ".." => self.pop(),
            name => {
                if !self.0.ends_with('/') {
                    self.0.push('/');
                }
                self.0.push_str(name);
                self.0.push('/');
            }
        }
    }

    /// Drops the last component. The root stays the root.
    pub fn pop(&mut self) {
        let trimmed = self.0.trim_end_matches('/');
        let keep = trimmed.rfind('/').map_or(1, |idx| idx + 1);
        self.0.truncate(keep);
    }

    #[must_use]
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PathBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
