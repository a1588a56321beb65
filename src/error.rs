//! Operation failures, and their mapping onto the host's errno convention.

use thiserror::Error;

use crate::device::DeviceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("no space left on device")]
    NoSpace,
    #[error("file exists")]
    Exists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("not a directory")]
    NotDirectory,
    #[error("is a directory")]
    IsDirectory,
    #[error("filesystem image is corrupted")]
    Corrupted,
    #[error(transparent)]
    Io(#[from] DeviceError),
}

impl Error {
    /// The negative errno a filesystem host reports for this failure.
    pub fn errno(&self) -> i32 {
        -match self {
            Error::NotFound => libc::ENOENT,
            Error::NoSpace => libc::ENOSPC,
            Error::Exists => libc::EEXIST,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::NotDirectory => libc::ENOTDIR,
            Error::IsDirectory => libc::EISDIR,
            Error::Corrupted | Error::Io(_) => libc::EIO,
        }
    }
}
