//! A user-space filesystem over a fixed-size virtual block device.
//!
//! The device is partitioned into a superblock, an inode bitmap, a data
//! bitmap, a packed inode table, and a data region; every layout parameter is
//! a compile-time constant checked in `param`. On top of that sit, in order:
//!
//!   + Cache: a small write-back block cache above the device (`bio`).
//!   + Allocators: the inode and data-block bitmaps (`fs::bitmap`).
//!   + Files: inode records, the direct/indirect block map, reading, writing,
//!     truncation (`fs::inode`).
//!   + Directories: files holding fixed-width (name, inode) entries
//!     (`fs::dir`).
//!   + Names: POSIX absolute paths walked from the root directory
//!     (`fs::path`).
//!
//! [`Vdfs`] ties the layers together behind the operation surface a
//! filesystem host dispatches into (`fs::ops`). The host is assumed
//! single-threaded: every operation takes `&mut self` and runs to completion,
//! so the crate contains no locking.

pub mod bio;
pub mod device;
mod error;
pub mod fcntl;
pub mod fs;
pub mod param;
pub mod stat;

pub use device::{BlockDevice, DeviceError, MemDisk};
pub use error::{Error, Result};
pub use fcntl::OpenFlags;
pub use fs::Vdfs;
pub use stat::{FsStat, Stat};
