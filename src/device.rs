//! The block-device contract the filesystem is built on.
//!
//! A device is a fixed array of `BLOCK_NUM` blocks of `BLOCK_SIZE` bytes.
//! How the blocks persist is the device's business; the filesystem only ever
//! reads and writes whole blocks through the cache.

use std::collections::HashMap;

use thiserror::Error;

use crate::param::{BLOCK_NUM, BLOCK_SIZE};

/// One block's worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// An I/O failure reported by a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block device i/o error")]
pub struct DeviceError;

pub trait BlockDevice {
    /// Copy block `blockno` into `buf`.
    fn read(&mut self, blockno: u32, buf: &mut Block) -> Result<(), DeviceError>;

    /// Overwrite block `blockno` with `buf`.
    fn write(&mut self, blockno: u32, buf: &Block) -> Result<(), DeviceError>;
}

/// A RAM-backed device of `BLOCK_NUM` blocks. All-zero blocks are not
/// stored, so a freshly formatted device costs next to nothing.
pub struct MemDisk {
    blocks: HashMap<u32, Box<Block>>,
}

impl MemDisk {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }
}

impl Default for MemDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemDisk {
    fn read(&mut self, blockno: u32, buf: &mut Block) -> Result<(), DeviceError> {
        if blockno as usize >= BLOCK_NUM {
            return Err(DeviceError);
        }
        match self.blocks.get(&blockno) {
            Some(block) => buf.copy_from_slice(&block[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write(&mut self, blockno: u32, buf: &Block) -> Result<(), DeviceError> {
        if blockno as usize >= BLOCK_NUM {
            return Err(DeviceError);
        }
        if buf.iter().all(|&b| b == 0) {
            self.blocks.remove(&blockno);
        } else {
            self.blocks.insert(blockno, Box::new(*buf));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_block_is_an_error() {
        let mut disk = MemDisk::new();
        let mut buf = [0; BLOCK_SIZE];
        assert_eq!(disk.read(BLOCK_NUM as u32, &mut buf), Err(DeviceError));
        assert_eq!(disk.write(BLOCK_NUM as u32, &buf), Err(DeviceError));
    }

    #[test]
    fn blocks_are_independent() {
        let mut disk = MemDisk::new();
        let mut buf = [0xaa; BLOCK_SIZE];
        disk.write(3, &buf).unwrap();
        disk.read(4, &mut buf).unwrap();
        assert_eq!(buf, [0; BLOCK_SIZE]);
    }
}
