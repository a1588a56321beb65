//! Block cache.
//!
//! A small, fully associative array of cache lines holding copies of disk
//! block contents, sitting between the filesystem and the device.
//!
//! Interface:
//! * To read the contents of a block, call read.
//! * To overwrite a block, call write. A hit only updates the resident line;
//!   the device copy catches up when the line is evicted.
//! * Call sync to force every resident line out, e.g. at unmount.

use array_macro::array;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::device::{Block, BlockDevice, DeviceError};
use crate::param::{BLOCK_SIZE, NCACHE};

struct CacheLine {
    /// Cached block number; None while the line is empty.
    blockno: Option<u32>,
    data: Block,
}

impl CacheLine {
    fn empty() -> Self {
        Self {
            blockno: None,
            data: [0; BLOCK_SIZE],
        }
    }
}

pub struct Bcache<D> {
    dev: D,
    lines: [CacheLine; NCACHE],
    rng: SmallRng,
}

impl<D: BlockDevice> Bcache<D> {
    pub fn new(dev: D) -> Self {
        Self {
            dev,
            lines: array![_ => CacheLine::empty(); NCACHE],
            rng: SmallRng::from_entropy(),
        }
    }

    /// Copy the contents of block `blockno` into `out`.
    pub fn read(&mut self, blockno: u32, out: &mut Block) -> Result<(), DeviceError> {
        if let Some(i) = self.lookup(blockno) {
            out.copy_from_slice(&self.lines[i].data);
            return Ok(());
        }
        self.dev.read(blockno, out)?;
        self.install(blockno, out)
    }

    /// Overwrite block `blockno` with `data`. A miss writes through to the
    /// device and installs the line.
    pub fn write(&mut self, blockno: u32, data: &Block) -> Result<(), DeviceError> {
        if let Some(i) = self.lookup(blockno) {
            self.lines[i].data.copy_from_slice(data);
            return Ok(());
        }
        self.dev.write(blockno, data)?;
        self.install(blockno, data)
    }

    /// Zero block `blockno`.
    pub fn zero(&mut self, blockno: u32) -> Result<(), DeviceError> {
        self.write(blockno, &[0; BLOCK_SIZE])
    }

    /// Write every resident line back to the device. Lines stay resident.
    pub fn sync(&mut self) -> Result<(), DeviceError> {
        for line in self.lines.iter() {
            if let Some(blockno) = line.blockno {
                self.dev.write(blockno, &line.data)?;
            }
        }
        Ok(())
    }

    /// Give the device back. The caller syncs first if it cares about the
    /// resident lines.
    pub fn into_device(self) -> D {
        self.dev
    }

    fn lookup(&self, blockno: u32) -> Option<usize> {
        self.lines.iter().position(|l| l.blockno == Some(blockno))
    }

    /// Install `data` as the resident copy of `blockno`. The victim line is
    /// picked uniformly among all lines, empty ones included; an occupied
    /// victim is written back first.
    fn install(&mut self, blockno: u32, data: &Block) -> Result<(), DeviceError> {
        let victim = self.rng.gen_range(0..NCACHE);
        if let Some(old) = self.lines[victim].blockno {
            self.dev.write(old, &self.lines[victim].data)?;
        }
        self.lines[victim].blockno = Some(blockno);
        self.lines[victim].data.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;

    fn pattern(tag: u8) -> Block {
        [tag; BLOCK_SIZE]
    }

    #[test]
    fn read_returns_written_data() {
        let mut cache = Bcache::new(MemDisk::new());
        cache.write(5, &pattern(0x5a)).unwrap();
        let mut buf = [0; BLOCK_SIZE];
        cache.read(5, &mut buf).unwrap();
        assert_eq!(buf, pattern(0x5a));
    }

    #[test]
    fn eviction_writes_lines_back() {
        let mut cache = Bcache::new(MemDisk::new());
        // Far more distinct blocks than lines, so every line gets evicted
        // along the way.
        for i in 0..4 * NCACHE as u32 {
            cache.write(100 + i, &pattern(i as u8)).unwrap();
        }
        cache.sync().unwrap();
        let mut dev = cache.into_device();
        let mut buf = [0; BLOCK_SIZE];
        for i in 0..4 * NCACHE as u32 {
            dev.read(100 + i, &mut buf).unwrap();
            assert_eq!(buf, pattern(i as u8));
        }
    }

    #[test]
    fn write_hit_reaches_device_on_sync() {
        let mut cache = Bcache::new(MemDisk::new());
        cache.write(7, &pattern(1)).unwrap();
        // Resident now, so this only touches the line.
        cache.write(7, &pattern(2)).unwrap();
        cache.sync().unwrap();
        let mut dev = cache.into_device();
        let mut buf = [0; BLOCK_SIZE];
        dev.read(7, &mut buf).unwrap();
        assert_eq!(buf, pattern(2));
    }

    #[test]
    fn read_after_reinstall_sees_latest_write() {
        let mut cache = Bcache::new(MemDisk::new());
        cache.write(9, &pattern(0xab)).unwrap();
        // Push enough other blocks through to evict block 9 with certainty.
        for i in 0..32 * NCACHE as u32 {
            cache.write(1000 + i, &pattern(0)).unwrap();
        }
        let mut buf = [0; BLOCK_SIZE];
        cache.read(9, &mut buf).unwrap();
        assert_eq!(buf, pattern(0xab));
    }
}
