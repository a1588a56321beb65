//! Filesystem core.
//!
//! `Vdfs` owns the block cache (and through it the device) plus the live
//! bitmap usage counters, and stitches the layers together: allocators
//! (`bitmap`), inode records and the file engine (`inode`), the directory
//! engine (`dir`), and path resolution (`path`). The host-facing operation
//! surface lives in `ops`.
//!
//! This module holds the lifecycle pieces: formatting, mounting, unmounting,
//! and the create/remove/rename plumbing shared by several operations.

pub(crate) mod bitmap;
mod dir;
mod inode;
mod ops;
mod path;
mod superblock;

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use zerocopy::byteorder::{LittleEndian, U32};

use crate::bio::Bcache;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::param::{
    BLOCK_NUM, BLOCK_SIZE, BITS_PER_BLOCK, DATA_BITMAP_BLOCKS, DATA_BITMAP_NO, DATA_BLOCK_NUM,
    INODE_BITMAP_NO, INODE_NUM, ROOT_INO, SUPERBLOCK_NO,
};
pub(crate) use self::inode::Inode;
use self::superblock::Superblock;

/// The little-endian u32 every on-disk integer is stored as.
pub(crate) type Le32 = U32<LittleEndian>;

/// Mode bits stored for a directory.
pub const DIR_MODE: u32 = libc::S_IFDIR as u32 | 0o755;

/// Mode bits stored for a regular file.
pub const REG_MODE: u32 = libc::S_IFREG as u32 | 0o644;

/// Seconds since the epoch, as stored in inode timestamps.
pub(crate) fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

pub struct Vdfs<D: BlockDevice> {
    cache: Bcache<D>,
    inodes_used: u32,
    blocks_used: u32,
}

impl<D: BlockDevice> Vdfs<D> {
    /// Format `dev` and mount the result: zero every block, write the
    /// superblock, install the root directory.
    pub fn mkfs(dev: D) -> Result<Self> {
        let mut fs = Self {
            cache: Bcache::new(dev),
            inodes_used: 0,
            blocks_used: 0,
        };
        for blockno in 0..BLOCK_NUM as u32 {
            fs.cache.zero(blockno)?;
        }
        let mut buf = [0; BLOCK_SIZE];
        Superblock::current().encode(&mut buf);
        fs.cache.write(SUPERBLOCK_NO, &buf)?;
        let root = fs.alloc_inode()?;
        debug_assert_eq!(root, ROOT_INO);
        fs.write_inode(root, &Inode::init(DIR_MODE, unix_now()))?;
        fs.cache.sync()?;
        info!("formatted: {} blocks, {} inodes", BLOCK_NUM, INODE_NUM);
        Ok(fs)
    }

    /// Mount an already-formatted device: check the superblock against the
    /// compiled-in layout and rebuild the usage counters from the bitmaps.
    pub fn mount(dev: D) -> Result<Self> {
        let mut fs = Self {
            cache: Bcache::new(dev),
            inodes_used: 0,
            blocks_used: 0,
        };
        let mut buf = [0; BLOCK_SIZE];
        fs.cache.read(SUPERBLOCK_NO, &mut buf)?;
        Superblock::decode(&buf).validate()?;

        fs.cache.read(INODE_BITMAP_NO, &mut buf)?;
        if !bitmap::test(&buf, ROOT_INO as usize) {
            return Err(Error::Corrupted);
        }
        fs.inodes_used = bitmap::count_ones(&buf, INODE_NUM);
        for i in 0..DATA_BITMAP_BLOCKS {
            let base = i * BITS_PER_BLOCK;
            if base >= DATA_BLOCK_NUM {
                break;
            }
            fs.cache.read(DATA_BITMAP_NO + i as u32, &mut buf)?;
            let limit = (DATA_BLOCK_NUM - base).min(BITS_PER_BLOCK);
            fs.blocks_used += bitmap::count_ones(&buf, limit);
        }

        if !fs.read_inode(ROOT_INO)?.is_dir() {
            return Err(Error::Corrupted);
        }
        info!(
            "mounted: {} inodes and {} data blocks in use",
            fs.inodes_used, fs.blocks_used
        );
        Ok(fs)
    }

    /// Flush the cache and hand the device back.
    pub fn unmount(mut self) -> Result<D> {
        self.cache.sync()?;
        Ok(self.cache.into_device())
    }

    /// Create a file or directory at `path`, returning its inode slot.
    pub(crate) fn make_file(&mut self, path: &str, mode: u32) -> Result<u32> {
        let now = unix_now();
        let pos = self.alloc_inode()?;
        self.write_inode(pos, &Inode::init(mode, now))?;
        match self.link_path(path, pos, now) {
            Ok(()) => Ok(pos),
            Err(e) => {
                // The fresh inode never became reachable; give it back.
                self.free_inode(pos)?;
                Err(e)
            }
        }
    }

    fn link_path(&mut self, path: &str, child: u32, now: u32) -> Result<()> {
        let (parent_pos, mut parent, name) = self.resolve_parent(path)?;
        if self.find_entry(&parent, name)?.is_some() {
            return Err(Error::Exists);
        }
        self.add_entry(&mut parent, name, child)?;
        parent.atime = now;
        parent.mtime = now;
        parent.ctime = now;
        self.write_inode(parent_pos, &parent)
    }

    /// Unlink `path` and release its storage. `expect_dir` selects rmdir
    /// semantics: the target must be a directory with no live entries.
    pub(crate) fn remove_file(&mut self, path: &str, expect_dir: bool) -> Result<()> {
        let (parent_pos, mut parent, name) = self.resolve_parent(path)?;
        let pos = self.find_entry(&parent, name)?.ok_or(Error::NotFound)?;
        let mut ino = self.read_inode(pos)?;
        if expect_dir {
            if !ino.is_dir() {
                return Err(Error::NotDirectory);
            }
            if ino.size != 0 {
                return Err(Error::NotEmpty);
            }
        } else if ino.is_dir() {
            return Err(Error::IsDirectory);
        }
        self.remove_entry(&mut parent, name)?;
        let now = unix_now();
        parent.mtime = now;
        parent.ctime = now;
        self.write_inode(parent_pos, &parent)?;
        self.release_blocks(&mut ino)?;
        self.free_inode(pos)
    }

    /// Move the entry at `old` to `new`. The inode slot travels unchanged.
    ///
    /// Fails if `new` already exists; the two directory updates are not
    /// atomic, so a device failure in between can leave the file linked
    /// nowhere.
    pub(crate) fn rename_path(&mut self, old: &str, new: &str) -> Result<()> {
        if self.resolve(new).is_ok() {
            return Err(Error::Exists);
        }
        let (old_parent_pos, mut old_parent, old_name) = self.resolve_parent(old)?;
        if self.find_entry(&old_parent, old_name)?.is_none() {
            return Err(Error::NotFound);
        }
        // Make sure the destination parent exists before touching anything.
        let (new_parent_pos, _, new_name) = self.resolve_parent(new)?;

        let child = self.remove_entry(&mut old_parent, old_name)?;
        let now = unix_now();
        old_parent.mtime = now;
        old_parent.ctime = now;
        self.write_inode(old_parent_pos, &old_parent)?;

        // Re-read rather than reuse: the two parents may be the same
        // directory, whose record just changed.
        let mut new_parent = self.read_inode(new_parent_pos)?;
        self.add_entry(&mut new_parent, new_name, child)?;
        new_parent.mtime = now;
        new_parent.ctime = now;
        self.write_inode(new_parent_pos, &new_parent)
    }
}
