//! Host-facing operations.
//!
//! Thin adapters from the host's filesystem operations onto the core: path
//! resolution, the file and directory engines, and the timestamp rules. Each
//! returns `Result`; a host maps failures onto its errno convention with
//! [`Error::errno`](crate::Error::errno).
//!
//! Timestamps: read and readdir touch atime; write and truncate touch the
//! file's mtime/ctime; creating, removing, or renaming touches the parent
//! directory's times; utime sets atime/mtime and bumps ctime.

use log::debug;

use super::{unix_now, Vdfs};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::fcntl::OpenFlags;
use crate::fs::{Inode, REG_MODE};
use crate::param::{BLOCK_SIZE, DATA_BLOCK_NUM, INODE_NUM, MAX_FILE_SIZE, MAX_NAME};
use crate::stat::{FsStat, Stat};

impl<D: BlockDevice> Vdfs<D> {
    /// Attributes of the file or directory at `path`.
    pub fn getattr(&mut self, path: &str) -> Result<Stat> {
        debug!("getattr {}", path);
        let (pos, ino) = self.resolve(path)?;
        Ok(stat_of(pos, &ino))
    }

    /// Feed each live entry of the directory at `path` to `filler`, then
    /// touch the directory's atime.
    pub fn readdir(&mut self, path: &str, mut filler: impl FnMut(&str, &Stat)) -> Result<()> {
        debug!("readdir {}", path);
        let (pos, mut dir) = self.resolve(path)?;
        if !dir.is_dir() {
            return Err(Error::NotDirectory);
        }
        for (name, child) in self.list_entries(&dir)? {
            let ino = self.read_inode(child)?;
            filler(&name, &stat_of(child, &ino));
        }
        dir.atime = unix_now();
        self.write_inode(pos, &dir)
    }

    /// Create a regular file carrying `mode`'s permission bits.
    pub fn mknod(&mut self, path: &str, mode: u32) -> Result<()> {
        debug!("mknod {} {:o}", path, mode);
        self.make_file(path, libc::S_IFREG as u32 | (mode & 0o7777))?;
        Ok(())
    }

    /// Create a directory carrying `mode`'s permission bits.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<()> {
        debug!("mkdir {} {:o}", path, mode);
        self.make_file(path, libc::S_IFDIR as u32 | (mode & 0o7777))?;
        Ok(())
    }

    /// Remove the regular file at `path`.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        debug!("unlink {}", path);
        self.remove_file(path, false)
    }

    /// Remove the directory at `path`, which must hold no live entries.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        debug!("rmdir {}", path);
        self.remove_file(path, true)
    }

    /// Move `old` to `new`; fails if `new` exists.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        debug!("rename {} -> {}", old, new);
        self.rename_path(old, new)
    }

    /// Resize the regular file at `path`.
    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        debug!("truncate {} {}", path, size);
        let (pos, mut ino) = self.resolve(path)?;
        if ino.is_dir() {
            return Err(Error::IsDirectory);
        }
        if size > MAX_FILE_SIZE as u64 {
            return Err(Error::NoSpace);
        }
        let res = self.trunc(&mut ino, size as u32);
        // Persist even after a failed grow: the blocks that were installed
        // must stay reachable from the record, not leak.
        self.write_inode(pos, &ino)?;
        res
    }

    /// Set atime and mtime; ctime records the change itself.
    pub fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> Result<()> {
        debug!("utime {}", path);
        let (pos, mut ino) = self.resolve(path)?;
        ino.atime = atime;
        ino.mtime = mtime;
        ino.ctime = unix_now();
        self.write_inode(pos, &ino)
    }

    /// Filesystem usage counters, from the live in-memory totals.
    pub fn statfs(&self) -> FsStat {
        let blocks_free = (DATA_BLOCK_NUM as u32 - self.blocks_used) as u64;
        let files_free = INODE_NUM as u32 - self.inodes_used;
        FsStat {
            block_size: BLOCK_SIZE as u32,
            blocks: DATA_BLOCK_NUM as u64,
            blocks_free,
            blocks_avail: blocks_free,
            files: INODE_NUM as u32,
            files_free,
            files_avail: files_free,
            name_max: MAX_NAME as u32,
        }
    }

    /// Open `path`, creating it first when O_CREAT is given and nothing is
    /// there yet. Returns the handle the host stashes per open file.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<u64> {
        debug!("open {} {:?}", path, flags);
        if flags.contains(OpenFlags::O_CREATE) && self.resolve(path).is_err() {
            self.make_file(path, REG_MODE)?;
        }
        let (pos, mut ino) = self.resolve(path)?;
        if ino.is_dir() && flags.intersects(OpenFlags::O_WRONLY | OpenFlags::O_RDWR) {
            return Err(Error::IsDirectory);
        }
        if flags.contains(OpenFlags::O_TRUNC) && !ino.is_dir() {
            let res = self.trunc(&mut ino, 0);
            self.write_inode(pos, &ino)?;
            res?;
        }
        Ok(pos as u64)
    }

    /// Read from an open handle into `buf`; returns bytes read, 0 at or past
    /// the end of the file.
    pub fn read(&mut self, fh: u64, buf: &mut [u8], offset: u64) -> Result<usize> {
        debug!("read fh={} off={} len={}", fh, offset, buf.len());
        let pos = fh as u32;
        let mut ino = self.read_inode(pos)?;
        if ino.is_dir() {
            return Err(Error::IsDirectory);
        }
        if offset >= ino.size as u64 {
            return Ok(0);
        }
        let n = self.read_at(&ino, buf, offset as u32)?;
        ino.atime = unix_now();
        self.write_inode(pos, &ino)?;
        Ok(n)
    }

    /// Write `buf` through an open handle; O_APPEND redirects the offset to
    /// the end of the file. Returns `buf.len()` on success.
    pub fn write(&mut self, fh: u64, buf: &[u8], offset: u64, flags: OpenFlags) -> Result<usize> {
        debug!("write fh={} off={} len={}", fh, offset, buf.len());
        let pos = fh as u32;
        let mut ino = self.read_inode(pos)?;
        if ino.is_dir() {
            return Err(Error::IsDirectory);
        }
        let offset = if flags.contains(OpenFlags::O_APPEND) {
            ino.size as u64
        } else {
            offset
        };
        if offset.saturating_add(buf.len() as u64) > MAX_FILE_SIZE as u64 {
            return Err(Error::NoSpace);
        }
        let res = self.write_at(&mut ino, buf, offset as u32);
        if res.is_ok() {
            let now = unix_now();
            ino.mtime = now;
            ino.ctime = now;
        }
        // As with truncate, a failed grow still persists the record.
        self.write_inode(pos, &ino)?;
        res
    }

    /// Release an open handle. Nothing to tear down.
    pub fn release(&mut self, _fh: u64) {}

    pub fn opendir(&mut self, path: &str) -> Result<()> {
        debug!("opendir {}", path);
        Ok(())
    }

    pub fn releasedir(&mut self, _path: &str) {}

    /// Flush every cached block to the device. The host calls this once at
    /// unmount; until then, cached writes only reach the device on eviction.
    pub fn destroy(&mut self) -> Result<()> {
        debug!("destroy");
        self.cache.sync()?;
        Ok(())
    }
}

fn stat_of(pos: u32, ino: &Inode) -> Stat {
    Stat {
        ino: pos,
        mode: ino.mode,
        nlink: 1,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        size: ino.size as u64,
        atime: ino.atime,
        mtime: ino.mtime,
        ctime: ino.ctime,
    }
}
