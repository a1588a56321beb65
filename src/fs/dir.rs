//! Directories.
//!
//! A directory is a file whose content is a packed array of fixed-width
//! entries, ENTRIES_PER_BLOCK to a block. An entry whose inode_pos is 0 is a
//! free slot (the root directory owns inode 0, so no live entry can reference
//! it); removal tombstones the slot and later additions reuse it. Directory
//! blocks are allocated lazily in logical order and reclaimed as soon as they
//! hold no live entry, so a long-lived directory does not pin blocks for
//! entries it no longer has.

use std::mem;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use super::{Inode, Le32, Vdfs};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::param::{
    data_block, BLOCK_SIZE, DIRENT_SIZE, ENTRIES_PER_BLOCK, MAX_FILE_BLOCKS, MAX_NAME,
};

/// On-disk directory entry: a NUL-padded name (unterminated when exactly
/// MAX_NAME bytes long) and the child's inode slot.
#[repr(C)]
#[derive(AsBytes, FromBytes)]
pub struct Dirent {
    name: [u8; MAX_NAME],
    _pad: [u8; 3],
    inode_pos: Le32,
}

const_assert!(mem::size_of::<Dirent>() == DIRENT_SIZE);

impl Dirent {
    fn new(name: &str, inode_pos: u32) -> Self {
        let mut de = Self::new_zeroed();
        de.set_name(name);
        de.inode_pos = Le32::new(inode_pos);
        de
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut de = Self::new_zeroed();
        de.as_bytes_mut().copy_from_slice(bytes);
        de
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes.copy_from_slice(self.as_bytes());
    }

    pub fn inode_pos(&self) -> u32 {
        self.inode_pos.get()
    }

    pub fn is_live(&self) -> bool {
        self.inode_pos() != 0
    }

    /// Store `name`, truncated to MAX_NAME bytes.
    fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_NAME);
        self.name = [0; MAX_NAME];
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    /// The stored name: up to the first NUL, or all MAX_NAME bytes.
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        &self.name[..len]
    }

    /// Bounded comparison; the lookup name is truncated the same way
    /// `set_name` truncates.
    fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        self.name() == &bytes[..bytes.len().min(MAX_NAME)]
    }
}

impl<D: BlockDevice> Vdfs<D> {
    /// Install (`name`, `child`) in `dir`, reusing the first free slot in
    /// logical order and allocating directory blocks lazily. The caller
    /// persists the directory inode.
    pub(crate) fn add_entry(&mut self, dir: &mut Inode, name: &str, child: u32) -> Result<()> {
        debug_assert!(child != 0, "directory entry cannot reference the root");
        for bn in 0..MAX_FILE_BLOCKS {
            let pos = match self.map_block(dir, bn)? {
                Some(pos) => pos,
                None => {
                    let pos = self.alloc_data()?;
                    self.set_block(dir, bn, Some(pos))?;
                    pos
                }
            };
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                let off = slot * DIRENT_SIZE;
                if !Dirent::decode(&buf[off..off + DIRENT_SIZE]).is_live() {
                    Dirent::new(name, child).encode(&mut buf[off..off + DIRENT_SIZE]);
                    self.cache.write(data_block(pos), &buf)?;
                    dir.size += DIRENT_SIZE as u32;
                    return Ok(());
                }
            }
        }
        Err(Error::NoSpace)
    }

    /// Locate `name` in `dir`, returning the child's inode slot.
    pub(crate) fn find_entry(&mut self, dir: &Inode, name: &str) -> Result<Option<u32>> {
        for bn in 0..MAX_FILE_BLOCKS {
            let pos = match self.map_block(dir, bn)? {
                Some(pos) => pos,
                None => continue,
            };
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                let off = slot * DIRENT_SIZE;
                let de = Dirent::decode(&buf[off..off + DIRENT_SIZE]);
                if de.is_live() && de.name_matches(name) {
                    return Ok(Some(de.inode_pos()));
                }
            }
        }
        Ok(None)
    }

    /// Tombstone `name` in `dir`, then reclaim every directory block left
    /// without a live entry. Returns the removed child's inode slot; the
    /// caller persists the directory inode.
    pub(crate) fn remove_entry(&mut self, dir: &mut Inode, name: &str) -> Result<u32> {
        let mut removed = None;
        'search: for bn in 0..MAX_FILE_BLOCKS {
            let pos = match self.map_block(dir, bn)? {
                Some(pos) => pos,
                None => continue,
            };
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                let off = slot * DIRENT_SIZE;
                let mut de = Dirent::decode(&buf[off..off + DIRENT_SIZE]);
                if de.is_live() && de.name_matches(name) {
                    removed = Some(de.inode_pos());
                    de.inode_pos = Le32::new(0);
                    de.encode(&mut buf[off..off + DIRENT_SIZE]);
                    self.cache.write(data_block(pos), &buf)?;
                    dir.size -= DIRENT_SIZE as u32;
                    break 'search;
                }
            }
        }
        let child = removed.ok_or(Error::NotFound)?;

        // Give back every block the removal left without live entries.
        for bn in 0..MAX_FILE_BLOCKS {
            let pos = match self.map_block(dir, bn)? {
                Some(pos) => pos,
                None => continue,
            };
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            let dead = (0..ENTRIES_PER_BLOCK)
                .all(|slot| !Dirent::decode(&buf[slot * DIRENT_SIZE..][..DIRENT_SIZE]).is_live());
            if dead {
                self.free_data(pos)?;
                self.set_block(dir, bn, None)?;
            }
        }
        Ok(child)
    }

    /// Every live entry of `dir` in storage order, as (name, inode slot).
    pub(crate) fn list_entries(&mut self, dir: &Inode) -> Result<Vec<(String, u32)>> {
        let mut out = Vec::with_capacity(dir.size as usize / DIRENT_SIZE);
        for bn in 0..MAX_FILE_BLOCKS {
            let pos = match self.map_block(dir, bn)? {
                Some(pos) => pos,
                None => continue,
            };
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                let de = Dirent::decode(&buf[slot * DIRENT_SIZE..][..DIRENT_SIZE]);
                if de.is_live() {
                    out.push((String::from_utf8_lossy(de.name()).into_owned(), de.inode_pos()));
                }
            }
        }
        Ok(out)
    }
}
