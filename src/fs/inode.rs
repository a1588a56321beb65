//! Inodes.
//!
//! An inode describes a single file or directory: type and permission bits,
//! size, timestamps, and the list of data blocks holding its content. The
//! first NDIRECT blocks are listed in the record itself; two single-indirect
//! blocks each extend the map by PTRS_PER_BLOCK more, for 2060 addressable
//! blocks in total.
//!
//! Records live packed in the inode table, IPB to a block. `read_inode`
//! decodes one into its in-memory form; every mutation is written back with
//! `write_inode`. Block pointers are data-region indices; `NULL_BLOCK` marks
//! an unmapped slot, on direct pointers, indirect pointers, and indirect
//! block entries alike.

use std::mem;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use super::{unix_now, Le32, Vdfs};
use crate::device::{Block, BlockDevice};
use crate::error::{Error, Result};
use crate::param::{
    data_block, inode_block, BLOCK_SIZE, INODE_SIZE, IPB, MAX_FILE_SIZE, NDIRECT, NINDIRECT,
    NULL_BLOCK, PTRS_PER_BLOCK,
};

/// On-disk inode record. All fields little-endian.
#[repr(C)]
#[derive(AsBytes, FromBytes)]
struct Dinode {
    mode: Le32,
    size: Le32,
    atime: Le32,
    mtime: Le32,
    ctime: Le32,
    direct: [Le32; NDIRECT],
    indirect: [Le32; NINDIRECT],
}

const_assert!(mem::size_of::<Dinode>() <= INODE_SIZE);

/// In-memory copy of a disk inode.
#[derive(Clone, Debug)]
pub struct Inode {
    pub mode: u32,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub direct: [u32; NDIRECT],
    pub indirect: [u32; NINDIRECT],
}

impl Inode {
    /// A fresh inode: empty, every pointer unmapped, all times `now`.
    pub fn init(mode: u32, now: u32) -> Self {
        Self {
            mode,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            direct: [NULL_BLOCK; NDIRECT],
            indirect: [NULL_BLOCK; NINDIRECT],
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    fn from_disk(d: &Dinode) -> Self {
        let mut direct = [NULL_BLOCK; NDIRECT];
        for (m, d) in direct.iter_mut().zip(&d.direct) {
            *m = d.get();
        }
        let mut indirect = [NULL_BLOCK; NINDIRECT];
        for (m, d) in indirect.iter_mut().zip(&d.indirect) {
            *m = d.get();
        }
        Self {
            mode: d.mode.get(),
            size: d.size.get(),
            atime: d.atime.get(),
            mtime: d.mtime.get(),
            ctime: d.ctime.get(),
            direct,
            indirect,
        }
    }

    fn to_disk(&self) -> Dinode {
        Dinode {
            mode: Le32::new(self.mode),
            size: Le32::new(self.size),
            atime: Le32::new(self.atime),
            mtime: Le32::new(self.mtime),
            ctime: Le32::new(self.ctime),
            direct: self.direct.map(Le32::new),
            indirect: self.indirect.map(Le32::new),
        }
    }
}

/// An indirect block: PTRS_PER_BLOCK little-endian pointers.
#[repr(C)]
#[derive(AsBytes, FromBytes)]
struct IndirectBlock {
    slots: [Le32; PTRS_PER_BLOCK],
}

const_assert!(mem::size_of::<IndirectBlock>() == BLOCK_SIZE);

impl IndirectBlock {
    fn decode(buf: &Block) -> Self {
        let mut blk = Self::new_zeroed();
        blk.as_bytes_mut().copy_from_slice(buf);
        blk
    }

    fn encode(&self, buf: &mut Block) {
        buf.copy_from_slice(self.as_bytes());
    }

    fn unmapped() -> Self {
        Self {
            slots: [Le32::new(NULL_BLOCK); PTRS_PER_BLOCK],
        }
    }

    fn get(&self, i: usize) -> u32 {
        self.slots[i].get()
    }

    fn set(&mut self, i: usize, pos: u32) {
        self.slots[i] = Le32::new(pos);
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.get() == NULL_BLOCK)
    }
}

/// Blocks needed to hold `bytes` bytes.
const fn blocks_for(bytes: u32) -> usize {
    (bytes as usize + BLOCK_SIZE - 1) / BLOCK_SIZE
}

impl<D: BlockDevice> Vdfs<D> {
    pub(crate) fn read_inode(&mut self, pos: u32) -> Result<Inode> {
        let mut buf = [0; BLOCK_SIZE];
        self.cache.read(inode_block(pos), &mut buf)?;
        let off = pos as usize % IPB * INODE_SIZE;
        let mut d = Dinode::new_zeroed();
        let n = mem::size_of::<Dinode>();
        d.as_bytes_mut().copy_from_slice(&buf[off..off + n]);
        Ok(Inode::from_disk(&d))
    }

    pub(crate) fn write_inode(&mut self, pos: u32, ino: &Inode) -> Result<()> {
        let mut buf = [0; BLOCK_SIZE];
        self.cache.read(inode_block(pos), &mut buf)?;
        let off = pos as usize % IPB * INODE_SIZE;
        let n = mem::size_of::<Dinode>();
        buf[off..off + n].copy_from_slice(ino.to_disk().as_bytes());
        self.cache.write(inode_block(pos), &buf)?;
        Ok(())
    }

    /// Data block backing logical block `bn` of `ino`, if mapped.
    pub(crate) fn map_block(&mut self, ino: &Inode, bn: usize) -> Result<Option<u32>> {
        if bn < NDIRECT {
            return Ok(Some(ino.direct[bn]).filter(|&p| p != NULL_BLOCK));
        }
        let bn = bn - NDIRECT;
        let which = bn / PTRS_PER_BLOCK;
        assert!(which < NINDIRECT, "logical block out of range");
        let ind = ino.indirect[which];
        if ind == NULL_BLOCK {
            return Ok(None);
        }
        let mut buf = [0; BLOCK_SIZE];
        self.cache.read(data_block(ind), &mut buf)?;
        let pos = IndirectBlock::decode(&buf).get(bn % PTRS_PER_BLOCK);
        Ok(Some(pos).filter(|&p| p != NULL_BLOCK))
    }

    /// Point logical block `bn` of `ino` at `target`, or unmap it.
    ///
    /// The first mapping in an indirect range allocates the indirect block
    /// (charged to the data bitmap); unmapping the last one frees it again.
    /// Only the in-memory record changes; the caller persists the inode.
    pub(crate) fn set_block(&mut self, ino: &mut Inode, bn: usize, target: Option<u32>) -> Result<()> {
        let target = target.unwrap_or(NULL_BLOCK);
        if bn < NDIRECT {
            ino.direct[bn] = target;
            return Ok(());
        }
        let bn = bn - NDIRECT;
        let which = bn / PTRS_PER_BLOCK;
        assert!(which < NINDIRECT, "logical block out of range");
        let mut ind = ino.indirect[which];
        if ind == NULL_BLOCK {
            if target == NULL_BLOCK {
                return Ok(());
            }
            ind = self.alloc_data()?;
            let mut buf = [0; BLOCK_SIZE];
            IndirectBlock::unmapped().encode(&mut buf);
            self.cache.write(data_block(ind), &buf)?;
            ino.indirect[which] = ind;
        }
        let mut buf = [0; BLOCK_SIZE];
        self.cache.read(data_block(ind), &mut buf)?;
        let mut blk = IndirectBlock::decode(&buf);
        blk.set(bn % PTRS_PER_BLOCK, target);
        if target == NULL_BLOCK && blk.is_empty() {
            self.free_data(ind)?;
            ino.indirect[which] = NULL_BLOCK;
            return Ok(());
        }
        blk.encode(&mut buf);
        self.cache.write(data_block(ind), &buf)?;
        Ok(())
    }

    /// Grow or shrink `ino` to `new_size` bytes.
    ///
    /// Freshly allocated blocks are zero-filled, so bytes grown past the old
    /// tail block read as zero; bytes regrown within it see whatever the
    /// block already held. On an allocation failure midway through a grow the
    /// blocks installed so far stay mapped and the size keeps its old value.
    pub(crate) fn trunc(&mut self, ino: &mut Inode, new_size: u32) -> Result<()> {
        if new_size as usize > MAX_FILE_SIZE {
            return Err(Error::NoSpace);
        }
        let old_blocks = blocks_for(ino.size);
        let new_blocks = blocks_for(new_size);
        for bn in old_blocks..new_blocks {
            let pos = self.alloc_data()?;
            self.set_block(ino, bn, Some(pos))?;
        }
        for bn in new_blocks..old_blocks {
            if let Some(pos) = self.map_block(ino, bn)? {
                self.free_data(pos)?;
                self.set_block(ino, bn, None)?;
            }
        }
        let now = unix_now();
        ino.atime = now;
        ino.ctime = now;
        ino.size = new_size;
        Ok(())
    }

    /// Free every data block `ino` references, indirect blocks included.
    pub(crate) fn release_blocks(&mut self, ino: &mut Inode) -> Result<()> {
        for bn in 0..NDIRECT {
            if ino.direct[bn] != NULL_BLOCK {
                self.free_data(ino.direct[bn])?;
                ino.direct[bn] = NULL_BLOCK;
            }
        }
        for which in 0..NINDIRECT {
            let ind = ino.indirect[which];
            if ind == NULL_BLOCK {
                continue;
            }
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(ind), &mut buf)?;
            let blk = IndirectBlock::decode(&buf);
            for i in 0..PTRS_PER_BLOCK {
                if blk.get(i) != NULL_BLOCK {
                    self.free_data(blk.get(i))?;
                }
            }
            self.free_data(ind)?;
            ino.indirect[which] = NULL_BLOCK;
        }
        ino.size = 0;
        Ok(())
    }

    /// Copy file content into `dst` starting at byte `off`. Returns the
    /// number of bytes copied, clamped to the end of the file.
    pub(crate) fn read_at(&mut self, ino: &Inode, dst: &mut [u8], off: u32) -> Result<usize> {
        if off >= ino.size {
            return Ok(0);
        }
        let n = dst.len().min((ino.size - off) as usize);
        let mut done = 0;
        while done < n {
            let at = off as usize + done;
            let begin = at % BLOCK_SIZE;
            let m = (n - done).min(BLOCK_SIZE - begin);
            let pos = self
                .map_block(ino, at / BLOCK_SIZE)?
                .ok_or(Error::Corrupted)?;
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            dst[done..done + m].copy_from_slice(&buf[begin..begin + m]);
            done += m;
        }
        Ok(n)
    }

    /// Copy `src` into the file at byte `off`, growing it first when the
    /// write reaches past the end. Returns the number of bytes written,
    /// which is `src.len()` on success.
    pub(crate) fn write_at(&mut self, ino: &mut Inode, src: &[u8], off: u32) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        let end = off as u64 + src.len() as u64;
        if end > MAX_FILE_SIZE as u64 {
            return Err(Error::NoSpace);
        }
        if end > ino.size as u64 {
            self.trunc(ino, end as u32)?;
        }
        let mut done = 0;
        while done < src.len() {
            let at = off as usize + done;
            let begin = at % BLOCK_SIZE;
            let m = (src.len() - done).min(BLOCK_SIZE - begin);
            let pos = self
                .map_block(ino, at / BLOCK_SIZE)?
                .ok_or(Error::Corrupted)?;
            let mut buf = [0; BLOCK_SIZE];
            self.cache.read(data_block(pos), &mut buf)?;
            buf[begin..begin + m].copy_from_slice(&src[done..done + m]);
            self.cache.write(data_block(pos), &buf)?;
            done += m;
        }
        Ok(src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;
    use crate::fs::{DIR_MODE, REG_MODE};
    use crate::param::ROOT_INO;

    fn fresh() -> Vdfs<MemDisk> {
        Vdfs::mkfs(MemDisk::new()).unwrap()
    }

    #[test]
    fn record_roundtrip_does_not_disturb_neighbors() {
        let mut fs = fresh();
        let mut a = Inode::init(REG_MODE, 11);
        a.size = 999;
        a.direct[3] = 42;
        let b = Inode::init(DIR_MODE, 22);
        // Slots 5 and 6 share an inode-table block.
        fs.write_inode(5, &a).unwrap();
        fs.write_inode(6, &b).unwrap();
        let got = fs.read_inode(5).unwrap();
        assert_eq!(got.mode, REG_MODE);
        assert_eq!(got.size, 999);
        assert_eq!(got.direct[3], 42);
        assert_eq!(got.indirect, [NULL_BLOCK; NINDIRECT]);
        assert_eq!(fs.read_inode(6).unwrap().mode, DIR_MODE);
        // Root, one block earlier in the table, is untouched.
        assert!(fs.read_inode(ROOT_INO).unwrap().is_dir());
    }

    #[test]
    fn direct_map() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        assert_eq!(fs.map_block(&ino, 0).unwrap(), None);
        let pos = fs.alloc_data().unwrap();
        fs.set_block(&mut ino, 0, Some(pos)).unwrap();
        assert_eq!(fs.map_block(&ino, 0).unwrap(), Some(pos));
        fs.set_block(&mut ino, 0, None).unwrap();
        assert_eq!(fs.map_block(&ino, 0).unwrap(), None);
    }

    #[test]
    fn indirect_map_allocates_and_reclaims_the_indirect_block() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        let free = fs.statfs().blocks_free;
        let pos = fs.alloc_data().unwrap();
        // First mapping in the range costs the indirect block too.
        fs.set_block(&mut ino, NDIRECT, Some(pos)).unwrap();
        assert_ne!(ino.indirect[0], NULL_BLOCK);
        assert_eq!(fs.statfs().blocks_free, free - 2);
        assert_eq!(fs.map_block(&ino, NDIRECT).unwrap(), Some(pos));
        assert_eq!(fs.map_block(&ino, NDIRECT + 1).unwrap(), None);
        // Unmapping the last slot frees the indirect block itself.
        fs.free_data(pos).unwrap();
        fs.set_block(&mut ino, NDIRECT, None).unwrap();
        assert_eq!(ino.indirect[0], NULL_BLOCK);
        assert_eq!(fs.statfs().blocks_free, free);
    }

    #[test]
    fn second_indirect_range() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        let bn = NDIRECT + PTRS_PER_BLOCK + 7;
        let pos = fs.alloc_data().unwrap();
        fs.set_block(&mut ino, bn, Some(pos)).unwrap();
        assert_eq!(ino.indirect[0], NULL_BLOCK);
        assert_ne!(ino.indirect[1], NULL_BLOCK);
        assert_eq!(fs.map_block(&ino, bn).unwrap(), Some(pos));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn map_past_the_last_indirect_range_panics() {
        let mut fs = fresh();
        let ino = Inode::init(REG_MODE, 0);
        let _ = fs.map_block(&ino, NDIRECT + NINDIRECT * PTRS_PER_BLOCK);
    }

    #[test]
    fn trunc_grow_allocates_the_exact_block_range() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        let free = fs.statfs().blocks_free;
        fs.trunc(&mut ino, BLOCK_SIZE as u32).unwrap();
        assert_eq!(fs.statfs().blocks_free, free - 1);
        // Growing from an exact block multiple must not touch the old tail.
        fs.trunc(&mut ino, 2 * BLOCK_SIZE as u32).unwrap();
        assert_eq!(fs.statfs().blocks_free, free - 2);
        assert_eq!(ino.size, 2 * BLOCK_SIZE as u32);
        fs.trunc(&mut ino, 0).unwrap();
        assert_eq!(fs.statfs().blocks_free, free);
        assert_eq!(ino.direct, [NULL_BLOCK; NDIRECT]);
    }

    #[test]
    fn trunc_same_size_changes_nothing() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        fs.write_at(&mut ino, b"hello", 0).unwrap();
        let free = fs.statfs().blocks_free;
        fs.trunc(&mut ino, 5).unwrap();
        fs.trunc(&mut ino, 5).unwrap();
        assert_eq!(fs.statfs().blocks_free, free);
        let mut out = [0u8; 5];
        assert_eq!(fs.read_at(&ino, &mut out, 0).unwrap(), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_and_read_span_blocks() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        let data: Vec<u8> = (0..3 * BLOCK_SIZE + 100).map(|i| i as u8).collect();
        assert_eq!(fs.write_at(&mut ino, &data, 10).unwrap(), data.len());
        assert_eq!(ino.size as usize, data.len() + 10);
        let mut out = vec![0u8; data.len()];
        assert_eq!(fs.read_at(&ino, &mut out, 10).unwrap(), data.len());
        assert_eq!(out, data);
        // The first ten bytes were never written and read as zero.
        let mut head = [0xffu8; 10];
        assert_eq!(fs.read_at(&ino, &mut head, 0).unwrap(), 10);
        assert_eq!(head, [0u8; 10]);
    }

    #[test]
    fn read_past_the_end_is_empty() {
        let mut fs = fresh();
        let mut ino = Inode::init(REG_MODE, 0);
        fs.write_at(&mut ino, b"abc", 0).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(fs.read_at(&ino, &mut out, 3).unwrap(), 0);
        assert_eq!(fs.read_at(&ino, &mut out, 100).unwrap(), 0);
        // A long read is clamped to the end of the file.
        assert_eq!(fs.read_at(&ino, &mut out, 1).unwrap(), 2);
        assert_eq!(&out[..2], b"bc");
    }
}
