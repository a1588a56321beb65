//! Superblock: block 0 records the layout the image was formatted with.
//!
//! The live layout is derived from the constants in `param`; the stored copy
//! exists so a mount can refuse an image built for a different partitioning.

use std::mem;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use super::Le32;
use crate::device::Block;
use crate::error::{Error, Result};
use crate::param::{
    BLOCK_NUM, BLOCK_SIZE, DATA_BITMAP_NO, DATA_START_NO, INODE_BITMAP_NO, INODE_NUM, INODE_SIZE,
    INODE_TABLE_NO,
};

#[repr(C)]
#[derive(Debug, PartialEq, AsBytes, FromBytes)]
pub struct Superblock {
    block_size: Le32,
    inode_size: Le32,
    inode_num: Le32,
    block_num: Le32,
    inode_bitmap_no: Le32,
    data_bitmap_no: Le32,
    inode_table_no: Le32,
    data_start_no: Le32,
}

const_assert!(mem::size_of::<Superblock>() <= BLOCK_SIZE);

impl Superblock {
    /// The layout compiled into this build.
    pub fn current() -> Self {
        Self {
            block_size: Le32::new(BLOCK_SIZE as u32),
            inode_size: Le32::new(INODE_SIZE as u32),
            inode_num: Le32::new(INODE_NUM as u32),
            block_num: Le32::new(BLOCK_NUM as u32),
            inode_bitmap_no: Le32::new(INODE_BITMAP_NO),
            data_bitmap_no: Le32::new(DATA_BITMAP_NO),
            inode_table_no: Le32::new(INODE_TABLE_NO),
            data_start_no: Le32::new(DATA_START_NO),
        }
    }

    pub fn decode(buf: &Block) -> Self {
        let mut sb = Self::new_zeroed();
        let n = mem::size_of::<Self>();
        sb.as_bytes_mut().copy_from_slice(&buf[..n]);
        sb
    }

    pub fn encode(&self, buf: &mut Block) {
        buf[..mem::size_of::<Self>()].copy_from_slice(self.as_bytes());
    }

    /// Refuse images formatted with any other layout.
    pub fn validate(&self) -> Result<()> {
        if *self == Self::current() {
            Ok(())
        } else {
            Err(Error::Corrupted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = [0; BLOCK_SIZE];
        Superblock::current().encode(&mut buf);
        let sb = Superblock::decode(&buf);
        assert_eq!(sb, Superblock::current());
        assert!(sb.validate().is_ok());
    }

    #[test]
    fn foreign_layout_is_rejected() {
        let mut buf = [0; BLOCK_SIZE];
        Superblock::current().encode(&mut buf);
        // Pretend the image was formatted with 1 KiB blocks.
        buf[0..4].copy_from_slice(&1024u32.to_le_bytes());
        assert!(matches!(
            Superblock::decode(&buf).validate(),
            Err(Error::Corrupted)
        ));
    }

    #[test]
    fn zeroed_block_is_rejected() {
        let buf = [0; BLOCK_SIZE];
        assert!(Superblock::decode(&buf).validate().is_err());
    }
}
