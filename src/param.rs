//! On-disk layout constants.
//!
//! The device is partitioned at build time:
//!
//! [ superblock | inode bitmap | data bitmap | inode table | data blocks ]
//!       0            1            2..=17      18..=1041     1042..=65535

use static_assertions::const_assert;

/// Block size in bytes, the unit of all device I/O.
pub const BLOCK_SIZE: usize = 4096;

/// Total number of blocks on the device.
pub const BLOCK_NUM: usize = 65536;

/// Size of an inode-table slot in bytes.
pub const INODE_SIZE: usize = 128;

/// Number of inode slots.
pub const INODE_NUM: usize = 32768;

/// The superblock lives in block 0.
pub const SUPERBLOCK_NO: u32 = 0;

/// One block of inode bitmap.
pub const INODE_BITMAP_NO: u32 = 1;

/// First block of the data bitmap.
pub const DATA_BITMAP_NO: u32 = 2;

/// Blocks reserved for the data bitmap.
pub const DATA_BITMAP_BLOCKS: usize = 16;

/// First block of the inode table.
pub const INODE_TABLE_NO: u32 = DATA_BITMAP_NO + DATA_BITMAP_BLOCKS as u32;

/// Blocks occupied by the inode table.
pub const INODE_TABLE_BLOCKS: usize = INODE_NUM * INODE_SIZE / BLOCK_SIZE;

/// First block of the data region.
pub const DATA_START_NO: u32 = INODE_TABLE_NO + INODE_TABLE_BLOCKS as u32;

/// Number of allocatable data blocks.
pub const DATA_BLOCK_NUM: usize = BLOCK_NUM - DATA_START_NO as usize;

/// Inodes per inode-table block.
pub const IPB: usize = BLOCK_SIZE / INODE_SIZE;

/// Bitmap bits per block.
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

/// Direct block pointers per inode.
pub const NDIRECT: usize = 12;

/// Single-indirect block pointers per inode.
pub const NINDIRECT: usize = 2;

/// Block pointers held by one indirect block.
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Largest file, in blocks.
pub const MAX_FILE_BLOCKS: usize = NDIRECT + NINDIRECT * PTRS_PER_BLOCK;

/// Largest file, in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// The unmapped-pointer sentinel, -1 on disk.
pub const NULL_BLOCK: u32 = u32::MAX;

/// Inode slot of the root directory.
pub const ROOT_INO: u32 = 0;

/// Bytes per directory entry.
pub const DIRENT_SIZE: usize = 32;

/// Directory entries per block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// Longest stored file name, in bytes.
pub const MAX_NAME: usize = 25;

/// Deepest path the resolver will walk.
pub const MAX_DEPTH: usize = 130;

/// Lines in the block cache.
pub const NCACHE: usize = 8;

/// Inode-table block containing inode slot `pos`.
pub const fn inode_block(pos: u32) -> u32 {
    INODE_TABLE_NO + pos / IPB as u32
}

/// Device block backing data-region block `pos`.
pub const fn data_block(pos: u32) -> u32 {
    DATA_START_NO + pos
}

/// Data-bitmap block holding the bit for data-region block `pos`.
pub const fn data_bitmap_block(pos: u32) -> u32 {
    DATA_BITMAP_NO + pos / BITS_PER_BLOCK as u32
}

// The inode bitmap must fit in its single block.
const_assert!(INODE_NUM / 8 <= BLOCK_SIZE);
// The data bitmap must fit in its region.
const_assert!((DATA_BLOCK_NUM + 7) / 8 <= DATA_BITMAP_BLOCKS * BLOCK_SIZE);
// Inode slots tile their blocks exactly.
const_assert!(BLOCK_SIZE % INODE_SIZE == 0);
const_assert!(INODE_NUM % IPB == 0);
// Directory entries tile their blocks exactly.
const_assert!(BLOCK_SIZE % DIRENT_SIZE == 0);
// The layout tiles the whole device.
const_assert!(DATA_START_NO as usize + DATA_BLOCK_NUM == BLOCK_NUM);
// Guaranteed capacity minimums: 250 MiB of data, 32768 files, 8 MiB per file.
const_assert!(DATA_BLOCK_NUM * BLOCK_SIZE >= 250 * 1024 * 1024);
const_assert!(INODE_NUM >= 32768);
const_assert!(MAX_FILE_SIZE >= 8 * 1024 * 1024);
