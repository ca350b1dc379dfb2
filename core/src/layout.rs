//! On-disk geometry constants.
//!
//! `IPB` is derived from `DINODE_SIZE` rather than named as its own bare
//! constant: with `BSIZE = 256` and a 64-byte [`crate::inode::Dinode`],
//! that's 4 inodes per block. See `DESIGN.md` for the reasoning.

use myfs_block::BSIZE;

/// Number of direct block addresses stored in an inode.
pub const NDIRECT: usize = 10;
/// Block addresses that fit in one indirect block (`BSIZE / size_of::<u32>()`).
pub const APB: usize = BSIZE / 4;
/// Size in bytes of one on-disk inode record.
pub const DINODE_SIZE: usize = 64;
/// Inodes packed into one inode-table block.
pub const IPB: usize = BSIZE / DINODE_SIZE;
/// Bits of the block bitmap packed into one bitmap block.
pub const BPB: usize = BSIZE * 8;
/// Size in bytes of one directory entry.
pub const DIRENT_SIZE: usize = 16;
/// Directory entries packed into one block (informational; directories are
/// not block-aligned, entries simply live in the file body).
pub const DPB: usize = BSIZE / DIRENT_SIZE;

/// Maximum number of data blocks reachable from a single inode:
/// direct + single-indirect + double-indirect.
pub const MAXFILEB: usize = NDIRECT + APB + APB * APB;

/// Longest name, NUL included (`name[12]`; so 11 usable bytes).
pub const MAXNAME: usize = 12;

/// Superblock magic, ASCII "MYFS" read as a little-endian `u32`.
pub const MAGIC: u32 = 0x5346594d;
