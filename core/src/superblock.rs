//! The on-disk superblock: block 0.

use crate::{
    error::Result,
    layout::{BPB, IPB, MAGIC},
};
use binrw::{BinRead, BinWrite};
use myfs_block::{BlockDevice, BSIZE};
use std::io::Cursor;

/// Block 0's on-disk layout: six little-endian `u32`s followed by zero
/// padding out to `BSIZE`.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Superblock {
    pub magic: u32,
    /// Total device size in blocks.
    pub size: u32,
    /// Number of data blocks (`size` minus the meta blocks).
    pub nblocks: u32,
    /// Configured number of inodes.
    pub ninodes: u32,
    /// First block of the inode table.
    pub inodestart: u32,
    /// First block of the free bitmap.
    pub bmapstart: u32,
}

impl Superblock {
    /// Reads block 0 and parses it. Does not check the magic; callers decide
    /// what "not formatted" means for their command.
    pub fn load(dev: &mut impl BlockDevice) -> Result<Self> {
        let block = dev.bread(0)?;
        let mut cursor = Cursor::new(&block[..]);
        Ok(Superblock::read(&mut cursor).expect("superblock block is always 24 bytes"))
    }

    pub fn is_formatted(&self) -> bool {
        self.magic == MAGIC
    }

    /// Number of blocks occupied by the inode table.
    pub fn inode_blocks(&self) -> u32 {
        (self.ninodes as usize).div_ceil(IPB) as u32
    }

    /// Number of blocks occupied by the free bitmap (covers the whole
    /// device, meta blocks included).
    pub fn bitmap_blocks(&self) -> u32 {
        (self.size as usize).div_ceil(BPB) as u32
    }

    /// Number of leading "meta" blocks: superblock + inode table + bitmap.
    pub fn meta_blocks(&self) -> u32 {
        1 + self.inode_blocks() + self.bitmap_blocks()
    }

    fn to_block(self) -> myfs_block::Block {
        let mut buf = [0u8; BSIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        self.write(&mut cursor).expect("superblock fits in one block");
        buf
    }

    fn write_to(&self, dev: &mut impl BlockDevice) -> Result<()> {
        dev.bwrite(0, &self.to_block())?;
        Ok(())
    }

    /// Formats the device: computes geometry from `binfo`, writes the
    /// superblock, and marks the meta range (superblock + inode table +
    /// bitmap) used in the bitmap itself. Does not create the root
    /// directory inode; that is [`crate::fs::Filesystem::format`]'s job,
    /// since it needs the inode/directory layers.
    pub fn format(dev: &mut impl BlockDevice, ninodes: u32) -> Result<Self> {
        let (ncyl, nsec) = dev.binfo()?;
        let size = ncyl * nsec;
        let mut sb = Superblock {
            magic: MAGIC,
            size,
            nblocks: 0,
            ninodes,
            inodestart: 1,
            bmapstart: 0,
        };
        sb.bmapstart = 1 + sb.inode_blocks();
        let nmeta = sb.meta_blocks();
        sb.nblocks = size - nmeta;
        sb.write_to(dev)?;

        // Mark the first `nmeta` blocks in use in the bitmap.
        let bitmap_blocks = sb.bitmap_blocks();
        for block_idx in 0..bitmap_blocks {
            let base = block_idx as usize * BPB;
            let mut buf = [0u8; BSIZE];
            for bit in 0..BPB {
                let b = base + bit;
                if b < nmeta as usize {
                    buf[bit / 8] |= 1 << (bit % 8);
                }
            }
            dev.bwrite(sb.bmapstart + block_idx, &buf)?;
        }
        Ok(sb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myfs_block::MemBlockDevice;

    #[test]
    fn format_sets_magic_and_meta_range() {
        let mut dev = MemBlockDevice::new(4, 64);
        let sb = Superblock::format(&mut dev, 1024).unwrap();
        assert!(sb.is_formatted());
        assert_eq!(sb.size, 256);
        assert_eq!(sb.inodestart, 1);

        let loaded = Superblock::load(&mut dev).unwrap();
        assert_eq!(loaded, sb);
    }

    #[test]
    fn unformatted_device_has_wrong_magic() {
        let mut dev = MemBlockDevice::new(4, 64);
        let sb = Superblock::load(&mut dev).unwrap();
        assert!(!sb.is_formatted());
    }
}
