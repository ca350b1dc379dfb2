//! Block bitmap and inode-table allocation.

use crate::{
    error::{Error, Result},
    inode::{Dinode, FileType, Inode},
    layout::{BPB, IPB},
    superblock::Superblock,
};
use binrw::{BinRead, BinWrite};
use log::warn;
use myfs_block::{BlockDevice, BSIZE};
use std::io::Cursor;

/// Block containing the bitmap bit for data block `b`.
fn bblock(sb: &Superblock, b: u32) -> u32 {
    b / BPB as u32 + sb.bmapstart
}

/// Block containing inode `i`'s dinode record.
fn iblock(sb: &Superblock, i: u32) -> u32 {
    i / IPB as u32 + sb.inodestart
}

fn zero_block(dev: &mut impl BlockDevice, bno: u32) -> Result<()> {
    dev.bwrite(bno, &[0u8; BSIZE])?;
    Ok(())
}

/// Scans the bitmap for the first free bit, marks it used, zeroes the
/// corresponding data block (callers rely on freshly allocated indirect
/// blocks being all-zero), and returns its block number. Returns `0` — never
/// a valid data block — when the device is full.
pub fn balloc(dev: &mut impl BlockDevice, sb: &Superblock) -> Result<u32> {
    let mut i = 0u32;
    while i < sb.size {
        let mut buf = dev.bread(bblock(sb, i))?;
        let remaining = (sb.size - i) as usize;
        let span = BPB.min(remaining);
        for bit in 0..span {
            let byte = bit / 8;
            let mask = 1u8 << (bit % 8);
            if buf[byte] & mask == 0 {
                buf[byte] |= mask;
                let bno = i + bit as u32;
                dev.bwrite(bblock(sb, i), &buf)?;
                zero_block(dev, bno)?;
                return Ok(bno);
            }
        }
        i += BPB as u32;
    }
    warn!("balloc: out of blocks");
    Ok(0)
}

/// Clears the bitmap bit for `bno`. Freeing an already-free block is logged
/// but not an error.
pub fn bfree(dev: &mut impl BlockDevice, sb: &Superblock, bno: u32) -> Result<()> {
    let mut buf = dev.bread(bblock(sb, bno))?;
    let i = bno % BPB as u32;
    let byte = (i / 8) as usize;
    let mask = 1u8 << (i % 8);
    if buf[byte] & mask == 0 {
        warn!("bfree: freeing already-free block {bno}");
    }
    buf[byte] &= !mask;
    dev.bwrite(bblock(sb, bno), &buf)?;
    Ok(())
}

fn read_dinodes(dev: &mut impl BlockDevice, blk: u32) -> Result<Vec<Dinode>> {
    let buf = dev.bread(blk)?;
    let mut cursor = Cursor::new(&buf[..]);
    let mut out = Vec::with_capacity(IPB);
    for _ in 0..IPB {
        out.push(Dinode::read(&mut cursor).expect("inode block always holds IPB dinodes"));
    }
    Ok(out)
}

fn write_dinodes(dev: &mut impl BlockDevice, blk: u32, dinodes: &[Dinode]) -> Result<()> {
    let mut buf = [0u8; BSIZE];
    {
        let mut cursor = Cursor::new(&mut buf[..]);
        for d in dinodes {
            d.write(&mut cursor).expect("IPB dinodes always fit in one block");
        }
    }
    dev.bwrite(blk, &buf)?;
    Ok(())
}

/// Scans the inode table for the first free slot, marks it with `ty`, and
/// returns a fresh in-memory handle. Out of inodes is a hard error for the
/// command (unlike `balloc`, which signals exhaustion through its return
/// value instead).
pub fn ialloc(dev: &mut impl BlockDevice, sb: &Superblock, ty: FileType) -> Result<Inode> {
    for inum in 0..sb.ninodes {
        let blk = iblock(sb, inum);
        let mut dinodes = read_dinodes(dev, blk)?;
        let slot = (inum % IPB as u32) as usize;
        if dinodes[slot].file_type() == FileType::Free {
            dinodes[slot] = Dinode::zeroed();
            dinodes[slot].set_fields(ty, 0, 0);
            write_dinodes(dev, blk, &dinodes)?;
            return Ok(Inode::from_dinode(inum, &dinodes[slot]));
        }
    }
    warn!("ialloc: no inodes available");
    Err(Error::NoSpace)
}

/// Reads inode `inum` and returns a detached snapshot. Fails if `inum` is out
/// of range or the slot is free.
pub fn iget(dev: &mut impl BlockDevice, sb: &Superblock, inum: u32) -> Result<Inode> {
    if inum >= sb.ninodes {
        warn!("iget: inum {inum} out of range");
        return Err(Error::NotFound);
    }
    let blk = iblock(sb, inum);
    let dinodes = read_dinodes(dev, blk)?;
    let slot = (inum % IPB as u32) as usize;
    if dinodes[slot].file_type() == FileType::Free {
        return Err(Error::NotFound);
    }
    Ok(Inode::from_dinode(inum, &dinodes[slot]))
}

/// Writes `ip` back to its inode-table slot, refreshing `mtime`.
pub fn iupdate(dev: &mut impl BlockDevice, sb: &Superblock, ip: &mut Inode) -> Result<()> {
    ip.mtime = crate::now();
    let blk = iblock(sb, ip.inum);
    let mut dinodes = read_dinodes(dev, blk)?;
    let slot = (ip.inum % IPB as u32) as usize;
    dinodes[slot] = ip.to_dinode();
    write_dinodes(dev, blk, &dinodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use myfs_block::MemBlockDevice;

    fn fmt() -> (MemBlockDevice, Superblock) {
        let mut dev = MemBlockDevice::new(4, 64);
        let sb = Superblock::format(&mut dev, 64).unwrap();
        (dev, sb)
    }

    #[test]
    fn balloc_then_bfree_reuses_block() {
        let (mut dev, sb) = fmt();
        let a = balloc(&mut dev, &sb).unwrap();
        assert_ne!(a, 0);
        bfree(&mut dev, &sb, a).unwrap();
        let b = balloc(&mut dev, &sb).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ialloc_finds_first_free_slot() {
        let (mut dev, sb) = fmt();
        let ip = ialloc(&mut dev, &sb, FileType::File).unwrap();
        assert_eq!(ip.file_type, FileType::File);
        let ip2 = iget(&mut dev, &sb, ip.inum).unwrap();
        assert_eq!(ip2.inum, ip.inum);
    }

    #[test]
    fn iget_rejects_free_slot() {
        let (mut dev, sb) = fmt();
        assert!(iget(&mut dev, &sb, 5).is_err());
    }

    #[test]
    fn iupdate_refreshes_mtime() {
        let (mut dev, sb) = fmt();
        let mut ip = ialloc(&mut dev, &sb, FileType::File).unwrap();
        ip.mtime = 0;
        iupdate(&mut dev, &sb, &mut ip).unwrap();
        assert!(ip.mtime > 0);
        let reloaded = iget(&mut dev, &sb, ip.inum).unwrap();
        assert_eq!(reloaded.mtime, ip.mtime);
    }
}
