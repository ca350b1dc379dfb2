//! Logical-to-physical block translation and byte-range I/O on an inode's
//! content, plus truncation and post-shrink block recycling.

use crate::{
    alloc::{balloc, bfree},
    error::{Error, Result},
    inode::Inode,
    layout::{APB, MAXFILEB, NDIRECT},
    superblock::Superblock,
};
use myfs_block::{BlockDevice, BSIZE};

fn read_addrs(dev: &mut impl BlockDevice, bno: u32) -> Result<[u32; APB]> {
    let buf = dev.bread(bno)?;
    let mut addrs = [0u32; APB];
    for (i, chunk) in buf.chunks_exact(4).enumerate() {
        addrs[i] = u32::from_le_bytes(chunk.try_into().unwrap());
    }
    Ok(addrs)
}

fn write_addrs(dev: &mut impl BlockDevice, bno: u32, addrs: &[u32; APB]) -> Result<()> {
    let mut buf = [0u8; BSIZE];
    for (i, a) in addrs.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&a.to_le_bytes());
    }
    dev.bwrite(bno, &buf)?;
    Ok(())
}

/// Translates logical block index `bn` into a physical block number,
/// lazily allocating any missing level (direct slot, single-indirect block,
/// or double-indirect block/second-level block) along the way. Never
/// touches `ip.blocks`; `writei` is responsible for that. Returns `0` when
/// `bn` is beyond `MAXFILEB` (over-limit).
pub fn bmap(dev: &mut impl BlockDevice, sb: &Superblock, ip: &mut Inode, bn: usize) -> Result<u32> {
    if bn < NDIRECT {
        if ip.addrs[bn] == 0 {
            ip.addrs[bn] = balloc(dev, sb)?;
        }
        return Ok(ip.addrs[bn]);
    }
    if bn < NDIRECT + APB {
        let idx = bn - NDIRECT;
        if ip.addrs[NDIRECT] == 0 {
            ip.addrs[NDIRECT] = balloc(dev, sb)?;
        }
        let saddr = ip.addrs[NDIRECT];
        let mut addrs = read_addrs(dev, saddr)?;
        if addrs[idx] == 0 {
            addrs[idx] = balloc(dev, sb)?;
            write_addrs(dev, saddr, &addrs)?;
        }
        return Ok(addrs[idx]);
    }
    if bn < MAXFILEB {
        let k = bn - NDIRECT - APB;
        let (a, b) = (k / APB, k % APB);
        if ip.addrs[NDIRECT + 1] == 0 {
            ip.addrs[NDIRECT + 1] = balloc(dev, sb)?;
        }
        let daddr = ip.addrs[NDIRECT + 1];
        let mut l1 = read_addrs(dev, daddr)?;
        if l1[a] == 0 {
            l1[a] = balloc(dev, sb)?;
            write_addrs(dev, daddr, &l1)?;
        }
        let saddr = l1[a];
        let mut l2 = read_addrs(dev, saddr)?;
        if l2[b] == 0 {
            l2[b] = balloc(dev, sb)?;
            write_addrs(dev, saddr, &l2)?;
        }
        return Ok(l2[b]);
    }
    log::warn!("bmap: logical block {bn} beyond MAXFILEB");
    Ok(0)
}

/// Reads up to `n` bytes starting at `off`, clamped to `[off, size)`.
pub fn readi(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    ip: &mut Inode,
    dst: &mut [u8],
    off: u32,
    n: u32,
) -> Result<u32> {
    if off > ip.size || off.checked_add(n).is_none() {
        return Err(Error::InvalidRange);
    }
    let n = n.min(ip.size - off);
    let mut tot = 0u32;
    while tot < n {
        let cur = off + tot;
        let block = bmap(dev, sb, ip, (cur / BSIZE as u32) as usize)?;
        let buf = dev.bread(block)?;
        let within = (cur % BSIZE as u32) as usize;
        let m = (n - tot).min((BSIZE - within) as u32);
        dst[tot as usize..(tot + m) as usize].copy_from_slice(&buf[within..within + m as usize]);
        tot += m;
    }
    Ok(n)
}

/// Writes `n` bytes from `src` at `off`. May grow `size`/`blocks`; always
/// refreshes `mtime` via [`crate::alloc::iupdate`] when it writes anything.
pub fn writei(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    ip: &mut Inode,
    src: &[u8],
    off: u32,
    n: u32,
) -> Result<u32> {
    if off > ip.size || off.checked_add(n).is_none() {
        return Err(Error::InvalidRange);
    }
    if (off as u64) + (n as u64) > (MAXFILEB as u64) * (BSIZE as u64) {
        return Err(Error::InvalidRange);
    }
    let mut tot = 0u32;
    while tot < n {
        let cur = off + tot;
        let block = bmap(dev, sb, ip, (cur / BSIZE as u32) as usize)?;
        let mut buf = dev.bread(block)?;
        let within = (cur % BSIZE as u32) as usize;
        let m = (n - tot).min((BSIZE - within) as u32);
        buf[within..within + m as usize].copy_from_slice(&src[tot as usize..(tot + m) as usize]);
        dev.bwrite(block, &buf)?;
        tot += m;
    }
    if n > 0 && off + n > ip.size {
        ip.size = off + n;
        let needed_blocks = (ip.size as u64).div_ceil(BSIZE as u64) as u32;
        ip.blocks = ip.blocks.max(needed_blocks);
    }
    if n > 0 {
        crate::alloc::iupdate(dev, sb, ip)?;
    }
    Ok(n)
}

/// Frees every data block reachable from `ip`'s address array (direct,
/// single-indirect, double-indirect, in that order), zeroes the address
/// slots, resets `size`/`blocks`, and writes the inode back.
pub fn itrunc(dev: &mut impl BlockDevice, sb: &Superblock, ip: &mut Inode) -> Result<()> {
    for i in 0..NDIRECT {
        if ip.addrs[i] != 0 {
            bfree(dev, sb, ip.addrs[i])?;
            ip.addrs[i] = 0;
        }
    }
    if ip.addrs[NDIRECT] != 0 {
        let addrs = read_addrs(dev, ip.addrs[NDIRECT])?;
        for a in addrs {
            if a != 0 {
                bfree(dev, sb, a)?;
            }
        }
        bfree(dev, sb, ip.addrs[NDIRECT])?;
        ip.addrs[NDIRECT] = 0;
    }
    if ip.addrs[NDIRECT + 1] != 0 {
        let l1 = read_addrs(dev, ip.addrs[NDIRECT + 1])?;
        for a in l1 {
            if a != 0 {
                let l2 = read_addrs(dev, a)?;
                for b in l2 {
                    if b != 0 {
                        bfree(dev, sb, b)?;
                    }
                }
                bfree(dev, sb, a)?;
            }
        }
        bfree(dev, sb, ip.addrs[NDIRECT + 1])?;
        ip.addrs[NDIRECT + 1] = 0;
    }
    ip.size = 0;
    ip.blocks = 0;
    crate::alloc::iupdate(dev, sb, ip)
}

/// Post-shrink recycling: if the blocks truly needed to hold `size` bytes
/// have dropped to half (or less) of `ip.blocks`, frees the trailing,
/// now-unreachable-by-size blocks and writes the inode back.
///
/// This only ever runs after `w`/`d` shrink a file. `rm`/`rmdir` call
/// `itrunc` directly, which already frees everything, so there is nothing
/// left for `itest` to recycle there.
pub fn itest(dev: &mut impl BlockDevice, sb: &Superblock, ip: &mut Inode) -> Result<()> {
    let true_blocks = (ip.size as u64).div_ceil(BSIZE as u64) as u32;
    if true_blocks > ip.blocks / 2 {
        return Ok(());
    }
    // Free indices [true_blocks + 1, blocks - 1], keeping index `true_blocks`
    // itself — one spare block past what `size` strictly needs.
    let mut bn = ip.blocks;
    while bn > true_blocks + 1 {
        bn -= 1;
        let block = bmap(dev, sb, ip, bn as usize)?;
        if block != 0 {
            bfree(dev, sb, block)?;
        }
        clear_addr_slot(dev, sb, ip, bn as usize)?;
    }
    ip.blocks = true_blocks + 1;
    crate::alloc::iupdate(dev, sb, ip)
}

/// Zeroes the address slot that maps to logical block `bn`, without
/// freeing the index blocks themselves even if they become empty — matching
/// `itrunc`'s coarser, all-or-nothing recycling of index blocks.
fn clear_addr_slot(dev: &mut impl BlockDevice, sb: &Superblock, ip: &mut Inode, bn: usize) -> Result<()> {
    if bn < NDIRECT {
        ip.addrs[bn] = 0;
        return Ok(());
    }
    if bn < NDIRECT + APB {
        let idx = bn - NDIRECT;
        let saddr = ip.addrs[NDIRECT];
        if saddr == 0 {
            return Ok(());
        }
        let mut addrs = read_addrs(dev, saddr)?;
        addrs[idx] = 0;
        write_addrs(dev, saddr, &addrs)?;
        return Ok(());
    }
    let k = bn - NDIRECT - APB;
    let (a, b) = (k / APB, k % APB);
    let daddr = ip.addrs[NDIRECT + 1];
    if daddr == 0 {
        return Ok(());
    }
    let l1 = read_addrs(dev, daddr)?;
    if l1[a] == 0 {
        return Ok(());
    }
    let mut l2 = read_addrs(dev, l1[a])?;
    l2[b] = 0;
    write_addrs(dev, l1[a], &l2)?;
    Ok(())
}
