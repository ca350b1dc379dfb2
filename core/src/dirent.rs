//! Directory entries and the operations that scan/mutate a directory's body.

use crate::{
    alloc::{iget, ialloc, iupdate},
    blockmap::{itest, readi, writei},
    error::Result,
    inode::{FileType, Inode},
    layout::MAXNAME,
    superblock::Superblock,
};
use binrw::{BinRead, BinWrite};
use myfs_block::BlockDevice;
use std::io::Cursor;

/// 16-byte directory entry. A tombstone is encoded as `inum == ninodes`
/// (the sentinel "not an inode" value, taken from the superblock's
/// configured inode count rather than a fixed constant).
#[derive(BinRead, BinWrite, Debug, Clone, Copy)]
#[brw(little)]
pub struct Dirent {
    pub inum: u32,
    name: [u8; MAXNAME],
}

impl Dirent {
    pub const SIZE: usize = 4 + MAXNAME;

    pub fn new(inum: u32, name: &str) -> Self {
        let mut buf = [0u8; MAXNAME];
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAXNAME - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Dirent { inum, name: buf }
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAXNAME);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn to_bytes(self) -> [u8; Dirent::SIZE] {
        let mut buf = [0u8; Dirent::SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        self.write(&mut cursor).expect("dirent fits in 16 bytes");
        buf
    }
}

/// Names must be non-empty, strictly shorter than [`MAXNAME`], must not
/// start with `.`, and must not equal `/`.
pub fn is_name_valid(name: &str) -> bool {
    if name.is_empty() || name.len() >= MAXNAME {
        return false;
    }
    if name.starts_with('.') {
        return false;
    }
    if name == "/" {
        return false;
    }
    true
}

fn read_dir_entries(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    dir: &mut Inode,
) -> Result<Vec<Dirent>> {
    let mut buf = vec![0u8; dir.size as usize];
    readi(dev, sb, dir, &mut buf, 0, dir.size)?;
    let mut out = Vec::with_capacity(buf.len() / Dirent::SIZE);
    let mut cursor = Cursor::new(&buf[..]);
    while (cursor.position() as usize) < buf.len() {
        out.push(Dirent::read(&mut cursor).expect("directory size is always a multiple of 16"));
    }
    Ok(out)
}

/// Linearly scans `dir`'s entries for a live (non-tombstone) entry named
/// `name`. Returns `sb.ninodes` (the sentinel) on a miss.
pub fn findinum(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    dir: &mut Inode,
    name: &str,
) -> Result<u32> {
    let entries = read_dir_entries(dev, sb, dir)?;
    for de in entries {
        if de.inum == sb.ninodes {
            continue;
        }
        if de.name() == name {
            return Ok(de.inum);
        }
    }
    Ok(sb.ninodes)
}

/// Marks every entry pointing at `inum` as a tombstone, then compacts the
/// directory if more than half its entries are now tombstones.
pub fn delinum(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    dir: &mut Inode,
    inum: u32,
) -> Result<()> {
    let entries = read_dir_entries(dev, sb, dir)?;
    for (i, de) in entries.iter().enumerate() {
        if de.inum == inum {
            let tombstone = Dirent::new(sb.ninodes, de.name());
            writei(
                dev,
                sb,
                dir,
                &tombstone.to_bytes(),
                (i * Dirent::SIZE) as u32,
                Dirent::SIZE as u32,
            )?;
            break;
        }
    }

    let entries = read_dir_entries(dev, sb, dir)?;
    let tombstones = entries.iter().filter(|de| de.inum == sb.ninodes).count();
    if entries.is_empty() || tombstones * 2 <= entries.len() {
        return Ok(());
    }
    let live: Vec<Dirent> = entries.into_iter().filter(|de| de.inum != sb.ninodes).collect();
    let mut packed = Vec::with_capacity(live.len() * Dirent::SIZE);
    for de in &live {
        packed.extend_from_slice(&de.to_bytes());
    }
    let new_size = (live.len() * Dirent::SIZE) as u32;
    writei(dev, sb, dir, &packed, 0, new_size)?;
    dir.size = new_size;
    iupdate(dev, sb, dir)?;
    itest(dev, sb, dir)
}

/// Appends one entry to `dir`'s body.
fn append_entry(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    dir: &mut Inode,
    inum: u32,
    name: &str,
) -> Result<()> {
    let entry = Dirent::new(inum, name);
    let off = dir.size;
    writei(dev, sb, dir, &entry.to_bytes(), off, Dirent::SIZE as u32)
}

/// Allocates an inode of `ty`, initializes it, and — unless it is the root
/// (`parent == ` the freshly allocated inum, i.e. its own parent) — appends
/// `(inum, name)` to `parent`'s directory. Directories get `.`/`..` written
/// as their first two entries.
pub fn icreate(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    ty: FileType,
    name: &str,
    parent: u32,
    uid: u16,
    mode: u8,
) -> Result<u32> {
    let mut ip = ialloc(dev, sb, ty)?;
    ip.mode = mode;
    ip.uid = uid;
    ip.nlink = 1;
    ip.mtime = crate::now();
    ip.size = 0;
    ip.blocks = 0;
    let inum = ip.inum;

    if ty == FileType::Dir {
        append_entry(dev, sb, &mut ip, inum, ".")?;
        append_entry(dev, sb, &mut ip, parent, "..")?;
    } else {
        iupdate(dev, sb, &mut ip)?;
    }

    if parent != inum {
        let mut parent_ip = iget(dev, sb, parent)?;
        append_entry(dev, sb, &mut parent_ip, inum, name)?;
    }
    Ok(inum)
}

/// `true` once only `.`/`..` (or nothing) remain among `dir`'s live entries.
pub fn is_empty_dir(dev: &mut impl BlockDevice, sb: &Superblock, dir: &mut Inode) -> Result<bool> {
    let entries = read_dir_entries(dev, sb, dir)?;
    Ok(entries.iter().all(|de| {
        de.inum == sb.ninodes || de.name() == "." || de.name() == ".."
    }))
}

/// Live (non-tombstone, non-`.`/`..`) entries, for `ls`.
pub fn live_entries(
    dev: &mut impl BlockDevice,
    sb: &Superblock,
    dir: &mut Inode,
) -> Result<Vec<Dirent>> {
    let entries = read_dir_entries(dev, sb, dir)?;
    Ok(entries
        .into_iter()
        .filter(|de| de.inum != sb.ninodes && de.name() != "." && de.name() != "..")
        .collect())
}
