//! The `Filesystem` facade: one struct per open disk that owns the
//! superblock snapshot and exposes the high-level operations command
//! handlers call. [`Session`] is the per-connection state a dispatcher
//! keeps alongside it.

use crate::{
    alloc::{iget, iupdate},
    blockmap::{itest, itrunc, readi, writei},
    dirent::{delinum, findinum, icreate, is_empty_dir, is_name_valid, live_entries},
    error::{Error, Result},
    inode::{FileType, Inode},
    perm::{can_read, can_write},
    superblock::Superblock,
};
use log::info;
use myfs_block::BlockDevice;

/// Per-connection state: current directory and logged-in user.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub pwd: u32,
    pub uid: u16,
}

impl Session {
    pub fn new() -> Self {
        Session { pwd: 0, uid: 0 }
    }

    pub fn is_logged_in(&self) -> bool {
        self.uid != 0
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// One directory listing row, already resolved to display-ready fields.
pub struct ListEntry {
    pub is_dir: bool,
    pub mode: u8,
    pub uid: u16,
    pub mtime: u32,
    pub size: u32,
    pub name: String,
}

/// Owns the superblock snapshot for one open device and provides every
/// command operation against it. Does not own the [`Session`] — a
/// dispatcher holds one `Filesystem` shared across many sessions.
pub struct Filesystem<D: BlockDevice> {
    dev: D,
    superblock: Option<Superblock>,
}

const ROOT_MODE: u8 = 0b1111;
const DEFAULT_FILE_MODE: u8 = 0b1110;
const DEFAULT_DIR_MODE: u8 = 0b1110;

impl<D: BlockDevice> Filesystem<D> {
    /// Connects to `dev` and reads block 0. Does not format; callers check
    /// [`Filesystem::is_formatted`] and run [`Filesystem::format`] themselves.
    pub fn open(mut dev: D) -> Result<Self> {
        let sb = Superblock::load(&mut dev)?;
        let sb = if sb.is_formatted() { Some(sb) } else { None };
        Ok(Filesystem { dev, superblock: sb })
    }

    pub fn is_formatted(&self) -> bool {
        self.superblock.is_some()
    }

    fn sb(&self) -> Result<&Superblock> {
        self.superblock.as_ref().ok_or(Error::NotFormatted)
    }

    /// `f`: writes the superblock, creates the root directory (inode 0,
    /// mode `0b1111`, owned by uid 0), and resets `session.pwd` to 0.
    pub fn format(&mut self, ninodes: u32, session: &mut Session) -> Result<()> {
        let sb = Superblock::format(&mut self.dev, ninodes)?;
        let root = icreate(&mut self.dev, &sb, FileType::Dir, "", 0, 0, ROOT_MODE)?;
        debug_assert_eq!(root, 0);
        self.superblock = Some(sb);
        session.pwd = 0;
        info!("formatted device: {ninodes} inodes");
        Ok(())
    }

    fn get(&mut self, sb: &Superblock, inum: u32) -> Result<Inode> {
        iget(&mut self.dev, sb, inum)
    }

    /// `mk`/`mkdir` shared body.
    fn create(&mut self, session: &Session, ty: FileType, name: &str, mode: Option<u8>) -> Result<()> {
        let sb = *self.sb()?;
        if !is_name_valid(name) {
            return Err(Error::InvalidName);
        }
        let mut pwd = self.get(&sb, session.pwd)?;
        if !can_write(pwd.mode, pwd.uid, session.uid) {
            return Err(Error::PermissionDenied);
        }
        if findinum(&mut self.dev, &sb, &mut pwd, name)? != sb.ninodes {
            return Err(Error::AlreadyExists);
        }
        let mode = mode.unwrap_or(if ty == FileType::Dir { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE });
        icreate(&mut self.dev, &sb, ty, name, session.pwd, session.uid, mode)?;
        Ok(())
    }

    pub fn mk(&mut self, session: &Session, name: &str, mode: Option<u8>) -> Result<()> {
        self.create(session, FileType::File, name, mode)
    }

    pub fn mkdir(&mut self, session: &Session, name: &str, mode: Option<u8>) -> Result<()> {
        self.create(session, FileType::Dir, name, mode)
    }

    /// Resolves `name` within `session.pwd`, requiring it exist.
    fn lookup(&mut self, sb: &Superblock, session: &Session, name: &str) -> Result<Inode> {
        let mut pwd = self.get(sb, session.pwd)?;
        let inum = findinum(&mut self.dev, sb, &mut pwd, name)?;
        if inum == sb.ninodes {
            return Err(Error::NotFound);
        }
        self.get(sb, inum)
    }

    /// `rm`: must be a file, requires write on both the target and `pwd`.
    /// Decrements `nlink`; at 0, truncates and frees the inode slot by
    /// zeroing its type, so the bitmap never thinks a slot is occupied
    /// after its last link drops. Always removes the directory entry.
    pub fn rm(&mut self, session: &Session, name: &str) -> Result<()> {
        let sb = *self.sb()?;
        let mut ip = self.lookup(&sb, session, name)?;
        if !ip.is_file() {
            return Err(Error::NotAFile);
        }
        let mut pwd = self.get(&sb, session.pwd)?;
        if !can_write(pwd.mode, pwd.uid, session.uid) || !can_write(ip.mode, ip.uid, session.uid) {
            return Err(Error::PermissionDenied);
        }
        ip.nlink -= 1;
        if ip.nlink == 0 {
            itrunc(&mut self.dev, &sb, &mut ip)?;
            ip.file_type = FileType::Free;
        }
        iupdate(&mut self.dev, &sb, &mut ip)?;
        delinum(&mut self.dev, &sb, &mut pwd, ip.inum)
    }

    /// `rmdir`: must be a directory, must be empty, requires read+write on
    /// both target and `pwd`.
    pub fn rmdir(&mut self, session: &Session, name: &str) -> Result<()> {
        let sb = *self.sb()?;
        let mut ip = self.lookup(&sb, session, name)?;
        if !ip.is_dir() {
            return Err(Error::NotADirectory);
        }
        let mut pwd = self.get(&sb, session.pwd)?;
        let rw_pwd = can_read(pwd.mode, pwd.uid, session.uid) && can_write(pwd.mode, pwd.uid, session.uid);
        let rw_target = can_read(ip.mode, ip.uid, session.uid) && can_write(ip.mode, ip.uid, session.uid);
        if !rw_pwd || !rw_target {
            return Err(Error::PermissionDenied);
        }
        if !is_empty_dir(&mut self.dev, &sb, &mut ip)? {
            return Err(Error::DirectoryNotEmpty);
        }
        itrunc(&mut self.dev, &sb, &mut ip)?;
        ip.file_type = FileType::Free;
        ip.nlink = 0;
        iupdate(&mut self.dev, &sb, &mut ip)?;
        delinum(&mut self.dev, &sb, &mut pwd, ip.inum)
    }

    /// `cd <path>`: absolute if it starts with `/` (resets to root first),
    /// each component resolved via `findinum` then type-checked, requiring
    /// read on every traversed directory. On any failure `session.pwd` is
    /// restored to its value before the call.
    pub fn cd(&mut self, session: &mut Session, path: &str) -> Result<()> {
        let sb = *self.sb()?;
        let saved = session.pwd;
        let rest = if let Some(rest) = path.strip_prefix('/') {
            session.pwd = 0;
            rest
        } else {
            path
        };

        let result = self.cd_relative(&sb, session, rest);
        if result.is_err() {
            session.pwd = saved;
        }
        result
    }

    fn cd_relative(&mut self, sb: &Superblock, session: &mut Session, path: &str) -> Result<()> {
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let mut dir = self.get(sb, session.pwd)?;
            if !can_read(dir.mode, dir.uid, session.uid) {
                return Err(Error::PermissionDenied);
            }
            let inum = findinum(&mut self.dev, sb, &mut dir, component)?;
            if inum == sb.ninodes {
                return Err(Error::NotFound);
            }
            let next = self.get(sb, inum)?;
            if !next.is_dir() {
                return Err(Error::NotADirectory);
            }
            session.pwd = inum;
        }
        Ok(())
    }

    /// `ls`: non-tombstone, non-`.`/`..` entries sorted directories-first
    /// then by name. Requires read on `pwd`.
    pub fn ls(&mut self, session: &Session) -> Result<Vec<ListEntry>> {
        let sb = *self.sb()?;
        let mut pwd = self.get(&sb, session.pwd)?;
        if !can_read(pwd.mode, pwd.uid, session.uid) {
            return Err(Error::PermissionDenied);
        }
        let entries = live_entries(&mut self.dev, &sb, &mut pwd)?;
        let mut rows = Vec::with_capacity(entries.len());
        for de in entries {
            let ip = self.get(&sb, de.inum)?;
            rows.push(ListEntry {
                is_dir: ip.is_dir(),
                mode: ip.mode,
                uid: ip.uid,
                mtime: ip.mtime,
                size: ip.size,
                name: de.name().to_string(),
            });
        }
        rows.sort_by(|a, b| (!a.is_dir, &a.name).cmp(&(!b.is_dir, &b.name)));
        Ok(rows)
    }

    /// `cat <name>`: the raw file body. Requires read.
    pub fn cat(&mut self, session: &Session, name: &str) -> Result<Vec<u8>> {
        let sb = *self.sb()?;
        let mut ip = self.lookup(&sb, session, name)?;
        if !ip.is_file() {
            return Err(Error::NotAFile);
        }
        if !can_read(ip.mode, ip.uid, session.uid) {
            return Err(Error::PermissionDenied);
        }
        let mut buf = vec![0u8; ip.size as usize];
        readi(&mut self.dev, &sb, &mut ip, &mut buf, 0, ip.size)?;
        Ok(buf)
    }

    fn writable_file(&mut self, sb: &Superblock, session: &Session, name: &str) -> Result<Inode> {
        let ip = self.lookup(sb, session, name)?;
        if !ip.is_file() {
            return Err(Error::NotAFile);
        }
        if !can_write(ip.mode, ip.uid, session.uid) {
            return Err(Error::PermissionDenied);
        }
        Ok(ip)
    }

    /// `w <name> <len> <data>`: overwrites from offset 0 with `len` bytes
    /// of `data`, truncating (`iupdate` + `itest`) if that shrinks the file.
    pub fn write(&mut self, session: &Session, name: &str, len: u32, data: &[u8]) -> Result<()> {
        let sb = *self.sb()?;
        let mut ip = self.writable_file(&sb, session, name)?;
        let len = len.min(data.len() as u32);
        let shrinking = len < ip.size;
        writei(&mut self.dev, &sb, &mut ip, &data[..len as usize], 0, len)?;
        if shrinking {
            ip.size = len;
            iupdate(&mut self.dev, &sb, &mut ip)?;
            itest(&mut self.dev, &sb, &mut ip)?;
        }
        Ok(())
    }

    /// `i <name> <pos> <len> <data>`: insert. Appends if `pos >= size`;
    /// otherwise shifts the `[pos, size)` suffix right by `len` bytes first.
    pub fn insert(&mut self, session: &Session, name: &str, pos: u32, len: u32, data: &[u8]) -> Result<()> {
        let sb = *self.sb()?;
        let mut ip = self.writable_file(&sb, session, name)?;
        let len = len.min(data.len() as u32);
        if pos >= ip.size {
            writei(&mut self.dev, &sb, &mut ip, &data[..len as usize], ip.size, len)?;
            return Ok(());
        }
        let tail_len = ip.size - pos;
        let mut tail = vec![0u8; tail_len as usize];
        readi(&mut self.dev, &sb, &mut ip, &mut tail, pos, tail_len)?;
        writei(&mut self.dev, &sb, &mut ip, &data[..len as usize], pos, len)?;
        writei(&mut self.dev, &sb, &mut ip, &tail, pos + len, tail_len)?;
        Ok(())
    }

    /// `d <name> <pos> <len>`: delete. If `pos + len >= size`, truncates to
    /// `pos`; otherwise shifts `[pos+len, size)` left over `[pos, size-len)`.
    pub fn delete_range(&mut self, session: &Session, name: &str, pos: u32, len: u32) -> Result<()> {
        let sb = *self.sb()?;
        let mut ip = self.writable_file(&sb, session, name)?;
        if pos.checked_add(len).map(|e| e >= ip.size).unwrap_or(true) {
            ip.size = pos.min(ip.size);
            iupdate(&mut self.dev, &sb, &mut ip)?;
            return itest(&mut self.dev, &sb, &mut ip);
        }
        let move_len = ip.size - pos - len;
        let mut buf = vec![0u8; move_len as usize];
        readi(&mut self.dev, &sb, &mut ip, &mut buf, pos + len, move_len)?;
        writei(&mut self.dev, &sb, &mut ip, &buf, pos, move_len)?;
        ip.size = pos + move_len;
        iupdate(&mut self.dev, &sb, &mut ip)?;
        itest(&mut self.dev, &sb, &mut ip)
    }

    /// `login <uid>`: `1 <= uid < 1024`.
    pub fn login(session: &mut Session, uid: u16) -> Result<()> {
        if uid == 0 || uid >= 1024 {
            return Err(Error::InvalidUid);
        }
        session.uid = uid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myfs_block::MemBlockDevice;

    fn fs() -> (Filesystem<MemBlockDevice>, Session) {
        let dev = MemBlockDevice::new(8, 128);
        let mut fs = Filesystem::open(dev).unwrap();
        let mut session = Session::new();
        Filesystem::login(&mut session, 1).unwrap();
        fs.format(1024, &mut session).unwrap();
        (fs, session)
    }

    #[test]
    fn format_resets_pwd_and_creates_root() {
        let (mut fs, session) = fs();
        assert!(fs.is_formatted());
        assert_eq!(session.pwd, 0);
    }

    #[test]
    fn mk_then_ls_then_cat() {
        let (mut fs, session) = fs();
        fs.mk(&session, "hello", None).unwrap();
        fs.write(&session, "hello", 5, b"world").unwrap();
        let rows = fs.ls(&session).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "hello");
        assert_eq!(rows[0].size, 5);
        assert_eq!(fs.cat(&session, "hello").unwrap(), b"world");
    }

    #[test]
    fn directory_navigation() {
        let (mut fs, mut session) = fs();
        fs.mkdir(&session, "a", None).unwrap();
        fs.cd(&mut session, "a").unwrap();
        fs.mkdir(&session, "b", None).unwrap();
        fs.cd(&mut session, "/a/b").unwrap();
        fs.mk(&session, "x", None).unwrap();
        fs.cd(&mut session, "/").unwrap();
        let root_rows = fs.ls(&session).unwrap();
        assert_eq!(root_rows.len(), 1);
        assert_eq!(root_rows[0].name, "a");
    }

    #[test]
    fn cd_rolls_back_on_failure() {
        let (mut fs, mut session) = fs();
        session.pwd = 0;
        let err = fs.cd(&mut session, "nonexistent").unwrap_err();
        assert!(matches!(err, Error::NotFound));
        assert_eq!(session.pwd, 0);
    }

    #[test]
    fn rmdir_rejects_nonempty() {
        let (mut fs, mut session) = fs();
        fs.mkdir(&session, "d", None).unwrap();
        fs.cd(&mut session, "d").unwrap();
        fs.mk(&session, "inner", None).unwrap();
        fs.cd(&mut session, "..").unwrap();
        assert!(matches!(fs.rmdir(&session, "d"), Err(Error::DirectoryNotEmpty)));
    }

    #[test]
    fn insert_then_delete() {
        let (mut fs, session) = fs();
        fs.mk(&session, "t", None).unwrap();
        fs.write(&session, "t", 5, b"hello").unwrap();
        fs.insert(&session, "t", 2, 3, b"XYZ").unwrap();
        assert_eq!(fs.cat(&session, "t").unwrap(), b"heXYZllo");
        fs.delete_range(&session, "t", 2, 3).unwrap();
        assert_eq!(fs.cat(&session, "t").unwrap(), b"hello");
    }

    #[test]
    fn permission_denied_across_users() {
        let (mut fs, mut session) = fs();
        fs.mk(&session, "s", None).unwrap();
        Filesystem::login(&mut session, 2).unwrap();
        assert!(matches!(
            fs.write(&session, "s", 1, b"x"),
            Err(Error::PermissionDenied)
        ));
    }

    #[test]
    fn rm_frees_inode_slot_when_nlink_hits_zero() {
        let (mut fs, session) = fs();
        fs.mk(&session, "foo", None).unwrap();
        let sb = *fs.sb().unwrap();
        let mut pwd = fs.get(&sb, session.pwd).unwrap();
        let inum = findinum(&mut fs.dev, &sb, &mut pwd, "foo").unwrap();
        fs.rm(&session, "foo").unwrap();
        assert_eq!(findinum(&mut fs.dev, &sb, &mut pwd, "foo").unwrap(), sb.ninodes);
        assert!(matches!(fs.get(&sb, inum), Err(Error::NotFound)));
    }

    #[test]
    fn login_rejects_uid_zero_and_out_of_range() {
        let mut session = Session::new();
        assert!(Filesystem::login(&mut session, 0).is_err());
        assert!(Filesystem::login(&mut session, 1024).is_err());
        assert!(Filesystem::login(&mut session, 5).is_ok());
    }
}
