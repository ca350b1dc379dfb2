//! End-to-end scenarios against a fresh in-memory device, exercising the
//! public `Filesystem` facade the way a dispatcher would: login, format,
//! create, navigate, read/write, and the permission/error paths a client
//! actually hits.

use myfs_block::MemBlockDevice;
use myfs_core::{
    error::Error,
    fs::{Filesystem, Session},
};

fn fresh() -> Filesystem<MemBlockDevice> {
    Filesystem::open(MemBlockDevice::new(8, 128)).unwrap()
}

fn logged_in(uid: u16) -> Session {
    let mut session = Session::new();
    Filesystem::<MemBlockDevice>::login(&mut session, uid).unwrap();
    session
}

#[test]
fn format_then_create_write_read() {
    let mut fs = fresh();
    let mut session = logged_in(1);
    assert!(!fs.is_formatted());
    fs.format(1024, &mut session).unwrap();
    assert!(fs.is_formatted());

    fs.mk(&session, "greeting", None).unwrap();
    fs.write(&session, "greeting", 5, b"howdy").unwrap();
    assert_eq!(fs.cat(&session, "greeting").unwrap(), b"howdy");

    let rows = fs.ls(&session).unwrap();
    let row = rows.iter().find(|r| r.name == "greeting").unwrap();
    assert!(!row.is_dir);
    assert_eq!(row.size, 5);
    assert_eq!(row.uid, 1);
}

#[test]
fn directory_navigation_across_levels() {
    let mut fs = fresh();
    let mut session = logged_in(1);
    fs.format(1024, &mut session).unwrap();

    fs.mkdir(&session, "a", None).unwrap();
    fs.cd(&mut session, "a").unwrap();
    fs.mkdir(&session, "b", None).unwrap();
    fs.cd(&mut session, "b").unwrap();
    fs.mk(&session, "leaf", None).unwrap();

    fs.cd(&mut session, "..").unwrap();
    let rows = fs.ls(&session).unwrap();
    assert!(rows.iter().any(|r| r.name == "leaf"));

    fs.cd(&mut session, "/").unwrap();
    let rows = fs.ls(&session).unwrap();
    assert!(rows.iter().any(|r| r.name == "a" && r.is_dir));
}

#[test]
fn rmdir_refuses_nonempty_directory() {
    let mut fs = fresh();
    let mut session = logged_in(1);
    fs.format(1024, &mut session).unwrap();

    fs.mkdir(&session, "full", None).unwrap();
    fs.cd(&mut session, "full").unwrap();
    fs.mk(&session, "inside", None).unwrap();
    fs.cd(&mut session, "..").unwrap();

    assert!(matches!(
        fs.rmdir(&session, "full"),
        Err(Error::DirectoryNotEmpty)
    ));

    fs.cd(&mut session, "full").unwrap();
    fs.rm(&session, "inside").unwrap();
    fs.cd(&mut session, "..").unwrap();
    fs.rmdir(&session, "full").unwrap();
    assert!(!fs.ls(&session).unwrap().iter().any(|r| r.name == "full"));
}

#[test]
fn insert_then_delete_reshapes_contents() {
    let mut fs = fresh();
    let mut session = logged_in(1);
    fs.format(1024, &mut session).unwrap();

    fs.mk(&session, "doc", None).unwrap();
    fs.write(&session, "doc", 11, b"hello world").unwrap();
    fs.insert(&session, "doc", 5, 1, b",").unwrap();
    assert_eq!(fs.cat(&session, "doc").unwrap(), b"hello, world");

    fs.delete_range(&session, "doc", 5, 2).unwrap();
    assert_eq!(fs.cat(&session, "doc").unwrap(), b"helloworld");
}

#[test]
fn permission_denied_across_users() {
    let mut fs = fresh();
    let mut owner = logged_in(1);
    fs.format(1024, &mut owner).unwrap();
    fs.mk(&owner, "private", Some(0b1000)).unwrap();

    let intruder = logged_in(2);
    assert!(matches!(
        fs.cat(&intruder, "private"),
        Err(Error::PermissionDenied)
    ));
    assert!(matches!(
        fs.write(&intruder, "private", 1, b"x"),
        Err(Error::PermissionDenied)
    ));
    assert_eq!(fs.cat(&owner, "private").unwrap(), b"");
}

#[test]
fn commands_before_format_report_not_formatted() {
    let mut fs = fresh();
    let session = logged_in(1);
    assert!(matches!(fs.ls(&session), Err(Error::NotFormatted)));
}

#[test]
fn rejects_duplicate_names_and_missing_files() {
    let mut fs = fresh();
    let mut session = logged_in(1);
    fs.format(1024, &mut session).unwrap();

    fs.mk(&session, "dup", None).unwrap();
    assert!(matches!(
        fs.mk(&session, "dup", None),
        Err(Error::AlreadyExists)
    ));
    assert!(matches!(fs.cat(&session, "missing"), Err(Error::NotFound)));
}
