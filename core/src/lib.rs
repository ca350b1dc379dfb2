//! The on-disk layout, allocator, and directory logic shared by every
//! front end that speaks the line-oriented protocol over a [`myfs_block`]
//! device. [`fs::Filesystem`] is the facade command handlers should use;
//! the other modules are building blocks it composes.

pub mod alloc;
pub mod blockmap;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod perm;
pub mod superblock;

pub use error::{Error, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, truncated to `u32` (matching the on-disk
/// `mtime` field's width; this filesystem does not survive past 2106).
pub(crate) fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as u32
}
