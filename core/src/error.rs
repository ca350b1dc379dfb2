/// Failures a filesystem operation can report back to a session.
///
/// Every variant here corresponds to one of the `No <reason>` lines a
/// command can produce; the dispatcher renders these to the wire text, it
/// never has to invent its own strings. A [`myfs_block::Error`] bubbling up
/// through [`Error::Device`] is the one variant that is *not* meant to be
/// turned into a `No` response — it means the session itself is dead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid name!")]
    InvalidName,
    #[error("Not a file")]
    NotAFile,
    #[error("Not a directory")]
    NotADirectory,
    #[error("Not found!")]
    NotFound,
    #[error("Already exists!")]
    AlreadyExists,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Not formatted")]
    NotFormatted,
    #[error("Directory not empty!")]
    DirectoryNotEmpty,
    #[error("Invalid uid")]
    InvalidUid,
    #[error("invalid range")]
    InvalidRange,
    #[error("out of space")]
    NoSpace,
    #[error(transparent)]
    Device(#[from] myfs_block::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
