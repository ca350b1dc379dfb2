use std::io;

/// Failure talking to the backing block store.
///
/// Every variant here is fatal to the session that triggered it: there is
/// no retry at this layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying socket errored or was closed mid-exchange.
    #[error("block device I/O error: {0}")]
    Io(#[from] io::Error),
    /// The disk service answered something that doesn't parse as the
    /// expected response for the request we sent.
    #[error("malformed response from disk service: {0}")]
    Protocol(String),
    /// The disk service explicitly answered `No` to a read or write.
    #[error("disk service rejected the request: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
