//! Error type for filesystem operations.

use std::fmt;

#[derive(Debug)]
pub enum FsError {
    /// Path did not resolve to a file.
    NotFound(String),
    /// A path component other than the last is not a directory.
    NotADirectory(String),
    /// Target name already taken.
    Exists(String),
    /// No free pages left on the pack.
    DiskFull,
    /// A label or directory entry referenced a disk address outside the pack.
    BadDiskAddress(u16),
    /// A page chain did not behave (loop, page-number skip, wrong owner).
    BrokenChain { vda: u32 },
    /// File name longer than the leader page can hold.
    NameTooLong(String),
    /// The image did not contain a recognisable filesystem.
    NoFilesystem,
    Io(std::io::Error),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "file not found: {name}"),
            Self::NotADirectory(name) => write!(f, "not a directory: {name}"),
            Self::Exists(name) => write!(f, "already exists: {name}"),
            Self::DiskFull => write!(f, "no free pages"),
            Self::BadDiskAddress(rda) => write!(f, "bad disk address {rda:#08o}"),
            Self::BrokenChain { vda } => write!(f, "broken page chain at VDA {vda}"),
            Self::NameTooLong(name) => write!(f, "file name too long: {name}"),
            Self::NoFilesystem => write!(f, "image does not contain an Alto filesystem"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for FsError {}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
