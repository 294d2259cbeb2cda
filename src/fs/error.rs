//! Error kinds raised by the filesystem core.
//!
//! Every variant maps to an errno through [`FsError::errno`]; the FUSE
//! handlers reply with that code so no error is fatal for the mount.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("object not found")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("unknown inode {0}")]
    UnknownInode(u64),

    #[error("inode number pool exhausted")]
    OutOfInodes,

    #[error("entry is read-only")]
    ReadOnly,

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("server returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FsError {
    pub fn errno(&self) -> libc::c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::UnknownInode(_) => libc::ENOENT,
            FsError::OutOfInodes => libc::ENOSPC,
            FsError::ReadOnly => libc::EACCES,
            FsError::InvalidResponse(_) => libc::EIO,
            FsError::Status { status, .. } if *status == 404 => libc::ENOENT,
            FsError::Status { .. } => libc::EIO,
            FsError::Transport(_) => libc::EIO,
        }
    }
}
