//! Shared imports for the FUSE handler sub-modules.

pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};

pub use libc::{EACCES, EBADF, EIO, EISDIR, ENOENT, ENOTDIR, ENOTEMPTY, EPERM};

pub use std::collections::HashMap;
pub use std::ffi::OsStr;
pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use bytes::Bytes;
pub use url::Url;

pub use crate::api_client::Transport;
pub use crate::fs::error::FsError;
pub use crate::fs::inode::{FileSource, NodeKind};

pub use super::{OpenWriteFile, RdmFs, TTL};
