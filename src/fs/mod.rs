//! FUSE layer for the mounted research-data hierarchy.
//!
//! [`RdmFs`] holds the filesystem state: the inode registry, the
//! current-thread Tokio runtime that drives the async core from the
//! synchronous FUSE callbacks, and the per-handle write buffers. The
//! `impl Filesystem` block is a dispatcher; the actual handlers live in the
//! sub-modules (`attr`, `read`, `write`, `create`, `delete`, `rename`).

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::time::Duration;

use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};

use crate::api_client::Transport;
use crate::config::{CacheConfig, MountConfig};
use crate::fs::inodes::Inodes;
use crate::whitelist::Whitelist;

pub mod cache;
pub mod error;
pub mod inode;
pub mod inodes;
pub mod prelude;

mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;

/// TTL handed to the kernel for entry and attribute replies. Kept short;
/// the interesting caching happens in the inode layer.
pub const TTL: Duration = Duration::from_secs(1);

/// In-memory buffer for a file handle opened with write access. Blocks are
/// keyed by their offset and assembled into one body on `release`.
pub struct OpenWriteFile {
    pub(crate) ino: u64,
    pub(crate) buffer: HashMap<i64, Vec<u8>>,
}

pub struct RdmFs<T: Transport> {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) inodes: Inodes<T>,
    pub(crate) mount: MountConfig,
    pub(crate) whitelist: Option<Whitelist>,
    pub(crate) open_files: HashMap<u64, OpenWriteFile>,
    pub(crate) next_fh: u64,
}

impl<T: Transport> RdmFs<T> {
    pub fn new(
        client: T,
        project: Option<String>,
        list_all_projects: bool,
        cache: CacheConfig,
        mount: MountConfig,
        whitelist: Option<Whitelist>,
    ) -> io::Result<Self> {
        // One task at a time: core state is only ever mutated from this
        // runtime via block_on.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            inodes: Inodes::new(client, project, list_all_projects, cache),
            mount,
            whitelist,
            open_files: HashMap::new(),
            next_fh: 1,
        })
    }

    pub(crate) fn writable(whitelist: Option<&Whitelist>, display_path: &str) -> bool {
        whitelist.is_none_or(|list| list.allows(display_path))
    }
}

impl<T: Transport> Filesystem for RdmFs<T> {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(self, req, parent, name, reply);
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        attr::getattr(self, req, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(
            self, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn readdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        reply: ReplyDirectory,
    ) {
        read::readdir(self, req, ino, fh, offset, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(self, req, ino, flags, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        read::read(self, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        write::write(self, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(self, req, ino, fh, lock_owner, reply);
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        write::release(self, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        create::create(self, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        create::mkdir(self, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(self, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(self, req, parent, name, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        rename::rename(self, req, parent, name, newparent, newname, flags, reply);
    }
}
