use super::prelude::*;

use chrono::DateTime;

use crate::config::MountConfig;
use crate::fs::inodes::Inodes;
use crate::whitelist::Whitelist;

/// Builds the kernel-facing attributes from an inode's capability surface.
///
/// Sizes and timestamps come from the entity; modes, owner and group from
/// the mount options. Write bits are masked for the read-only virtual
/// attributes file and for paths outside the writable whitelist.
pub(super) fn build_attr<T: Transport>(
    inodes: &Inodes<T>,
    mount: &MountConfig,
    whitelist: Option<&Whitelist>,
    ino: u64,
) -> Option<FileAttr> {
    let node = inodes.node(ino)?;
    if node.removed {
        return None;
    }
    let table = inodes.entries();
    let is_dir = node.has_children();
    let size = if is_dir {
        0
    } else {
        table
            .size(node)
            .and_then(|value| value.as_bytes())
            .unwrap_or(0)
    };
    let mtime = parse_timestamp(table.date_modified(node).as_deref());
    let crtime = parse_timestamp(table.date_created(node).as_deref());
    let mut perm = if is_dir { mount.dir_mode } else { mount.file_mode };
    if node.read_only() || !RdmFs::<T>::writable(whitelist, &table.display_path(node)) {
        perm &= !0o222;
    }
    Some(FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime,
        kind: if is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        },
        perm,
        nlink: if is_dir { 2 } else { 1 },
        uid: mount.uid,
        gid: mount.gid,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    })
}

fn parse_timestamp(value: Option<&str>) -> SystemTime {
    value
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .and_then(|stamp| {
            let secs = u64::try_from(stamp.timestamp()).ok()?;
            Some(UNIX_EPOCH + Duration::new(secs, stamp.timestamp_subsec_nanos()))
        })
        .unwrap_or(UNIX_EPOCH)
}

/// The getattr path drives the lazy attribute refresh of the inode layer.
pub(super) fn getattr<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    ino: u64,
    reply: ReplyAttr,
) {
    let RdmFs {
        runtime,
        inodes,
        mount,
        whitelist,
        ..
    } = fs;
    let result = runtime.block_on(async {
        if inodes.get(ino).await?.is_none() {
            return Err(FsError::NotFound);
        }
        inodes.refresh(ino, false).await
    });
    if let Err(err) = result {
        reply.error(err.errno());
        return;
    }
    match build_attr(inodes, mount, whitelist.as_ref(), ino) {
        Some(attr) => reply.attr(&TTL, &attr),
        None => reply.error(ENOENT),
    }
}

/// Only size changes are meaningful here: content is buffered locally and
/// uploaded on release, so a truncate just adjusts the reported size.
/// Mode/owner changes have no remote counterpart and are ignored.
#[allow(clippy::too_many_arguments)]
pub(super) fn setattr<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    ino: u64,
    _mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
    _atime: Option<TimeOrNow>,
    _mtime: Option<TimeOrNow>,
    _ctime: Option<SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<SystemTime>,
    _chgtime: Option<SystemTime>,
    _bkuptime: Option<SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    let RdmFs {
        runtime,
        inodes,
        mount,
        whitelist,
        ..
    } = fs;
    let known = runtime.block_on(inodes.get(ino));
    match known {
        Ok(Some(_)) => {}
        Ok(None) => {
            reply.error(ENOENT);
            return;
        }
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    }
    match build_attr(inodes, mount, whitelist.as_ref(), ino) {
        Some(mut attr) => {
            if let Some(size) = size {
                attr.size = size;
                attr.blocks = size.div_ceil(512);
            }
            reply.attr(&TTL, &attr)
        }
        None => reply.error(ENOENT),
    }
}
