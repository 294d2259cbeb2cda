use super::prelude::*;

use tracing::debug;

/// FUSE `unlink`: deletes a file through its delete link and tombstones the
/// inode. A placeholder that never reached the remote is dropped locally.
pub(super) fn unlink<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    reply: ReplyEmpty,
) {
    let Some(name) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let RdmFs {
        runtime,
        inodes,
        whitelist,
        ..
    } = fs;

    let ino = match runtime.block_on(async {
        inodes.get(parent).await?;
        inodes.find_by_name(parent, name).await
    }) {
        Ok(Some(ino)) => ino,
        Ok(None) => {
            reply.error(ENOENT);
            return;
        }
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    };

    let plan = {
        let Some(node) = inodes.node(ino) else {
            reply.error(ENOENT);
            return;
        };
        let NodeKind::File(file) = &node.kind else {
            reply.error(EISDIR);
            return;
        };
        let display_path = inodes.entries().display_path(node);
        if !RdmFs::<T>::writable(whitelist.as_ref(), &display_path) {
            debug!(path = %display_path, "unlink rejected by whitelist");
            reply.error(EACCES);
            return;
        }
        if file.is_new() {
            None
        } else {
            match file.latest().and_then(|object| object.delete_url.clone()) {
                Some(url) => Some(url),
                None => {
                    reply.error(EACCES);
                    return;
                }
            }
        }
    };

    if let Some(url) = plan {
        if let Err(err) = runtime.block_on(inodes.client().delete(&url)) {
            reply.error(err.errno());
            return;
        }
    }
    inodes.mark_removed(ino);
    if let Err(err) = inodes.invalidate(parent, None) {
        reply.error(err.errno());
        return;
    }
    reply.ok();
}

/// FUSE `rmdir`: refuses to delete a non-empty folder, then behaves like
/// `unlink` for the folder object.
pub(super) fn rmdir<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    reply: ReplyEmpty,
) {
    let Some(name) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let RdmFs {
        runtime,
        inodes,
        whitelist,
        ..
    } = fs;

    let ino = match runtime.block_on(async {
        inodes.get(parent).await?;
        inodes.find_by_name(parent, name).await
    }) {
        Ok(Some(ino)) => ino,
        Ok(None) => {
            reply.error(ENOENT);
            return;
        }
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    };

    let delete_url = {
        let Some(node) = inodes.node(ino) else {
            reply.error(ENOENT);
            return;
        };
        let NodeKind::Folder(folder) = &node.kind else {
            reply.error(ENOTDIR);
            return;
        };
        let display_path = inodes.entries().display_path(node);
        if !RdmFs::<T>::writable(whitelist.as_ref(), &display_path) {
            debug!(path = %display_path, "rmdir rejected by whitelist");
            reply.error(EACCES);
            return;
        }
        match folder.latest().delete_url.clone() {
            Some(url) => url,
            None => {
                reply.error(EACCES);
                return;
            }
        }
    };

    let children = match runtime.block_on(inodes.children_of(ino)) {
        Ok(children) => children,
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    };
    let occupied = children
        .iter()
        .filter_map(|child| inodes.node(*child))
        .any(|node| !node.removed);
    if occupied {
        reply.error(ENOTEMPTY);
        return;
    }

    if let Err(err) = runtime.block_on(inodes.client().delete(&delete_url)) {
        reply.error(err.errno());
        return;
    }
    inodes.mark_removed(ino);
    if let Err(err) = inodes.invalidate(parent, None) {
        reply.error(err.errno());
        return;
    }
    reply.ok();
}
