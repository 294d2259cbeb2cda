use super::prelude::*;

use tracing::debug;

use super::attr;

/// FUSE `create`: registers a placeholder inode for the promised file and
/// hands out a write handle. The remote object comes into existence when
/// the handle is released.
#[allow(clippy::too_many_arguments)]
pub(super) fn create<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    _flags: i32,
    reply: ReplyCreate,
) {
    let Some(name) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let RdmFs {
        runtime,
        inodes,
        mount,
        whitelist,
        open_files,
        next_fh,
    } = fs;

    match runtime.block_on(inodes.get(parent)) {
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
    let target = {
        let Some(node) = inodes.node(parent) else {
            reply.error(ENOENT);
            return;
        };
        if !node.can_create() {
            reply.error(EACCES);
            return;
        }
        format!("{}{}", inodes.entries().display_path(node), name)
    };
    if !RdmFs::<T>::writable(whitelist.as_ref(), &target) {
        debug!(path = %target, "create rejected by whitelist");
        reply.error(EACCES);
        return;
    }

    let ino = match runtime.block_on(inodes.register(parent, name)) {
        Ok(ino) => ino,
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    };

    let fh = *next_fh;
    *next_fh += 1;
    open_files.insert(
        fh,
        OpenWriteFile {
            ino,
            buffer: HashMap::new(),
        },
    );

    match attr::build_attr(inodes, mount, whitelist.as_ref(), ino) {
        Some(attr) => reply.created(&TTL, &attr, 0, fh, 0),
        None => reply.error(ENOENT),
    }
}

/// FUSE `mkdir`: creates the folder through the parent's new-folder link,
/// then drops the parent listing so the fresh entry resolves.
pub(super) fn mkdir<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    reply: ReplyEntry,
) {
    let Some(name) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let RdmFs {
        runtime,
        inodes,
        mount,
        whitelist,
        ..
    } = fs;

    match runtime.block_on(inodes.get(parent)) {
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
    let (target, new_folder_url) = {
        let Some(node) = inodes.node(parent) else {
            reply.error(ENOENT);
            return;
        };
        if !node.can_create() {
            reply.error(EACCES);
            return;
        }
        let url = match &node.kind {
            NodeKind::Storage(storage) => storage.storage.new_folder_url.clone(),
            NodeKind::Folder(folder) => folder.latest().new_folder_url.clone(),
            _ => None,
        };
        (
            format!("{}{}/", inodes.entries().display_path(node), name),
            url,
        )
    };
    if !RdmFs::<T>::writable(whitelist.as_ref(), &target) {
        debug!(path = %target, "mkdir rejected by whitelist");
        reply.error(EACCES);
        return;
    }
    let Some(mut url) = new_folder_url else {
        reply.error(EACCES);
        return;
    };
    if !url.query_pairs().any(|(key, _)| key == "kind") {
        url.query_pairs_mut().append_pair("kind", "folder");
    }
    url.query_pairs_mut().append_pair("name", name);

    let result = runtime.block_on(async {
        inodes.client().put_bytes(&url, Bytes::new()).await?;
        Ok::<(), FsError>(())
    });
    if let Err(err) = result {
        reply.error(err.errno());
        return;
    }

    // The cached listing predates the new folder.
    if let Err(err) = inodes.invalidate(parent, None) {
        reply.error(err.errno());
        return;
    }
    let resolved = runtime.block_on(inodes.find_by_name(parent, name));
    match resolved {
        Ok(Some(ino)) => match attr::build_attr(inodes, mount, whitelist.as_ref(), ino) {
            Some(attr) => reply.entry(&TTL, &attr, 0),
            None => reply.error(ENOENT),
        },
        Ok(None) => reply.error(ENOENT),
        Err(err) => reply.error(err.errno()),
    }
}
