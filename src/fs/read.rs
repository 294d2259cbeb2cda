use super::prelude::*;

use tracing::debug;

use super::attr;

/// FUSE `lookup`: resolves a name under a parent through the inode layer
/// and replies with the entry's attributes.
pub(super) fn lookup<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
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
    let result = runtime.block_on(async {
        inodes.get(parent).await?;
        inodes.find_by_name(parent, name).await
    });
    match result {
        Ok(Some(ino)) => match attr::build_attr(inodes, mount, whitelist.as_ref(), ino) {
            Some(attr) => reply.entry(&TTL, &attr, 0),
            None => reply.error(ENOENT),
        },
        Ok(None) => reply.error(ENOENT),
        Err(err) => reply.error(err.errno()),
    }
}

/// FUSE `readdir`: lists `.`/`..` followed by the materialized children,
/// resumable through the entry offset.
pub(super) fn readdir<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    mut reply: ReplyDirectory,
) {
    let RdmFs {
        runtime, inodes, ..
    } = fs;
    let result = runtime.block_on(async {
        inodes.get(ino).await?;
        inodes.children_of(ino).await
    });
    let children = match result {
        Ok(children) => children,
        Err(err) => {
            reply.error(err.errno());
            return;
        }
    };

    let parent_ino = inodes
        .node(ino)
        .and_then(|node| inodes.entries().parent_of(node))
        .unwrap_or(ino);
    let mut entries: Vec<(u64, FileType, String)> = vec![
        (ino, FileType::Directory, ".".to_owned()),
        (parent_ino, FileType::Directory, "..".to_owned()),
    ];
    for child in children {
        let node = match inodes.node(child) {
            Some(node) if !node.removed => node,
            _ => continue,
        };
        let kind = if node.has_children() {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        entries.push((child, kind, inodes.entries().name(node)));
    }

    for (index, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
        if reply.add(entry_ino, (index + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

/// FUSE `open`: read handles share the dummy handle 0; a write handle gets
/// an empty offset-keyed buffer that `release` uploads.
pub(super) fn open<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    ino: u64,
    flags: i32,
    reply: ReplyOpen,
) {
    let write_access = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
    if !write_access {
        reply.opened(0, 0);
        return;
    }

    let Some(node) = fs.inodes.node(ino) else {
        reply.error(ENOENT);
        return;
    };
    if node.read_only() {
        reply.error(EACCES);
        return;
    }
    if !matches!(node.kind, NodeKind::File(_)) {
        reply.error(EISDIR);
        return;
    }
    let display_path = fs.inodes.entries().display_path(node);
    if !RdmFs::<T>::writable(fs.whitelist.as_ref(), &display_path) {
        debug!(path = %display_path, "write rejected by whitelist");
        reply.error(EACCES);
        return;
    }

    let fh = fs.next_fh;
    fs.next_fh += 1;
    fs.open_files.insert(
        fh,
        OpenWriteFile {
            ino,
            buffer: HashMap::new(),
        },
    );
    reply.opened(fh, 0);
}

/// FUSE `read`: the virtual attributes file serializes fresh project
/// metadata; regular files stream through their download link. File bodies
/// are never cached locally.
#[allow(clippy::too_many_arguments)]
pub(super) fn read<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    enum ReadPlan {
        Attributes,
        Download(Url),
        Empty,
    }

    let RdmFs {
        runtime, inodes, ..
    } = fs;
    let plan = match inodes.node(ino) {
        None => {
            reply.error(ENOENT);
            return;
        }
        Some(node) => match &node.kind {
            NodeKind::ProjectAttributes(_) => ReadPlan::Attributes,
            // A placeholder has not been uploaded yet; nothing to read back.
            NodeKind::File(file) if file.is_new() => ReadPlan::Empty,
            NodeKind::File(file) => {
                match file.latest().and_then(|object| object.download_url.clone()) {
                    Some(url) => ReadPlan::Download(url),
                    None => {
                        reply.error(EIO);
                        return;
                    }
                }
            }
            _ => {
                reply.error(EISDIR);
                return;
            }
        },
    };
    match plan {
        ReadPlan::Attributes => match runtime.block_on(inodes.attributes_json(ino)) {
            Ok(content) => reply.data(slice_content(&content, offset, size)),
            Err(err) => reply.error(err.errno()),
        },
        ReadPlan::Download(url) => match runtime.block_on(inodes.client().get_bytes(&url)) {
            Ok(content) => reply.data(slice_content(&content, offset, size)),
            Err(err) => reply.error(err.errno()),
        },
        ReadPlan::Empty => reply.data(&[]),
    }
}

fn slice_content(content: &[u8], offset: i64, size: u32) -> &[u8] {
    let start = offset.max(0) as usize;
    if start >= content.len() {
        return &[];
    }
    let end = (start + size as usize).min(content.len());
    &content[start..end]
}
