use super::prelude::*;

use tracing::{debug, info};

/// FUSE `write`: data blocks land in the handle's in-memory buffer; the
/// remote object is only touched on `release`.
#[allow(clippy::too_many_arguments)]
pub(super) fn write<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    match fs.open_files.get_mut(&fh) {
        Some(open) => {
            open.buffer.insert(offset, data.to_vec());
            reply.written(data.len() as u32);
        }
        None => reply.error(EBADF),
    }
}

/// Uploads happen on `release`, not `flush`; editors call `flush` on every
/// `close(dup(fd))` and re-uploading each time would thrash the remote.
pub(super) fn flush<T: Transport>(
    _fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    _ino: u64,
    _fh: u64,
    _lock_owner: u64,
    reply: ReplyEmpty,
) {
    reply.ok();
}

/// FUSE `release`: assembles the buffered blocks over the previous content
/// and uploads the result, then invalidates the parent listing and the
/// file's attribute timer so the next lookup observes the persisted object.
#[allow(clippy::too_many_arguments)]
pub(super) fn release<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let Some(open) = fs.open_files.remove(&fh) else {
        // Read-only handle.
        reply.ok();
        return;
    };
    let ino = open.ino;

    let RdmFs {
        runtime, inodes, ..
    } = fs;
    let plan = {
        let Some(node) = inodes.node(ino) else {
            reply.error(ENOENT);
            return;
        };
        let NodeKind::File(file) = &node.kind else {
            reply.error(EISDIR);
            return;
        };
        match &file.file {
            FileSource::New { name } => {
                let parent = file.parent;
                let Some(base) = new_file_upload_url(inodes, parent) else {
                    reply.error(EACCES);
                    return;
                };
                let mut url = base;
                if !url.query_pairs().any(|(key, _)| key == "kind") {
                    url.query_pairs_mut().append_pair("kind", "file");
                }
                url.query_pairs_mut().append_pair("name", name);
                UploadPlan {
                    url,
                    parent,
                    download: None,
                }
            }
            FileSource::Remote(_) => {
                if open.buffer.is_empty() {
                    // Opened for write but nothing written; leave the
                    // remote content alone.
                    reply.ok();
                    return;
                }
                let latest = file.latest();
                let Some(url) = latest.and_then(|object| object.upload_url.clone()) else {
                    reply.error(EACCES);
                    return;
                };
                UploadPlan {
                    url,
                    parent: file.parent,
                    download: latest.and_then(|object| object.download_url.clone()),
                }
            }
        }
    };

    let result = runtime.block_on(async {
        // Partial writes overlay the existing content.
        let base = match (&plan.download, plan_has_gaps(&open.buffer)) {
            (Some(url), true) => inodes.client().get_bytes(url).await?.to_vec(),
            _ => Vec::new(),
        };
        let content = assemble(base, &open.buffer);
        info!(inode = ino, bytes = content.len(), "uploading file content");
        inodes
            .client()
            .put_bytes(&plan.url, Bytes::from(content))
            .await?;
        Ok::<(), FsError>(())
    });
    if let Err(err) = result {
        reply.error(err.errno());
        return;
    }

    if let Err(err) = inodes.invalidate(plan.parent, None) {
        debug!(inode = plan.parent, error = %err, "parent invalidation failed");
    }
    if let Err(err) = inodes.invalidate(ino, None) {
        debug!(inode = ino, error = %err, "inode invalidation failed");
    }
    reply.ok();
}

struct UploadPlan {
    url: Url,
    parent: u64,
    download: Option<Url>,
}

/// Whether the buffered blocks leave holes that must be filled from the
/// previous content.
fn plan_has_gaps(buffer: &HashMap<i64, Vec<u8>>) -> bool {
    let mut ranges: Vec<(i64, i64)> = buffer
        .iter()
        .map(|(offset, data)| (*offset, *offset + data.len() as i64))
        .collect();
    ranges.sort_unstable();
    let mut cursor = 0;
    for (start, end) in ranges {
        if start > cursor {
            return true;
        }
        cursor = cursor.max(end);
    }
    false
}

fn assemble(base: Vec<u8>, buffer: &HashMap<i64, Vec<u8>>) -> Vec<u8> {
    let mut content = base;
    let mut offsets: Vec<i64> = buffer.keys().copied().collect();
    offsets.sort_unstable();
    for offset in offsets {
        let Some(data) = buffer.get(&offset) else {
            continue;
        };
        let start = offset.max(0) as usize;
        let end = start + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
    }
    content
}

fn new_file_upload_url<T: Transport>(
    inodes: &crate::fs::inodes::Inodes<T>,
    parent: u64,
) -> Option<Url> {
    let node = inodes.node(parent)?;
    match &node.kind {
        NodeKind::Storage(storage) => storage.storage.upload_url.clone(),
        NodeKind::Folder(folder) => folder.latest().upload_url.clone(),
        _ => None,
    }
}
