use super::prelude::*;

use serde_json::json;
use tracing::debug;

/// FUSE `rename`: moves or renames a file/folder through its move link.
/// The inode keeps its number; the new name is recorded on it so lookups
/// resolve before the next authoritative refresh.
#[allow(clippy::too_many_arguments)]
pub(super) fn rename<T: Transport>(
    fs: &mut RdmFs<T>,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
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
        inodes.get(newparent).await?;
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

    enum MovePlan {
        Pending,
        Remote { url: Url, body: serde_json::Value },
    }

    let plan = {
        let Some(node) = inodes.node(ino) else {
            reply.error(ENOENT);
            return;
        };
        if !node.can_move() {
            reply.error(EPERM);
            return;
        }
        let source_path = inodes.entries().display_path(node);
        let Some(destination) = inodes.node(newparent) else {
            reply.error(ENOENT);
            return;
        };
        if newparent != parent && !destination.can_create() {
            reply.error(EACCES);
            return;
        }
        let target_path = format!(
            "{}{}",
            inodes.entries().display_path(destination),
            newname
        );
        if !RdmFs::<T>::writable(whitelist.as_ref(), &source_path)
            || !RdmFs::<T>::writable(whitelist.as_ref(), &target_path)
        {
            debug!(from = %source_path, to = %target_path, "rename rejected by whitelist");
            reply.error(EACCES);
            return;
        }

        let latest = match &node.kind {
            NodeKind::Folder(folder) => Some(folder.latest().clone()),
            NodeKind::File(file) => match &file.file {
                FileSource::New { .. } => None,
                FileSource::Remote(_) => file.latest().cloned(),
            },
            _ => None,
        };
        match latest {
            // Never uploaded; the rename is purely local.
            None => MovePlan::Pending,
            Some(object) => {
                let Some(url) = object.move_url.clone() else {
                    reply.error(EACCES);
                    return;
                };
                let body = if newparent == parent {
                    json!({ "action": "rename", "rename": newname })
                } else {
                    let destination_path = match &destination.kind {
                        NodeKind::Storage(_) => "/".to_owned(),
                        NodeKind::Folder(folder) => {
                            let mut path = folder.latest().remote_path().to_owned();
                            if !path.ends_with('/') {
                                path.push('/');
                            }
                            path
                        }
                        _ => {
                            reply.error(EACCES);
                            return;
                        }
                    };
                    json!({
                        "action": "move",
                        "path": destination_path,
                        "rename": newname,
                        "conflict": "replace",
                    })
                };
                MovePlan::Remote { url, body }
            }
        }
    };

    match plan {
        MovePlan::Pending => {
            inodes.rename_pending(ino, newname);
            inodes.set_parent(ino, newparent);
        }
        MovePlan::Remote { url, body } => {
            if let Err(err) = runtime.block_on(inodes.client().post_json(&url, &body)) {
                reply.error(err.errno());
                return;
            }
            inodes.set_parent(ino, newparent);
            if let Err(err) = inodes.invalidate(ino, Some(newname)) {
                reply.error(err.errno());
                return;
            }
        }
    }

    // Both listings predate the move.
    if let Err(err) = inodes.invalidate(parent, None) {
        reply.error(err.errno());
        return;
    }
    if newparent != parent {
        if let Err(err) = inodes.invalidate(newparent, None) {
            reply.error(err.errno());
            return;
        }
    }
    reply.ok();
}
