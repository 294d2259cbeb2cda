//! Entity model for the mounted hierarchy.
//!
//! Every object visible through the mount is an [`Inode`]: the projects
//! root, a project, one of a project's virtual entries, a storage provider,
//! or a file/folder below a storage. Inodes form a forest rooted at
//! [`ROOT_INODE`]; parents are referenced by inode number and resolved
//! through the owning [`InodeTable`], which also evaluates the capability
//! surface (name, canonical path, writability flags, attributes).
//!
//! The canonical `path` is the identity key for deduplication: the registry
//! never keeps two live inodes with the same canonical path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api_client::{JsonMap, RemoteObject, RemoteProject, RemoteStorage, SizeValue};

/// Inode number of whichever root the mount exposes.
pub const ROOT_INODE: u64 = 1;

pub const ATTRIBUTES_FILE_NAME: &str = ".attributes.json";
pub const CHILDREN_DIR_NAME: &str = ".children";
pub const LINKED_DIR_NAME: &str = ".linked";

#[derive(Debug)]
pub struct Inode {
    pub id: u64,
    /// Tombstone; removed inodes keep their slot but are skipped during
    /// resolution for the rest of the mount's lifetime.
    pub removed: bool,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub enum NodeKind {
    /// Singleton root in all-projects mode.
    ProjectsRoot,
    Project(ProjectNode),
    ProjectAttributes(AttributesNode),
    ProjectChildren(VirtualDirNode),
    ProjectLinked(VirtualDirNode),
    Storage(StorageNode),
    Folder(FolderNode),
    File(FileNode),
}

#[derive(Debug)]
pub struct ProjectNode {
    /// The directory this project was listed under; `None` when the project
    /// itself is the mount root.
    pub parent: Option<u64>,
    pub project: RemoteProject,
    pub name: String,
    /// Last known attribute dictionary, shared with `.attributes.json`.
    pub metadata: JsonMap,
}

#[derive(Debug)]
pub struct AttributesNode {
    /// Owning project inode.
    pub project: u64,
    pub attributes: JsonMap,
}

#[derive(Debug)]
pub struct VirtualDirNode {
    pub project: u64,
}

#[derive(Debug)]
pub struct StorageNode {
    pub project: u64,
    pub storage: RemoteStorage,
}

/// Attribute-cache state shared by file and folder inodes.
#[derive(Debug)]
pub struct AttrState {
    pub updated: Option<RemoteObject>,
    /// `None` means explicitly invalidated; a refresh is then mandatory.
    pub last_loaded: Option<Instant>,
    /// Name recorded by a local rename, pending the next refresh.
    pub updated_name: Option<String>,
}

impl AttrState {
    pub fn fresh() -> Self {
        Self {
            updated: None,
            last_loaded: Some(Instant::now()),
            updated_name: None,
        }
    }

    pub fn expired(&self, ttl: Duration) -> bool {
        match self.last_loaded {
            Some(loaded) => loaded.elapsed() > ttl,
            None => true,
        }
    }

    /// Installs an authoritative object observed by a refresh.
    pub fn commit(&mut self, object: RemoteObject) {
        self.updated = Some(object);
        self.updated_name = None;
        self.last_loaded = Some(Instant::now());
    }
}

#[derive(Debug)]
pub struct FolderNode {
    pub parent: u64,
    pub folder: RemoteObject,
    pub state: AttrState,
}

impl FolderNode {
    pub fn latest(&self) -> &RemoteObject {
        self.state.updated.as_ref().unwrap_or(&self.folder)
    }
}

#[derive(Debug)]
pub enum FileSource {
    Remote(RemoteObject),
    /// Locally created, not yet observed in a remote listing.
    New { name: String },
}

#[derive(Debug)]
pub struct FileNode {
    pub parent: u64,
    pub file: FileSource,
    pub state: AttrState,
    /// Set once the file has been written or explicitly invalidated; a
    /// never-invalidated placeholder has nothing to refresh.
    pub invalidated: bool,
}

impl FileNode {
    pub fn is_new(&self) -> bool {
        matches!(self.file, FileSource::New { .. })
    }

    pub fn latest(&self) -> Option<&RemoteObject> {
        self.state.updated.as_ref().or(match &self.file {
            FileSource::Remote(object) => Some(object),
            FileSource::New { .. } => None,
        })
    }
}

impl Inode {
    pub fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id,
            removed: false,
            kind,
        }
    }

    pub fn has_children(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::ProjectAttributes(_) | NodeKind::File(_)
        )
    }

    pub fn can_create(&self) -> bool {
        matches!(self.kind, NodeKind::Storage(_) | NodeKind::Folder(_))
    }

    pub fn can_move(&self) -> bool {
        matches!(self.kind, NodeKind::Folder(_) | NodeKind::File(_))
    }

    /// The synthetic `.attributes.json` entry is never writable.
    pub fn read_only(&self) -> bool {
        matches!(self.kind, NodeKind::ProjectAttributes(_))
    }

    /// Entity half of invalidation: resets the attribute timer and records
    /// a pending rename. The registry's half evicts the listing cache.
    pub fn invalidate(&mut self, name: Option<String>) {
        match &mut self.kind {
            NodeKind::Folder(folder) => {
                folder.state.last_loaded = None;
                folder.state.updated_name = name;
            }
            NodeKind::File(file) => {
                file.state.last_loaded = None;
                file.state.updated_name = name;
                file.invalidated = true;
            }
            _ => {}
        }
    }
}

/// Serializes an attribute dictionary the way `.attributes.json` reports
/// it: UTF-8, keys sorted ascending, two-space indent, no trailing newline.
/// `serde_json` maps are ordered, so the output is byte-deterministic.
pub fn canonical_json(attributes: &JsonMap) -> Vec<u8> {
    serde_json::to_vec_pretty(&Value::Object(attributes.clone())).unwrap_or_else(|_| b"{}".to_vec())
}

/// Owns every inode of a mount and evaluates the parts of the capability
/// surface that need the parent chain. Methods take `&Inode` rather than an
/// id so they also work for probe entities that have not been installed.
#[derive(Default)]
pub struct InodeTable {
    nodes: HashMap<u64, Inode>,
}

impl InodeTable {
    pub fn get(&self, id: u64) -> Option<&Inode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Inode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn insert(&mut self, inode: Inode) {
        self.nodes.insert(inode.id, inode);
    }

    pub fn values(&self) -> impl Iterator<Item = &Inode> {
        self.nodes.values()
    }

    pub fn parent_of(&self, node: &Inode) -> Option<u64> {
        match &node.kind {
            NodeKind::ProjectsRoot => None,
            NodeKind::Project(project) => project.parent,
            NodeKind::ProjectAttributes(attrs) => Some(attrs.project),
            NodeKind::ProjectChildren(dir) | NodeKind::ProjectLinked(dir) => Some(dir.project),
            NodeKind::Storage(storage) => Some(storage.project),
            NodeKind::Folder(folder) => Some(folder.parent),
            NodeKind::File(file) => Some(file.parent),
        }
    }

    /// The enclosing storage provider of a file or folder.
    pub fn storage_of(&self, node: &Inode) -> Option<u64> {
        match &node.kind {
            NodeKind::Storage(_) => Some(node.id),
            NodeKind::Folder(_) | NodeKind::File(_) => {
                let parent = self.parent_of(node)?;
                self.storage_of(self.get(parent)?)
            }
            _ => None,
        }
    }

    pub fn name(&self, node: &Inode) -> String {
        match &node.kind {
            NodeKind::ProjectsRoot => String::new(),
            NodeKind::Project(project) => project.name.clone(),
            NodeKind::ProjectAttributes(_) => ATTRIBUTES_FILE_NAME.to_owned(),
            NodeKind::ProjectChildren(_) => CHILDREN_DIR_NAME.to_owned(),
            NodeKind::ProjectLinked(_) => LINKED_DIR_NAME.to_owned(),
            NodeKind::Storage(storage) => storage.storage.name.clone(),
            NodeKind::Folder(folder) => folder
                .state
                .updated_name
                .clone()
                .unwrap_or_else(|| folder.latest().name.clone()),
            NodeKind::File(file) => match &file.file {
                FileSource::New { name } => name.clone(),
                FileSource::Remote(_) => file
                    .state
                    .updated_name
                    .clone()
                    .unwrap_or_else(|| {
                        file.latest().map(|o| o.name.clone()).unwrap_or_default()
                    }),
            },
        }
    }

    /// Canonical identity path. Folders end with `/`, files do not; a
    /// remote object's own path contributes with one leading slash removed.
    pub fn path(&self, node: &Inode) -> String {
        match &node.kind {
            NodeKind::ProjectsRoot => "/".to_owned(),
            NodeKind::Project(project) => match project.parent {
                Some(parent) => format!("{}{}/", self.path_of(parent), project.name),
                None => format!("/{}/", project.project.id),
            },
            NodeKind::ProjectAttributes(attrs) => {
                format!("{}{}", self.path_of(attrs.project), ATTRIBUTES_FILE_NAME)
            }
            NodeKind::ProjectChildren(dir) => {
                format!("{}{}/", self.path_of(dir.project), CHILDREN_DIR_NAME)
            }
            NodeKind::ProjectLinked(dir) => {
                format!("{}{}/", self.path_of(dir.project), LINKED_DIR_NAME)
            }
            NodeKind::Storage(storage) => {
                format!("{}{}/", self.path_of(storage.project), storage.storage.name)
            }
            NodeKind::Folder(folder) => {
                let mut path = format!(
                    "{}{}",
                    self.storage_path(node),
                    strip_leading_slash(folder.latest().remote_path())
                );
                if !path.ends_with('/') {
                    path.push('/');
                }
                path
            }
            NodeKind::File(file) => match (&file.file, file.latest()) {
                (FileSource::New { name }, _) => {
                    format!("{}{}", self.path_of(file.parent), name)
                }
                (_, Some(latest)) => format!(
                    "{}{}",
                    self.storage_path(node),
                    strip_leading_slash(latest.remote_path())
                ),
                (_, None) => String::new(),
            },
        }
    }

    /// Human-facing absolute path used in logs and whitelist matching.
    pub fn display_path(&self, node: &Inode) -> String {
        match &node.kind {
            NodeKind::ProjectsRoot => "/".to_owned(),
            NodeKind::Project(project) => match project.parent {
                Some(parent) => format!("{}{}/", self.display_path_of(parent), project.name),
                None => "/".to_owned(),
            },
            NodeKind::ProjectAttributes(attrs) => {
                format!("{}{}", self.display_path_of(attrs.project), ATTRIBUTES_FILE_NAME)
            }
            NodeKind::ProjectChildren(dir) => {
                format!("{}{}/", self.display_path_of(dir.project), CHILDREN_DIR_NAME)
            }
            NodeKind::ProjectLinked(dir) => {
                format!("{}{}/", self.display_path_of(dir.project), LINKED_DIR_NAME)
            }
            NodeKind::Storage(storage) => format!(
                "{}{}/",
                self.display_path_of(storage.project),
                storage.storage.name
            ),
            NodeKind::Folder(_) => {
                format!("{}{}/", self.display_parent(node), self.name(node))
            }
            NodeKind::File(_) => format!("{}{}", self.display_parent(node), self.name(node)),
        }
    }

    pub fn size(&self, node: &Inode) -> Option<SizeValue> {
        match &node.kind {
            NodeKind::File(file) => {
                if file.is_new() {
                    return None;
                }
                file.latest().and_then(|object| object.size.clone())
            }
            NodeKind::ProjectAttributes(attrs) => {
                Some(SizeValue::Bytes(canonical_json(&attrs.attributes).len() as u64))
            }
            _ => None,
        }
    }

    pub fn date_created(&self, node: &Inode) -> Option<String> {
        match &node.kind {
            NodeKind::Folder(folder) => folder.latest().date_created.clone(),
            NodeKind::File(file) if !file.is_new() => {
                file.latest().and_then(|object| object.date_created.clone())
            }
            NodeKind::ProjectAttributes(attrs) => attrs
                .attributes
                .get("date_created")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        }
    }

    pub fn date_modified(&self, node: &Inode) -> Option<String> {
        match &node.kind {
            NodeKind::Folder(folder) => folder.latest().date_modified.clone(),
            NodeKind::File(file) if !file.is_new() => {
                file.latest().and_then(|object| object.date_modified.clone())
            }
            NodeKind::ProjectAttributes(attrs) => attrs
                .attributes
                .get("date_modified")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        }
    }

    fn path_of(&self, id: u64) -> String {
        self.get(id).map(|node| self.path(node)).unwrap_or_default()
    }

    fn display_path_of(&self, id: u64) -> String {
        self.get(id)
            .map(|node| self.display_path(node))
            .unwrap_or_default()
    }

    fn display_parent(&self, node: &Inode) -> String {
        self.parent_of(node)
            .map(|parent| self.display_path_of(parent))
            .unwrap_or_default()
    }

    fn storage_path(&self, node: &Inode) -> String {
        self.storage_of(node)
            .map(|storage| self.path_of(storage))
            .unwrap_or_default()
    }
}

fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}
