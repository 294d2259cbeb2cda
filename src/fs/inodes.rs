//! Identity registry and name resolver.
//!
//! [`Inodes`] owns every inode of a mount. It manufactures stable inode
//! numbers for remote objects whose native identity is a path, keeps the
//! time-bounded listing cache, reconciles locally created placeholders with
//! later authoritative listings, and synthesizes each project's virtual
//! entries (`.attributes.json`, `.children`, `.linked`).
//!
//! All operations run on one task at a time; suspension happens only at
//! remote calls. Listing-cache installs and in-place entity mutation are
//! deferred to the end of a resolver run so a cancelled task cannot leave a
//! partially installed listing behind.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use async_stream::try_stream;
use futures_util::{Stream, TryStreamExt, pin_mut};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::api_client::{
    JsonMap, RemoteKind, RemoteObject, RemoteProject, RemoteStorage, Transport, fetch_project,
    parse_remote_object, parse_storage, project_from_node,
};
use crate::config::CacheConfig;
use crate::fs::cache::TtlCache;
use crate::fs::error::FsError;
use crate::fs::inode::{
    ATTRIBUTES_FILE_NAME, AttrState, AttributesNode, CHILDREN_DIR_NAME, FileNode, FileSource,
    FolderNode, Inode, InodeTable, LINKED_DIR_NAME, NodeKind, ProjectNode, ROOT_INODE, StorageNode,
    VirtualDirNode, canonical_json,
};

/// A child as reported by the remote service or synthesized for a project,
/// before it has been resolved to an inode.
pub enum RemoteChild {
    Project(RemoteProject),
    Attributes { project: u64, attributes: JsonMap },
    Children { project: u64 },
    Linked { project: u64 },
    Storage(RemoteStorage),
    Object(RemoteObject),
}

impl RemoteChild {
    fn name(&self) -> &str {
        match self {
            RemoteChild::Project(project) => &project.id,
            RemoteChild::Attributes { .. } => ATTRIBUTES_FILE_NAME,
            RemoteChild::Children { .. } => CHILDREN_DIR_NAME,
            RemoteChild::Linked { .. } => LINKED_DIR_NAME,
            RemoteChild::Storage(storage) => &storage.name,
            RemoteChild::Object(object) => &object.name,
        }
    }
}

#[derive(Clone, Copy)]
enum Relation {
    Children,
    Linked,
}

impl Relation {
    fn segment(self) -> &'static str {
        match self {
            Relation::Children => "children",
            Relation::Linked => "linked_nodes",
        }
    }
}

enum ListingPlan {
    Projects,
    Project { files_url: Url, metadata: JsonMap },
    Related { project_id: String, relation: Relation },
    Files,
}

pub struct Inodes<T: Transport> {
    client: T,
    project_id: Option<String>,
    list_all_projects: bool,
    cfg: CacheConfig,
    table: InodeTable,
    /// parent inode -> ordered child inodes, atomically replaced.
    listings: TtlCache<u64, Vec<u64>>,
    projects: Option<(Instant, Vec<RemoteProject>)>,
    project_children: TtlCache<String, Vec<RemoteProject>>,
    project_linked: TtlCache<String, Vec<RemoteProject>>,
}

impl<T: Transport> Inodes<T> {
    pub fn new(
        client: T,
        project_id: Option<String>,
        list_all_projects: bool,
        cfg: CacheConfig,
    ) -> Self {
        let listings = TtlCache::new(cfg.list_cache_capacity, cfg.list_ttl());
        let project_children = TtlCache::new(cfg.list_cache_capacity, cfg.list_ttl());
        let project_linked = TtlCache::new(cfg.list_cache_capacity, cfg.list_ttl());
        Self {
            client,
            project_id,
            list_all_projects,
            cfg,
            table: InodeTable::default(),
            listings,
            projects: None,
            project_children,
            project_linked,
        }
    }

    pub fn client(&self) -> &T {
        &self.client
    }

    /// Read access without the lazy root construction of [`Inodes::get`].
    pub fn node(&self, ino: u64) -> Option<&Inode> {
        self.table.get(ino)
    }

    pub fn entries(&self) -> &InodeTable {
        &self.table
    }

    /// Inode lookup by number. For [`ROOT_INODE`] the root entity is built
    /// lazily: the projects root in all-projects mode, otherwise the
    /// configured project (fetched so its metadata is available). Unknown
    /// numbers resolve to `None`, never an error.
    pub async fn get(&mut self, ino: u64) -> Result<Option<&Inode>, FsError> {
        if self.table.contains(ino) {
            return Ok(self.table.get(ino));
        }
        if ino != ROOT_INODE {
            return Ok(None);
        }
        let root = if self.list_all_projects {
            Inode::new(ROOT_INODE, NodeKind::ProjectsRoot)
        } else {
            let project_id = self.project_id.clone().ok_or(FsError::NotFound)?;
            let project = fetch_project(&self.client, &project_id).await?;
            Inode::new(
                ROOT_INODE,
                NodeKind::Project(ProjectNode {
                    parent: None,
                    name: project.id.clone(),
                    metadata: project.attributes.clone(),
                    project,
                }),
            )
        };
        debug!(inode = ROOT_INODE, "installed root");
        self.table.insert(root);
        Ok(self.table.get(ROOT_INODE))
    }

    /// Lookup by name under a parent.
    ///
    /// Resolution order: the cached listing (refreshing each candidate),
    /// then a fresh remote listing, then locally pending placeholders. A
    /// cached listing that contains no match falls through to the fresh
    /// listing because it may predate a write through this parent.
    pub async fn find_by_name(
        &mut self,
        parent: u64,
        name: &str,
    ) -> Result<Option<u64>, FsError> {
        let parent_node = self
            .table
            .get(parent)
            .ok_or(FsError::UnknownInode(parent))?;
        if !parent_node.has_children() {
            return Err(FsError::NotADirectory);
        }
        if let Some(cached) = self.listings.get(&parent).cloned() {
            for child in cached {
                // Cached entities may be out of date; refresh failures skip
                // the entry instead of failing the lookup.
                if let Err(err) = self.refresh(child, false).await {
                    warn!(inode = child, error = %err, "failed to refresh cached child");
                    continue;
                }
                match self.table.get(child) {
                    Some(node) if !node.removed && self.table.name(node) == name => {
                        return Ok(Some(child));
                    }
                    _ => {}
                }
            }
        }
        let remote = self.fetch_children(parent).await?;
        let mut children = Vec::with_capacity(remote.len());
        let mut found = None;
        for child in remote {
            let matches = child.name() == name;
            let ino = self.resolve_or_allocate(parent, child)?;
            children.push(ino);
            if matches && found.is_none() {
                found = Some(ino);
            }
        }
        self.listings.set(parent, children);
        if found.is_some() {
            return Ok(found);
        }
        if let Some(ino) = self.find_new_file(parent, name) {
            if let Err(err) = self.refresh(ino, false).await {
                debug!(inode = ino, error = %err, "failed to refresh pending file");
            }
            return Ok(Some(ino));
        }
        Ok(None)
    }

    /// Ordered children of a directory inode, materialized through the
    /// registry and served from the listing cache when fresh.
    pub async fn children_of(&mut self, parent: u64) -> Result<Vec<u64>, FsError> {
        let parent_node = self
            .table
            .get(parent)
            .ok_or(FsError::UnknownInode(parent))?;
        if !parent_node.has_children() {
            return Err(FsError::NotADirectory);
        }
        if let Some(cached) = self.listings.get(&parent) {
            return Ok(cached.clone());
        }
        let remote = self.fetch_children(parent).await?;
        let mut children = Vec::with_capacity(remote.len());
        for child in remote {
            children.push(self.resolve_or_allocate(parent, child)?);
        }
        self.listings.set(parent, children.clone());
        Ok(children)
    }

    /// Allocates a placeholder for a file promised by the kernel but not
    /// yet observed remotely.
    pub async fn register(&mut self, parent: u64, name: &str) -> Result<u64, FsError> {
        if !self.table.contains(parent) {
            return Err(FsError::UnknownInode(parent));
        }
        debug!(parent, name, "register new file");
        let probe = Inode::new(
            0,
            NodeKind::File(FileNode {
                parent,
                file: FileSource::New {
                    name: name.to_owned(),
                },
                state: AttrState::fresh(),
                invalidated: false,
            }),
        );
        let ino = self.resolve_probe(probe)?;
        debug!(inode = ino, "registered");
        Ok(ino)
    }

    /// Drops the listing-cache entry keyed by this inode and runs the
    /// entity's own invalidation hook. `new_name` records a rename pending
    /// the next refresh.
    pub fn invalidate(&mut self, ino: u64, new_name: Option<&str>) -> Result<(), FsError> {
        if !self.table.contains(ino) {
            return Err(FsError::UnknownInode(ino));
        }
        debug!(inode = ino, name = ?new_name, "invalidate");
        self.listings.remove(&ino);
        let reset_attributes = match self.table.get(ino).map(|node| &node.kind) {
            Some(NodeKind::ProjectAttributes(attrs)) => {
                match self.table.get(attrs.project).map(|node| &node.kind) {
                    Some(NodeKind::Project(project)) => Some(project.metadata.clone()),
                    _ => Some(JsonMap::new()),
                }
            }
            _ => None,
        };
        if let Some(node) = self.table.get_mut(ino) {
            match (&mut node.kind, reset_attributes) {
                (NodeKind::ProjectAttributes(attrs), Some(metadata)) => {
                    attrs.attributes = metadata;
                }
                _ => node.invalidate(new_name.map(str::to_owned)),
            }
        }
        Ok(())
    }

    /// Tombstones an inode. The slot stays allocated but the entry is
    /// excluded from every resolution path for the rest of the mount.
    pub fn mark_removed(&mut self, ino: u64) {
        if let Some(node) = self.table.get_mut(ino) {
            debug!(inode = ino, "mark removed");
            node.removed = true;
        }
    }

    /// Re-parents a file or folder after a cross-directory move.
    pub fn set_parent(&mut self, ino: u64, parent: u64) {
        if let Some(node) = self.table.get_mut(ino) {
            match &mut node.kind {
                NodeKind::Folder(folder) => folder.parent = parent,
                NodeKind::File(file) => file.parent = parent,
                _ => {}
            }
        }
    }

    /// Renames a placeholder that has never been uploaded.
    pub fn rename_pending(&mut self, ino: u64, new_name: &str) {
        if let Some(node) = self.table.get_mut(ino) {
            if let NodeKind::File(FileNode {
                file: FileSource::New { name },
                ..
            }) = &mut node.kind
            {
                *name = new_name.to_owned();
            }
        }
    }

    /// Reloads a file or folder from its parent's remote listing when
    /// forced, explicitly invalidated, or older than the attribute TTL.
    ///
    /// The child is looked up by current name first and by identity path
    /// second (covering renames observed remotely). A kind change is a hard
    /// error and leaves the cached attributes untouched.
    pub async fn refresh(&mut self, ino: u64, force: bool) -> Result<(), FsError> {
        let ttl = self.cfg.attribute_ttl();
        let (parent, lookup_name, lookup_path) = {
            let node = self.table.get(ino).ok_or(FsError::UnknownInode(ino))?;
            match &node.kind {
                NodeKind::Folder(folder) => {
                    if !force && !folder.state.expired(ttl) {
                        return Ok(());
                    }
                    (
                        folder.parent,
                        self.table.name(node),
                        folder.latest().remote_path().to_owned(),
                    )
                }
                NodeKind::File(file) => {
                    // A placeholder that was never written has nothing to
                    // fetch yet.
                    if file.is_new() && !file.invalidated {
                        return Ok(());
                    }
                    if !force && !file.is_new() && !file.state.expired(ttl) {
                        return Ok(());
                    }
                    let path = file
                        .latest()
                        .map(|object| object.remote_path().to_owned())
                        .unwrap_or_else(|| self.table.path(node));
                    (file.parent, self.table.name(node), path)
                }
                _ => {
                    debug!(inode = ino, "nothing to refresh");
                    return Ok(());
                }
            }
        };
        let siblings = self.remote_children_of(parent).await?;
        let child = siblings
            .iter()
            .find(|object| object.name == lookup_name)
            .or_else(|| {
                siblings
                    .iter()
                    .find(|object| object.remote_path() == lookup_path)
            })
            .cloned()
            .ok_or(FsError::NotFound)?;
        let node = self.table.get_mut(ino).ok_or(FsError::UnknownInode(ino))?;
        match &mut node.kind {
            NodeKind::Folder(folder) => {
                if child.kind == RemoteKind::File {
                    return Err(FsError::NotADirectory);
                }
                folder.state.commit(child);
            }
            NodeKind::File(file) => {
                if child.kind == RemoteKind::Folder {
                    return Err(FsError::IsADirectory);
                }
                file.state.commit(child.clone());
                if file.is_new() {
                    file.file = FileSource::Remote(child);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Serves the `.attributes.json` content: fetches the project document,
    /// stores the fresh attributes on both the project inode and the
    /// virtual entry, and returns the canonical serialization.
    pub async fn attributes_json(&mut self, ino: u64) -> Result<Vec<u8>, FsError> {
        let project_ino = match self.table.get(ino).map(|node| &node.kind) {
            Some(NodeKind::ProjectAttributes(attrs)) => attrs.project,
            Some(_) => return Err(FsError::NotFound),
            None => return Err(FsError::UnknownInode(ino)),
        };
        let project_id = match self.table.get(project_ino).map(|node| &node.kind) {
            Some(NodeKind::Project(project)) => project.project.id.clone(),
            _ => return Err(FsError::NotFound),
        };
        let attributes = self.fetch_node_attributes(&project_id).await?;
        if let Some(node) = self.table.get_mut(project_ino) {
            if let NodeKind::Project(project) = &mut node.kind {
                project.metadata = attributes.clone();
            }
        }
        if let Some(node) = self.table.get_mut(ino) {
            if let NodeKind::ProjectAttributes(attrs) = &mut node.kind {
                attrs.attributes = attributes.clone();
            }
        }
        Ok(canonical_json(&attributes))
    }

    /// Resolves a remote child to an inode, reusing a live inode with the
    /// same canonical path or a pending placeholder before allocating.
    fn resolve_or_allocate(&mut self, parent: u64, child: RemoteChild) -> Result<u64, FsError> {
        let kind = self.make_kind(parent, child);
        self.resolve_probe(Inode::new(0, kind))
    }

    fn resolve_probe(&mut self, probe: Inode) -> Result<u64, FsError> {
        let probe_path = self.table.path(&probe);
        let mut hit = None;
        for node in self.table.values() {
            if node.removed {
                continue;
            }
            if self.table.path(node) == probe_path {
                hit = Some(node.id);
                break;
            }
        }
        if let Some(id) = hit {
            self.adopt(id, probe);
            return Ok(id);
        }
        if let Some(parent) = self.table.parent_of(&probe) {
            let name = self.table.name(&probe);
            if let Some(id) = self.find_new_file(parent, &name) {
                // The listing caught up with a local placeholder whose
                // canonical path differs from the remote one.
                self.adopt(id, probe);
                return Ok(id);
            }
        }
        let id = self.allocate_id()?;
        let mut inode = probe;
        inode.id = id;
        debug!(inode = id, path = %probe_path, "new inode");
        self.table.insert(inode);
        Ok(id)
    }

    /// Reconciles a probe with the live inode sharing its path.
    fn adopt(&mut self, id: u64, probe: Inode) {
        match probe.kind {
            NodeKind::ProjectAttributes(fresh) => {
                // Re-encountered virtual attributes replace the content in
                // place; dropping the listing entry forces size/mtime to
                // refresh.
                if let Some(node) = self.table.get_mut(fresh.project) {
                    if let NodeKind::Project(project) = &mut node.kind {
                        project.metadata = fresh.attributes.clone();
                    }
                }
                if let Some(node) = self.table.get_mut(id) {
                    if let NodeKind::ProjectAttributes(attrs) = &mut node.kind {
                        attrs.attributes = fresh.attributes;
                    }
                }
                self.listings.remove(&id);
            }
            NodeKind::File(FileNode {
                file: FileSource::Remote(object),
                ..
            }) => {
                // The listing now carries the authoritative representation
                // of a locally created file: promote in place, same id.
                if let Some(node) = self.table.get_mut(id) {
                    if let NodeKind::File(existing) = &mut node.kind {
                        if existing.is_new() {
                            debug!(inode = id, name = %object.name, "promoting new file");
                            existing.state.commit(object.clone());
                            existing.file = FileSource::Remote(object);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn make_kind(&self, parent: u64, child: RemoteChild) -> NodeKind {
        match child {
            RemoteChild::Project(project) => NodeKind::Project(ProjectNode {
                parent: Some(parent),
                name: project.id.clone(),
                metadata: project.attributes.clone(),
                project,
            }),
            RemoteChild::Attributes {
                project,
                attributes,
            } => NodeKind::ProjectAttributes(AttributesNode {
                project,
                attributes,
            }),
            RemoteChild::Children { project } => {
                NodeKind::ProjectChildren(VirtualDirNode { project })
            }
            RemoteChild::Linked { project } => NodeKind::ProjectLinked(VirtualDirNode { project }),
            RemoteChild::Storage(storage) => NodeKind::Storage(StorageNode {
                project: parent,
                storage,
            }),
            RemoteChild::Object(object) => match object.kind {
                RemoteKind::Folder => NodeKind::Folder(FolderNode {
                    parent,
                    folder: object,
                    state: AttrState::fresh(),
                }),
                RemoteKind::File => NodeKind::File(FileNode {
                    parent,
                    file: FileSource::Remote(object),
                    state: AttrState::fresh(),
                    invalidated: false,
                }),
            },
        }
    }

    fn find_new_file(&self, parent: u64, name: &str) -> Option<u64> {
        self.table.values().find_map(|node| match &node.kind {
            NodeKind::File(file)
                if !node.removed
                    && file.is_new()
                    && file.parent == parent
                    && self.table.name(node) == name =>
            {
                Some(node.id)
            }
            _ => None,
        })
    }

    /// Smallest unused number at or above `ROOT_INODE + 1`.
    fn allocate_id(&self) -> Result<u64, FsError> {
        (ROOT_INODE + 1..u64::MAX)
            .find(|id| !self.table.contains(*id))
            .ok_or(FsError::OutOfInodes)
    }

    /// Children of a directory as remote/virtual descriptors, dispatched by
    /// entity kind. Projects yield their three virtual entries first, then
    /// the storages in server order.
    async fn fetch_children(&mut self, parent: u64) -> Result<Vec<RemoteChild>, FsError> {
        let plan = {
            let node = self
                .table
                .get(parent)
                .ok_or(FsError::UnknownInode(parent))?;
            match &node.kind {
                NodeKind::ProjectsRoot => ListingPlan::Projects,
                NodeKind::Project(project) => ListingPlan::Project {
                    files_url: project.project.files_url.clone(),
                    metadata: project.metadata.clone(),
                },
                NodeKind::ProjectChildren(dir) => ListingPlan::Related {
                    project_id: self.project_id_of(dir.project)?,
                    relation: Relation::Children,
                },
                NodeKind::ProjectLinked(dir) => ListingPlan::Related {
                    project_id: self.project_id_of(dir.project)?,
                    relation: Relation::Linked,
                },
                NodeKind::Storage(_) | NodeKind::Folder(_) => ListingPlan::Files,
                NodeKind::ProjectAttributes(_) | NodeKind::File(_) => {
                    return Err(FsError::NotADirectory);
                }
            }
        };
        match plan {
            ListingPlan::Projects => Ok(self
                .list_projects()
                .await?
                .into_iter()
                .map(RemoteChild::Project)
                .collect()),
            ListingPlan::Project {
                files_url,
                metadata,
            } => {
                let mut children = vec![
                    RemoteChild::Attributes {
                        project: parent,
                        attributes: metadata,
                    },
                    RemoteChild::Children { project: parent },
                    RemoteChild::Linked { project: parent },
                ];
                let nodes = collect_pages(&self.client, files_url, self.cfg.page_size).await?;
                children.extend(
                    nodes
                        .iter()
                        .filter_map(parse_storage)
                        .map(RemoteChild::Storage),
                );
                Ok(children)
            }
            ListingPlan::Related {
                project_id,
                relation,
            } => Ok(self
                .list_related_projects(&project_id, relation)
                .await?
                .into_iter()
                .map(RemoteChild::Project)
                .collect()),
            ListingPlan::Files => Ok(self
                .remote_children_of(parent)
                .await?
                .into_iter()
                .map(RemoteChild::Object)
                .collect()),
        }
    }

    fn project_id_of(&self, project_ino: u64) -> Result<String, FsError> {
        match self.table.get(project_ino).map(|node| &node.kind) {
            Some(NodeKind::Project(project)) => Ok(project.project.id.clone()),
            _ => Err(FsError::UnknownInode(project_ino)),
        }
    }

    /// Projects available to the authenticated user, cached for the listing
    /// TTL, deduplicated by id and sorted ascending for stable ordering.
    async fn list_projects(&mut self) -> Result<Vec<RemoteProject>, FsError> {
        if let Some((loaded, projects)) = &self.projects {
            if loaded.elapsed() <= self.cfg.list_ttl() {
                return Ok(projects.clone());
            }
        }
        let url = self.client.build_url(&["users", "me", "nodes"]);
        let nodes = collect_pages(&self.client, url, self.cfg.page_size).await?;
        let ordered = dedupe_projects(&self.client, &nodes);
        self.projects = Some((Instant::now(), ordered.clone()));
        Ok(ordered)
    }

    async fn list_related_projects(
        &mut self,
        project_id: &str,
        relation: Relation,
    ) -> Result<Vec<RemoteProject>, FsError> {
        let key = project_id.to_owned();
        let cached = match relation {
            Relation::Children => self.project_children.get(&key).cloned(),
            Relation::Linked => self.project_linked.get(&key).cloned(),
        };
        if let Some(projects) = cached {
            return Ok(projects);
        }
        let url = self
            .client
            .build_url(&["nodes", project_id, relation.segment()]);
        let nodes = collect_pages(&self.client, url, self.cfg.page_size).await?;
        let ordered = dedupe_projects(&self.client, &nodes);
        match relation {
            Relation::Children => self.project_children.set(key, ordered.clone()),
            Relation::Linked => self.project_linked.set(key, ordered.clone()),
        }
        Ok(ordered)
    }

    /// Remote files and folders below a storage or folder inode, used both
    /// for listings and for attribute refreshes.
    async fn remote_children_of(&self, parent: u64) -> Result<Vec<RemoteObject>, FsError> {
        let files_url = {
            let node = self
                .table
                .get(parent)
                .ok_or(FsError::UnknownInode(parent))?;
            match &node.kind {
                NodeKind::Storage(storage) => storage.storage.files_url.clone(),
                NodeKind::Folder(folder) => folder
                    .latest()
                    .files_url
                    .clone()
                    .ok_or(FsError::NotFound)?,
                _ => return Err(FsError::NotADirectory),
            }
        };
        let nodes = collect_pages(&self.client, files_url, self.cfg.page_size).await?;
        Ok(nodes.iter().filter_map(parse_remote_object).collect())
    }

    async fn fetch_node_attributes(&self, project_id: &str) -> Result<JsonMap, FsError> {
        let url = self.client.build_url(&["nodes", project_id]);
        let payload = self.client.get_json(&url).await?;
        Ok(payload
            .pointer("/data/attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default())
    }
}

fn dedupe_projects<T: Transport>(client: &T, nodes: &[Value]) -> Vec<RemoteProject> {
    let mut projects = BTreeMap::new();
    for node in nodes {
        if let Some(project) = project_from_node(client, node) {
            projects.insert(project.id.clone(), project);
        }
    }
    projects.into_values().collect()
}

/// Follows `links.next` through a paginated listing, yielding each `data`
/// entry lazily. A next link that revisits an already issued URL stops the
/// iteration; the page size is applied to the first URL when absent.
pub fn paginate<'a, T: Transport>(
    client: &'a T,
    first: Url,
    page_size: u32,
) -> impl Stream<Item = Result<Value, FsError>> + 'a {
    try_stream! {
        let mut next = Some(with_page_size(&first, page_size));
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(url) = next.take() {
            let payload = client.get_json(&url).await?;
            if let Some(items) = payload.get("data").and_then(Value::as_array) {
                for item in items {
                    yield item.clone();
                }
            }
            if let Some(link) = payload.pointer("/links/next").and_then(Value::as_str) {
                if !visited.contains(link) {
                    visited.insert(url.as_str().to_owned());
                    next = Url::parse(link).ok();
                }
            }
        }
    }
}

async fn collect_pages<T: Transport>(
    client: &T,
    url: Url,
    page_size: u32,
) -> Result<Vec<Value>, FsError> {
    let stream = paginate(client, url, page_size);
    pin_mut!(stream);
    let mut nodes = Vec::new();
    while let Some(node) = stream.try_next().await? {
        nodes.push(node);
    }
    Ok(nodes)
}

fn with_page_size(url: &Url, page_size: u32) -> Url {
    if url.query_pairs().any(|(key, _)| key == "page[size]") {
        return url.clone();
    }
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("page[size]", &page_size.to_string());
    url
}
