//! Registry and resolver behavior against a canned remote service.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;

use rdmfs::api_client::{RemoteKind, Transport};
use rdmfs::config::CacheConfig;
use rdmfs::fs::error::FsError;
use rdmfs::fs::inode::{NodeKind, ROOT_INODE};
use rdmfs::fs::inodes::Inodes;

const BASE: &str = "https://api.test/v2/";

/// Serves canned JSON documents keyed by URL. A key with several queued
/// payloads pops one per request and keeps repeating the last; requests are
/// logged so tests can count remote round-trips.
struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn route(&self, url: &str, payload: Value) {
        self.routes
            .lock()
            .expect("routes lock")
            .entry(url.to_owned())
            .or_default()
            .push_back(payload);
    }

    fn take(&self, key: &str) -> Option<Value> {
        let mut routes = self.routes.lock().expect("routes lock");
        let queue = routes.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    fn requests_to(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }
}

impl Transport for FakeTransport {
    fn build_url(&self, segments: &[&str]) -> Url {
        let mut url = Url::parse(BASE).expect("static base URL");
        {
            let mut path = url.path_segments_mut().expect("base URL has a path");
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
            path.push("");
        }
        url
    }

    async fn get_json(&self, url: &Url) -> Result<Value, FsError> {
        let full = url.as_str().to_owned();
        self.requests.lock().expect("requests lock").push(full.clone());
        let stripped = full.split('?').next().unwrap_or(&full).to_owned();
        self.take(&full)
            .or_else(|| self.take(&stripped))
            .ok_or_else(|| FsError::InvalidResponse(format!("no fixture for {full}")))
    }

    async fn get_bytes(&self, url: &Url) -> Result<Bytes, FsError> {
        Err(FsError::InvalidResponse(format!(
            "unexpected download of {url}"
        )))
    }

    async fn put_bytes(&self, _url: &Url, _body: Bytes) -> Result<Value, FsError> {
        Ok(Value::Null)
    }

    async fn post_json(&self, _url: &Url, _body: &Value) -> Result<Value, FsError> {
        Ok(Value::Null)
    }

    async fn delete(&self, _url: &Url) -> Result<(), FsError> {
        Ok(())
    }
}

fn page(data: Vec<Value>, next: Option<&str>) -> Value {
    json!({ "data": data, "links": { "next": next } })
}

fn project_node(id: &str, title: &str, registration: bool) -> Value {
    json!({
        "id": id,
        "type": "nodes",
        "attributes": { "title": title, "registration": registration },
        "relationships": {
            "files": { "links": { "related": { "href": format!("{BASE}nodes/{id}/files/") } } }
        }
    })
}

fn storage_resource(project: &str, provider: &str) -> Value {
    json!({
        "id": format!("{project}:{provider}"),
        "type": "files",
        "attributes": { "name": provider, "provider": provider },
        "relationships": {
            "files": {
                "links": { "related": { "href": format!("{BASE}nodes/{project}/files/{provider}/") } }
            }
        },
        "links": {
            "upload": format!("https://files.test/v1/resources/{project}/providers/{provider}/"),
            "new_folder": format!("https://files.test/v1/resources/{project}/providers/{provider}/?kind=folder")
        }
    })
}

fn folder_resource(name: &str, path: &str, children_url: &str) -> Value {
    json!({
        "id": path,
        "type": "files",
        "attributes": {
            "name": name,
            "kind": "folder",
            "path": path,
            "materialized_path": format!("/{name}/"),
        },
        "relationships": {
            "files": { "links": { "related": { "href": children_url } } }
        },
        "links": {
            "delete": format!("https://files.test/v1{path}"),
            "move": format!("https://files.test/v1{path}"),
            "new_folder": format!("https://files.test/v1{path}?kind=folder")
        }
    })
}

fn file_resource(name: &str, path: &str, size: u64) -> Value {
    json!({
        "id": path,
        "type": "files",
        "attributes": {
            "name": name,
            "kind": "file",
            "path": path,
            "materialized_path": format!("/{name}"),
            "size": size,
            "date_created": "2020-01-01T00:00:00Z",
            "date_modified": "2020-01-02T00:00:00Z",
        },
        "links": {
            "upload": format!("https://files.test/v1{path}"),
            "delete": format!("https://files.test/v1{path}"),
            "move": format!("https://files.test/v1{path}"),
            "download": format!("https://files.test/v1{path}")
        }
    })
}

/// Routes for a single-project mount named `test` with one `osfstorage`
/// provider.
fn single_project_transport() -> FakeTransport {
    let transport = FakeTransport::new();
    transport.route(
        &format!("{BASE}nodes/test/"),
        json!({ "data": project_node("test", "Project Test", false) }),
    );
    transport.route(
        &format!("{BASE}nodes/test/files/"),
        page(vec![storage_resource("test", "osfstorage")], None),
    );
    transport
}

fn single_project(transport: FakeTransport) -> Inodes<FakeTransport> {
    Inodes::new(transport, Some("test".to_owned()), false, CacheConfig::default())
}

fn all_projects(transport: FakeTransport) -> Inodes<FakeTransport> {
    Inodes::new(transport, None, true, CacheConfig::default())
}

fn node_name(inodes: &Inodes<FakeTransport>, ino: u64) -> String {
    let node = inodes.node(ino).expect("known inode");
    inodes.entries().name(node)
}

#[tokio::test]
async fn lookup_chain_resolves_nested_objects() {
    let transport = single_project_transport();
    transport.route(
        &format!("{BASE}nodes/test/files/osfstorage/"),
        page(
            vec![folder_resource("b", "/f1/", &format!("{BASE}folders/f1/"))],
            None,
        ),
    );
    transport.route(
        &format!("{BASE}folders/f1/"),
        page(
            vec![folder_resource("b", "/f2/", &format!("{BASE}folders/f2/"))],
            None,
        ),
    );
    transport.route(
        &format!("{BASE}folders/f2/"),
        page(vec![file_resource("b", "/f3", 11)], None),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root fetch").expect("root inode");

    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");
    assert_eq!(node_name(&inodes, storage), "osfstorage");
    assert!(matches!(
        inodes.node(storage).expect("known").kind,
        NodeKind::Storage(_)
    ));

    let folder = inodes
        .find_by_name(storage, "b")
        .await
        .expect("folder lookup")
        .expect("folder exists");
    let nested = inodes
        .find_by_name(folder, "b")
        .await
        .expect("nested lookup")
        .expect("nested exists");
    let file = inodes
        .find_by_name(nested, "b")
        .await
        .expect("file lookup")
        .expect("file exists");

    assert!(matches!(inodes.node(folder).expect("known").kind, NodeKind::Folder(_)));
    assert!(matches!(inodes.node(nested).expect("known").kind, NodeKind::Folder(_)));
    assert!(matches!(inodes.node(file).expect("known").kind, NodeKind::File(_)));
    assert_eq!(node_name(&inodes, file), "b");

    // Resolving the same objects again returns the same numbers.
    assert_eq!(
        inodes.find_by_name(ROOT_INODE, "osfstorage").await.expect("relookup"),
        Some(storage)
    );
    assert_eq!(inodes.find_by_name(folder, "b").await.expect("relookup"), Some(nested));

    // Numbers are allocated compactly from ROOT + 1 upward.
    let mut ids: Vec<u64> = inodes.entries().values().map(|node| node.id).collect();
    ids.sort_unstable();
    let expected: Vec<u64> = (ROOT_INODE..=ids.len() as u64).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn all_projects_listing_paginates_once() {
    let transport = FakeTransport::new();
    transport.route(
        &format!("{BASE}users/me/nodes/"),
        page(
            vec![project_node("proj1", "Project One", false)],
            Some(&format!("{BASE}users/me/nodes/?page=2")),
        ),
    );
    transport.route(
        &format!("{BASE}users/me/nodes/?page=2"),
        page(vec![project_node("proj2", "Project Two", false)], None),
    );

    let mut inodes = all_projects(transport);
    let root = inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    assert!(matches!(root.kind, NodeKind::ProjectsRoot));

    let first = inodes
        .find_by_name(ROOT_INODE, "proj1")
        .await
        .expect("proj1 lookup")
        .expect("proj1 exists");
    let second = inodes
        .find_by_name(ROOT_INODE, "proj2")
        .await
        .expect("proj2 lookup")
        .expect("proj2 exists");
    assert_eq!(node_name(&inodes, first), "proj1");
    assert_eq!(node_name(&inodes, second), "proj2");

    // Two pages were fetched for the first lookup; the second was served
    // entirely from the listing cache.
    assert_eq!(inodes.client().request_count(), 2);
}

#[tokio::test]
async fn attributes_file_serves_fresh_project_metadata() {
    let transport = FakeTransport::new();
    transport.route(
        &format!("{BASE}users/me/nodes/"),
        page(vec![project_node("proj1", "Project One", false)], None),
    );
    transport.route(&format!("{BASE}nodes/proj1/files/"), page(vec![], None));
    transport.route(
        &format!("{BASE}nodes/proj1/"),
        json!({
            "data": {
                "id": "proj1",
                "type": "nodes",
                "attributes": {
                    "title": "Project One (updated)",
                    "date_created": "2020-01-01T00:00:00Z",
                }
            }
        }),
    );

    let mut inodes = all_projects(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let project = inodes
        .find_by_name(ROOT_INODE, "proj1")
        .await
        .expect("project lookup")
        .expect("project exists");

    let attributes = inodes
        .find_by_name(project, ".attributes.json")
        .await
        .expect("attributes lookup")
        .expect("attributes exists");
    assert_eq!(node_name(&inodes, attributes), ".attributes.json");
    assert!(inodes.node(attributes).expect("known").read_only());

    let content = inodes
        .attributes_json(attributes)
        .await
        .expect("attributes fetch");
    let payload: Value = serde_json::from_slice(&content).expect("valid JSON");
    assert_eq!(payload["title"], "Project One (updated)");

    // Keys are sorted and the indent is two spaces.
    let text = String::from_utf8(content.clone()).expect("utf-8");
    assert!(text.starts_with("{\n  \"date_created\""));
    assert!(!text.ends_with('\n'));

    // The fresh attributes were stored on both inodes.
    match &inodes.node(project).expect("known").kind {
        NodeKind::Project(node) => {
            assert_eq!(node.metadata["title"], "Project One (updated)");
        }
        other => panic!("unexpected kind: {other:?}"),
    }
    let size = inodes
        .entries()
        .size(inodes.node(attributes).expect("known"))
        .and_then(|value| value.as_bytes());
    assert_eq!(size, Some(content.len() as u64));
}

#[tokio::test]
async fn registrations_and_malformed_nodes_are_excluded() {
    let transport = FakeTransport::new();
    transport.route(
        &format!("{BASE}users/me/nodes/"),
        page(
            vec![
                project_node("proj1", "Project One", false),
                project_node("reg1", "A Registration", true),
                json!({ "id": "", "type": "nodes", "attributes": {} }),
                json!({ "id": "other", "type": "registrations", "attributes": {} }),
            ],
            None,
        ),
    );

    let mut inodes = all_projects(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let children = inodes.children_of(ROOT_INODE).await.expect("listing");
    let names: Vec<String> = children
        .iter()
        .map(|child| node_name(&inodes, *child))
        .collect();
    assert_eq!(names, vec!["proj1"]);
}

#[tokio::test]
async fn new_file_is_promoted_in_place() {
    let transport = single_project_transport();
    transport.route(
        &format!("{BASE}nodes/test/files/osfstorage/"),
        page(vec![file_resource("x", "/f9", 3)], None),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");

    let pending = inodes.register(storage, "x").await.expect("register");
    match &inodes.node(pending).expect("known").kind {
        NodeKind::File(file) => assert!(file.is_new()),
        other => panic!("unexpected kind: {other:?}"),
    }

    // The remote listing now contains the authoritative file; the lookup
    // must keep the number and swap the backing object.
    let resolved = inodes
        .find_by_name(storage, "x")
        .await
        .expect("lookup")
        .expect("file exists");
    assert_eq!(resolved, pending);
    match &inodes.node(resolved).expect("known").kind {
        NodeKind::File(file) => {
            assert!(!file.is_new());
            assert_eq!(file.latest().expect("remote object").remote_path(), "/f9");
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[tokio::test]
async fn register_then_lookup_returns_the_placeholder() {
    let transport = single_project_transport();
    transport.route(&format!("{BASE}nodes/test/files/osfstorage/"), page(vec![], None));

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");

    let pending = inodes.register(storage, "draft.txt").await.expect("register");
    let found = inodes
        .find_by_name(storage, "draft.txt")
        .await
        .expect("lookup")
        .expect("placeholder found");
    assert_eq!(found, pending);
}

#[tokio::test]
async fn removed_inodes_keep_their_slot_but_lose_their_identity() {
    let transport = single_project_transport();
    transport.route(
        &format!("{BASE}nodes/test/files/osfstorage/"),
        page(vec![file_resource("x", "/f9", 3)], None),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");
    let file = inodes
        .find_by_name(storage, "x")
        .await
        .expect("lookup")
        .expect("file exists");

    inodes.mark_removed(file);
    inodes.invalidate(storage, None).expect("invalidate parent");

    let replacement = inodes
        .find_by_name(storage, "x")
        .await
        .expect("lookup")
        .expect("file exists");
    assert_ne!(replacement, file);
    assert!(inodes.node(file).expect("tombstone remains").removed);
}

#[tokio::test]
async fn invalidate_forces_a_fresh_listing() {
    let transport = single_project_transport();
    transport.route(
        &format!("{BASE}nodes/test/files/osfstorage/"),
        page(
            vec![folder_resource("b", "/f1/", &format!("{BASE}folders/f1/"))],
            None,
        ),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");

    let listing_url = format!("{BASE}nodes/test/files/osfstorage/");
    inodes.find_by_name(storage, "b").await.expect("first lookup");
    let after_first = inodes.client().requests_to(&listing_url);

    inodes.find_by_name(storage, "b").await.expect("cached lookup");
    assert_eq!(inodes.client().requests_to(&listing_url), after_first);

    inodes.invalidate(storage, None).expect("invalidate");
    inodes.find_by_name(storage, "b").await.expect("fresh lookup");
    assert_eq!(inodes.client().requests_to(&listing_url), after_first + 1);
}

#[tokio::test]
async fn cached_listing_without_a_match_falls_through() {
    let transport = single_project_transport();
    let listing_url = format!("{BASE}nodes/test/files/osfstorage/");
    transport.route(&listing_url, page(vec![file_resource("a", "/f1", 1)], None));
    transport.route(
        &listing_url,
        page(
            vec![file_resource("a", "/f1", 1), file_resource("new.txt", "/f2", 2)],
            None,
        ),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");

    inodes.find_by_name(storage, "a").await.expect("install cache");
    // The cached listing predates the write that created new.txt; the
    // resolver must not give up on the cache miss.
    let found = inodes
        .find_by_name(storage, "new.txt")
        .await
        .expect("fall-through lookup")
        .expect("fresh entry found");
    assert_eq!(node_name(&inodes, found), "new.txt");
    assert_eq!(inodes.client().requests_to(&listing_url), 2);
}

#[tokio::test]
async fn pagination_stops_on_a_revisited_url() {
    let transport = FakeTransport::new();
    let first_issued = format!("{BASE}users/me/nodes/?page%5Bsize%5D=100");
    transport.route(
        &format!("{BASE}users/me/nodes/"),
        page(
            vec![project_node("proj1", "Project One", false)],
            Some(&format!("{BASE}users/me/nodes/?page=2")),
        ),
    );
    transport.route(
        &format!("{BASE}users/me/nodes/?page=2"),
        page(
            vec![project_node("proj2", "Project Two", false)],
            // points back at the URL the iteration started from
            Some(&first_issued),
        ),
    );

    let mut inodes = all_projects(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let children = inodes.children_of(ROOT_INODE).await.expect("listing");
    assert_eq!(children.len(), 2);
    assert_eq!(inodes.client().request_count(), 2);
}

#[tokio::test]
async fn kind_mismatch_is_a_hard_error_and_preserves_attributes() {
    let transport = single_project_transport();
    let listing_url = format!("{BASE}nodes/test/files/osfstorage/");
    transport.route(&listing_url, page(vec![file_resource("b", "/f1", 7)], None));
    transport.route(
        &listing_url,
        page(
            vec![folder_resource("b", "/f1/", &format!("{BASE}folders/f1/"))],
            None,
        ),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");
    let file = inodes
        .find_by_name(storage, "b")
        .await
        .expect("lookup")
        .expect("file exists");

    let err = inodes
        .refresh(file, true)
        .await
        .expect_err("kind change must fail");
    assert!(matches!(err, FsError::IsADirectory));

    // The cached attributes were not overwritten by the folder object.
    match &inodes.node(file).expect("known").kind {
        NodeKind::File(node) => {
            let latest = node.latest().expect("remote object");
            assert_eq!(latest.kind, RemoteKind::File);
            assert_eq!(latest.size.as_ref().and_then(|s| s.as_bytes()), Some(7));
        }
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[tokio::test]
async fn virtual_entries_precede_storages_in_project_listings() {
    let transport = single_project_transport();
    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");

    let children = inodes.children_of(ROOT_INODE).await.expect("listing");
    let names: Vec<String> = children
        .iter()
        .map(|child| node_name(&inodes, *child))
        .collect();
    assert_eq!(names, vec![".attributes.json", ".children", ".linked", "osfstorage"]);
}

#[tokio::test]
async fn child_and_linked_projects_list_through_their_virtual_directories() {
    let transport = FakeTransport::new();
    transport.route(
        &format!("{BASE}users/me/nodes/"),
        page(vec![project_node("proj1", "Project One", false)], None),
    );
    transport.route(&format!("{BASE}nodes/proj1/files/"), page(vec![], None));
    transport.route(
        &format!("{BASE}nodes/proj1/children/"),
        page(vec![project_node("child1", "Child Project", false)], None),
    );
    transport.route(
        &format!("{BASE}nodes/proj1/linked_nodes/"),
        page(vec![project_node("linked1", "Linked Project", false)], None),
    );

    let mut inodes = all_projects(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let project = inodes
        .find_by_name(ROOT_INODE, "proj1")
        .await
        .expect("project lookup")
        .expect("project exists");

    let children_dir = inodes
        .find_by_name(project, ".children")
        .await
        .expect("children lookup")
        .expect("children dir");
    let child = inodes
        .find_by_name(children_dir, "child1")
        .await
        .expect("child lookup")
        .expect("child exists");
    assert_eq!(node_name(&inodes, child), "child1");
    assert_eq!(
        inodes.entries().display_path(inodes.node(child).expect("known")),
        "/proj1/.children/child1/"
    );

    let linked_dir = inodes
        .find_by_name(project, ".linked")
        .await
        .expect("linked lookup")
        .expect("linked dir");
    let linked = inodes
        .find_by_name(linked_dir, "linked1")
        .await
        .expect("linked child lookup")
        .expect("linked exists");
    assert_eq!(node_name(&inodes, linked), "linked1");
}

#[tokio::test]
async fn unknown_inodes_resolve_to_none_but_fail_invalidation() {
    let transport = single_project_transport();
    let mut inodes = single_project(transport);

    assert!(inodes.get(99).await.expect("lookup").is_none());
    let err = inodes.invalidate(99, None).expect_err("must fail");
    assert!(matches!(err, FsError::UnknownInode(99)));
}

#[tokio::test]
async fn lookup_under_a_file_is_not_a_directory() {
    let transport = single_project_transport();
    transport.route(
        &format!("{BASE}nodes/test/files/osfstorage/"),
        page(vec![file_resource("a", "/f1", 1)], None),
    );

    let mut inodes = single_project(transport);
    inodes.get(ROOT_INODE).await.expect("root").expect("root inode");
    let storage = inodes
        .find_by_name(ROOT_INODE, "osfstorage")
        .await
        .expect("storage lookup")
        .expect("storage exists");
    let file = inodes
        .find_by_name(storage, "a")
        .await
        .expect("lookup")
        .expect("file exists");

    let err = inodes
        .find_by_name(file, "nested")
        .await
        .expect_err("files have no children");
    assert!(matches!(err, FsError::NotADirectory));
}
