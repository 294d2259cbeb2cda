//! OSF API transport and the typed views over its JSON-API documents.
//!
//! The filesystem core talks to the remote service exclusively through the
//! [`Transport`] trait, so tests can substitute canned payloads for a live
//! server. [`OsfClient`] is the production implementation over `reqwest`.

use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

use crate::fs::error::FsError;

pub type JsonMap = Map<String, Value>;

/// The remote-service contract consumed by the inode layer.
///
/// `get_json` performs a GET, checks the status and parses the body;
/// `build_url` joins path segments onto the API base with a trailing slash,
/// matching the URL style of the OSF v2 API.
pub trait Transport {
    fn build_url(&self, segments: &[&str]) -> Url;

    async fn get_json(&self, url: &Url) -> Result<Value, FsError>;

    async fn get_bytes(&self, url: &Url) -> Result<Bytes, FsError>;

    async fn put_bytes(&self, url: &Url, body: Bytes) -> Result<Value, FsError>;

    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, FsError>;

    async fn delete(&self, url: &Url) -> Result<(), FsError>;
}

pub const DEFAULT_BASE_URL: &str = "https://api.osf.io/v2/";

/// Authenticated `reqwest` client for the OSF v2 API.
pub struct OsfClient {
    http: reqwest::Client,
    base: Url,
    auth: Option<(String, String)>,
}

impl OsfClient {
    pub fn new(
        base_url: Option<&str>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, url::ParseError> {
        let base = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        let auth = match (username, password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            auth,
        })
    }

    fn request(&self, method: reqwest::Method, url: &Url) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url.clone());
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, FsError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FsError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl Transport for OsfClient {
    fn build_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
            // OSF endpoints end with a slash
            path.push("");
        }
        url
    }

    async fn get_json(&self, url: &Url) -> Result<Value, FsError> {
        let response = self.send(self.request(reqwest::Method::GET, url), url).await?;
        Ok(response.json().await?)
    }

    async fn get_bytes(&self, url: &Url) -> Result<Bytes, FsError> {
        let response = self.send(self.request(reqwest::Method::GET, url), url).await?;
        Ok(response.bytes().await?)
    }

    async fn put_bytes(&self, url: &Url, body: Bytes) -> Result<Value, FsError> {
        let builder = self.request(reqwest::Method::PUT, url).body(body);
        let response = self.send(builder, url).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, FsError> {
        let builder = self.request(reqwest::Method::POST, url).json(body);
        let response = self.send(builder, url).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, url: &Url) -> Result<(), FsError> {
        self.send(self.request(reqwest::Method::DELETE, url), url)
            .await?;
        Ok(())
    }
}

/// A project node, either the mounted one or one discovered through a
/// listing. `attributes` keeps the full attribute dictionary so the
/// `.attributes.json` virtual file can serve it without a refetch.
#[derive(Clone, Debug)]
pub struct RemoteProject {
    pub id: String,
    pub title: Option<String>,
    pub files_url: Url,
    pub attributes: JsonMap,
}

/// A storage provider attached to a project.
#[derive(Clone, Debug)]
pub struct RemoteStorage {
    pub name: String,
    pub files_url: Url,
    pub upload_url: Option<Url>,
    pub new_folder_url: Option<Url>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Folder,
}

/// A file's size may arrive as a JSON number or as a decimal string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn as_bytes(&self) -> Option<u64> {
        match self {
            SizeValue::Bytes(n) => Some(*n),
            SizeValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A file or folder under a storage provider.
#[derive(Clone, Debug)]
pub struct RemoteObject {
    pub name: String,
    pub kind: RemoteKind,
    /// `attributes.path`, the provider-level identity path.
    pub path: Option<String>,
    /// `attributes.materialized_path`, the human-readable path.
    pub materialized: Option<String>,
    pub size: Option<SizeValue>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    /// Listing URL for a folder's children.
    pub files_url: Option<Url>,
    pub upload_url: Option<Url>,
    pub new_folder_url: Option<Url>,
    pub delete_url: Option<Url>,
    pub move_url: Option<Url>,
    pub download_url: Option<Url>,
}

impl RemoteObject {
    /// Identity path used for canonical-path construction: the provider
    /// path when present, the materialized path otherwise.
    pub fn remote_path(&self) -> &str {
        self.path
            .as_deref()
            .or(self.materialized.as_deref())
            .unwrap_or(&self.name)
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn url_at(value: &Value, pointer: &str) -> Option<Url> {
    str_at(value, pointer).and_then(|s| Url::parse(s).ok())
}

fn attributes_of(resource: &Value) -> JsonMap {
    resource
        .get("attributes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn files_related_url(resource: &Value) -> Option<Url> {
    url_at(resource, "/relationships/files/links/related/href")
        .or_else(|| str_at(resource, "/relationships/files/links/related").and_then(|s| Url::parse(s).ok()))
}

/// Builds a project view from one entry of a node listing, applying the
/// listing filter: only real, non-registration nodes with a non-empty id
/// are visible.
pub fn project_from_node<T: Transport>(client: &T, node: &Value) -> Option<RemoteProject> {
    if node.get("type").and_then(Value::as_str) != Some("nodes") {
        return None;
    }
    let attributes = attributes_of(node);
    if attributes
        .get("registration")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return None;
    }
    let id = node.get("id").and_then(Value::as_str)?;
    if id.is_empty() {
        return None;
    }
    let files_url =
        files_related_url(node).unwrap_or_else(|| client.build_url(&["nodes", id, "files"]));
    let title = attributes
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(RemoteProject {
        id: id.to_owned(),
        title,
        files_url,
        attributes,
    })
}

/// Fetches a single project document. Used for the root inode in
/// single-project mode.
pub async fn fetch_project<T: Transport>(client: &T, id: &str) -> Result<RemoteProject, FsError> {
    let url = client.build_url(&["nodes", id]);
    let payload = match client.get_json(&url).await {
        Ok(payload) => payload,
        Err(FsError::Status { status: 404, .. }) => return Err(FsError::NotFound),
        Err(err) => return Err(err),
    };
    let data = payload
        .get("data")
        .ok_or_else(|| FsError::InvalidResponse(format!("no data in {url}")))?;
    let resource_id = data
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(FsError::NotFound)?;
    let attributes = attributes_of(data);
    let files_url = files_related_url(data)
        .unwrap_or_else(|| client.build_url(&["nodes", resource_id, "files"]));
    let title = attributes
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Ok(RemoteProject {
        id: resource_id.to_owned(),
        title,
        files_url,
        attributes,
    })
}

/// Parses a storage-provider entry from a project's files listing.
/// Entries without a children listing URL are unusable and skipped.
pub fn parse_storage(resource: &Value) -> Option<RemoteStorage> {
    let attributes = attributes_of(resource);
    let name = attributes
        .get("provider")
        .or_else(|| attributes.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_owned();
    let files_url = files_related_url(resource)?;
    Some(RemoteStorage {
        name,
        files_url,
        upload_url: url_at(resource, "/links/upload"),
        new_folder_url: url_at(resource, "/links/new_folder"),
    })
}

/// Parses a file or folder entry from a storage or folder listing.
pub fn parse_remote_object(resource: &Value) -> Option<RemoteObject> {
    let attributes = attributes_of(resource);
    let name = attributes
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_owned();
    let kind = match attributes.get("kind").and_then(Value::as_str) {
        Some("folder") => RemoteKind::Folder,
        _ => RemoteKind::File,
    };
    let size = match attributes.get("size") {
        Some(Value::Number(n)) => n.as_u64().map(SizeValue::Bytes),
        Some(Value::String(s)) => Some(SizeValue::Text(s.clone())),
        _ => None,
    };
    let str_attr = |key: &str| {
        attributes
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    Some(RemoteObject {
        name,
        kind,
        path: str_attr("path"),
        materialized: str_attr("materialized_path").or_else(|| str_attr("materialized")),
        size,
        date_created: str_attr("date_created"),
        date_modified: str_attr("date_modified"),
        files_url: files_related_url(resource),
        upload_url: url_at(resource, "/links/upload"),
        new_folder_url: url_at(resource, "/links/new_folder"),
        delete_url: url_at(resource, "/links/delete"),
        move_url: url_at(resource, "/links/move"),
        download_url: url_at(resource, "/links/download"),
    })
}
