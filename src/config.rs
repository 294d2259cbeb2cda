//! Cache and paging tunables.
//!
//! Compiled defaults match the service's design values; an optional
//! `rdmfs.toml` next to the working directory may override them. A missing
//! or unreadable file silently falls back to the defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

const CONFIG_FILE: &str = "rdmfs.toml";

fn default_list_cache_ttl() -> u64 {
    180
}

fn default_attribute_cache_ttl() -> u64 {
    60
}

fn default_list_cache_capacity() -> usize {
    256
}

fn default_page_size() -> u32 {
    100
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    /// Seconds a directory listing stays valid.
    #[serde(default = "default_list_cache_ttl")]
    pub list_cache_ttl_secs: u64,
    /// Seconds file/folder attributes stay valid before a refetch.
    #[serde(default = "default_attribute_cache_ttl")]
    pub attribute_cache_ttl_secs: u64,
    /// Number of directory listings kept before LRU eviction.
    #[serde(default = "default_list_cache_capacity")]
    pub list_cache_capacity: usize,
    /// `page[size]` applied to paginated node listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_cache_ttl_secs: default_list_cache_ttl(),
            attribute_cache_ttl_secs: default_attribute_cache_ttl(),
            list_cache_capacity: default_list_cache_capacity(),
            page_size: default_page_size(),
        }
    }
}

impl CacheConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_cache_ttl_secs)
    }

    pub fn attribute_ttl(&self) -> Duration {
        Duration::from_secs(self.attribute_cache_ttl_secs)
    }

    pub fn load() -> Self {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!("could not read {CONFIG_FILE}: {err}; using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("could not parse {CONFIG_FILE}: {err}; using defaults");
                Self::default()
            }
        }
    }
}

/// Ownership and permission bits applied to every entry of the mount.
#[derive(Clone, Copy, Debug)]
pub struct MountConfig {
    pub file_mode: u16,
    pub dir_mode: u16,
    pub uid: u32,
    pub gid: u32,
}
