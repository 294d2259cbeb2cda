//! rdmfs — mounts a remote research-data-management service as a POSIX
//! filesystem.
//!
//! Projects, their storage providers and the file trees below them are
//! exposed through ordinary filesystem calls; writes translate to remote
//! create/update/move/delete requests, optionally constrained by a
//! writable-path whitelist. The interesting part lives in
//! [`fs::inodes`]: stable inode numbers for objects whose native identity
//! is a path, bounded-staleness caching, and reconciliation of locally
//! created files with later authoritative listings.

pub mod api_client;
pub mod config;
pub mod fs;
pub mod whitelist;
