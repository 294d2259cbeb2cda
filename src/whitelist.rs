//! Writable-path whitelist.
//!
//! When a whitelist is mounted, only entries whose display path equals a
//! whitelisted path or lies below a whitelisted directory accept writes;
//! everything else is exposed read-only.

use std::fs;
use std::io;
use std::path::Path;

pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Loads one display path per line; blank lines and `#` comments are
    /// ignored. Entries are normalized to a leading slash.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                if line.starts_with('/') {
                    line.to_owned()
                } else {
                    format!("/{line}")
                }
            })
            .collect();
        Self { entries }
    }

    pub fn allows(&self, display_path: &str) -> bool {
        let path = display_path.trim_end_matches('/');
        self.entries.iter().any(|entry| {
            let entry = entry.trim_end_matches('/');
            path == entry || path.starts_with(&format!("{entry}/"))
        })
    }
}
