//! Work item enumeration.
//!
//! Produces the ordered items a job consumes: ports of a closed range in
//! ascending order, or the usable lines of a wordlist in file order. Empty
//! enumerations are rejected here, before any worker starts.

use crate::error::{ConfigError, ResourceError};
use crate::types::{Port, PortRange};
use std::path::Path;

/// Enumerate the ports of `[start, end]`.
pub fn port_items(start: u32, end: u32) -> Result<Vec<Port>, ConfigError> {
    let range = PortRange::from_bounds(start, end)
        .map_err(|e| ConfigError::InvalidPortRange(e.to_string()))?;
    Ok(range.iter().collect())
}

/// Read a wordlist and return its usable entries.
pub async fn wordlist_items(path: &Path) -> Result<Vec<String>, ResourceError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| ResourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

    let items = parse_wordlist(&String::from_utf8_lossy(&content));
    if items.is_empty() {
        return Err(ResourceError::EmptyWordlist {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(path = %path.display(), entries = items.len(), "loaded wordlist");
    Ok(items)
}

/// Split on line boundaries, trim, and drop blanks and `#` comments.
pub fn parse_wordlist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
