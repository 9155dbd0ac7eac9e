//! Bridge file-server capability.
//!
//! The bridge is a plain file share sitting between object storage and the
//! machines. Paths are absolute, forward-slash, rooted at the share.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// One entry of a bridge directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEntry {
    /// Entry name without the directory prefix.
    pub name: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size_bytes: u64,
}

/// File operations on the bridge share.
///
/// `read_file`/`delete_file` on a missing path return
/// `CoreError::NotFound`; callers rely on that to drive recovery.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    async fn list_dir(&self, path: &str) -> CoreResult<Vec<BridgeEntry>>;
    async fn read_file(&self, path: &str) -> CoreResult<String>;
    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()>;
    async fn delete_file(&self, path: &str) -> CoreResult<()>;
    async fn mkdir(&self, path: &str) -> CoreResult<()>;
    async fn rename(&self, from: &str, to: &str) -> CoreResult<()>;
    async fn delete_dir(&self, path: &str) -> CoreResult<()>;

    async fn exists(&self, path: &str) -> CoreResult<bool> {
        match self.read_file(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Join a bridge directory and an entry name.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_root_and_trailing_slash() {
        assert_eq!(join_path("/", "a.nc"), "/a.nc");
        assert_eq!(join_path("", "a.nc"), "/a.nc");
        assert_eq!(join_path("/NCDATA/", "a.nc"), "/NCDATA/a.nc");
        assert_eq!(join_path("/NCDATA", "a.nc"), "/NCDATA/a.nc");
    }
}
