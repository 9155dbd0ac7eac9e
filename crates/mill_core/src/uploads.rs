//! Bridge share browser: uploads and directory maintenance.
//!
//! Uploads run as a batch with per-file collision handling. Cancelling a
//! collision skips that one file; the rest of the batch continues.
//! Deleting a non-empty directory is a two-step: the first call reports
//! what is inside and asks for confirmation.

use std::sync::Arc;
use tracing::{info, warn};

use crate::capability::bridge::join_path;
use crate::capability::{BridgeEntry, BridgeStore};
use crate::error::CoreResult;
use crate::naming::{next_free_name, ConflictDecision, ConflictInfo, ConflictPolicy};

/// One file in an upload batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: String,
}

/// What happened to one file of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Written under its original name.
    Uploaded { path: String },
    /// Collision resolved by taking a free name.
    Renamed { path: String, original: String },
    /// Collision resolved by replacing the existing file.
    Overwrote { path: String },
    /// Operator cancelled this file.
    Skipped { name: String },
}

/// Result of a directory delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteDirOutcome {
    Deleted,
    /// The directory has contents; call again with `confirmed = true` to
    /// delete anyway.
    NeedsConfirmation { entries: Vec<String> },
}

/// File-management front for the bridge share.
pub struct BridgeBrowser {
    bridge: Arc<dyn BridgeStore>,
}

impl BridgeBrowser {
    pub fn new(bridge: Arc<dyn BridgeStore>) -> Self {
        Self { bridge }
    }

    pub async fn list(&self, dir: &str) -> CoreResult<Vec<BridgeEntry>> {
        self.bridge.list_dir(dir).await
    }

    pub async fn mkdir(&self, path: &str) -> CoreResult<()> {
        self.bridge.mkdir(path).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> CoreResult<()> {
        info!(from, to, "bridge entry renamed");
        self.bridge.rename(from, to).await
    }

    pub async fn delete_file(&self, path: &str) -> CoreResult<()> {
        info!(path, "bridge file deleted");
        self.bridge.delete_file(path).await
    }

    /// Delete a directory, demanding confirmation when it is not empty.
    pub async fn delete_dir(&self, path: &str, confirmed: bool) -> CoreResult<DeleteDirOutcome> {
        let entries = self.bridge.list_dir(path).await?;
        if !entries.is_empty() && !confirmed {
            return Ok(DeleteDirOutcome::NeedsConfirmation {
                entries: entries.into_iter().map(|e| e.name).collect(),
            });
        }
        self.bridge.delete_dir(path).await?;
        info!(path, "bridge directory deleted");
        Ok(DeleteDirOutcome::Deleted)
    }

    /// Upload a batch of files into `dir`.
    ///
    /// Name comparison against the share is case-insensitive. Files the
    /// batch itself writes count as occupied for the files after them, so
    /// two colliding files in one batch cannot land on the same free name.
    pub async fn upload(
        &self,
        dir: &str,
        files: Vec<UploadFile>,
        policy: &dyn ConflictPolicy,
    ) -> CoreResult<Vec<UploadOutcome>> {
        let mut occupied: Vec<String> = self
            .bridge
            .list_dir(dir)
            .await?
            .into_iter()
            .map(|e| e.name.to_lowercase())
            .collect();

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let exists = |n: &str| occupied.contains(&n.to_lowercase());
            let outcome = if !exists(&file.name) {
                let path = join_path(dir, &file.name);
                self.bridge.write_file(&path, &file.content).await?;
                occupied.push(file.name.to_lowercase());
                UploadOutcome::Uploaded { path }
            } else {
                let suggested = next_free_name(&file.name, exists)?;
                let decision = policy
                    .resolve(&ConflictInfo {
                        name: file.name.clone(),
                        suggested: suggested.clone(),
                    })
                    .await;
                match decision {
                    ConflictDecision::Overwrite => {
                        let path = join_path(dir, &file.name);
                        self.bridge.write_file(&path, &file.content).await?;
                        UploadOutcome::Overwrote { path }
                    }
                    ConflictDecision::AutoRename => {
                        let path = join_path(dir, &suggested);
                        self.bridge.write_file(&path, &file.content).await?;
                        occupied.push(suggested.to_lowercase());
                        UploadOutcome::Renamed {
                            path,
                            original: file.name.clone(),
                        }
                    }
                    ConflictDecision::Cancel => {
                        warn!(name = %file.name, "upload skipped by operator");
                        UploadOutcome::Skipped {
                            name: file.name.clone(),
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::naming::FixedPolicy;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapBridge {
        files: Mutex<HashMap<String, String>>,
        dirs: Mutex<Vec<String>>,
    }

    impl MapBridge {
        fn with(files: &[&str]) -> Self {
            let b = Self::default();
            for f in files {
                b.files.lock().insert(f.to_string(), String::new());
            }
            b
        }
    }

    #[async_trait]
    impl BridgeStore for MapBridge {
        async fn list_dir(&self, path: &str) -> CoreResult<Vec<BridgeEntry>> {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            Ok(self
                .files
                .lock()
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix))
                .filter(|rest| !rest.contains('/'))
                .map(|name| BridgeEntry {
                    name: name.to_string(),
                    is_dir: false,
                    size_bytes: 0,
                })
                .collect())
        }
        async fn read_file(&self, path: &str) -> CoreResult<String> {
            self.files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| CoreError::not_found(path))
        }
        async fn write_file(&self, path: &str, content: &str) -> CoreResult<()> {
            self.files.lock().insert(path.into(), content.into());
            Ok(())
        }
        async fn delete_file(&self, path: &str) -> CoreResult<()> {
            self.files.lock().remove(path);
            Ok(())
        }
        async fn mkdir(&self, path: &str) -> CoreResult<()> {
            self.dirs.lock().push(path.into());
            Ok(())
        }
        async fn rename(&self, from: &str, to: &str) -> CoreResult<()> {
            let mut files = self.files.lock();
            if let Some(content) = files.remove(from) {
                files.insert(to.into(), content);
            }
            Ok(())
        }
        async fn delete_dir(&self, path: &str) -> CoreResult<()> {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            self.files.lock().retain(|k, _| !k.starts_with(&prefix));
            Ok(())
        }
    }

    fn files(names: &[&str]) -> Vec<UploadFile> {
        names
            .iter()
            .map(|n| UploadFile {
                name: n.to_string(),
                content: "G0 X0".into(),
            })
            .collect()
    }

    #[tokio::test]
    async fn cancel_skips_only_that_file() {
        let bridge = Arc::new(MapBridge::with(&["/NC/a.nc"]));
        let browser = BridgeBrowser::new(bridge.clone());
        let outcomes = browser
            .upload(
                "/NC",
                files(&["a.nc", "b.nc"]),
                &FixedPolicy(ConflictDecision::Cancel),
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0], UploadOutcome::Skipped { name: "a.nc".into() });
        assert!(matches!(outcomes[1], UploadOutcome::Uploaded { .. }));
        assert!(bridge.files.lock().contains_key("/NC/b.nc"));
    }

    #[tokio::test]
    async fn auto_rename_within_one_batch_stays_unique() {
        let bridge = Arc::new(MapBridge::with(&["/NC/O3001.nc"]));
        let browser = BridgeBrowser::new(bridge.clone());
        let outcomes = browser
            .upload(
                "/NC",
                files(&["O3001.nc", "O3001.nc"]),
                &FixedPolicy(ConflictDecision::AutoRename),
            )
            .await
            .unwrap();
        assert_eq!(
            outcomes[0],
            UploadOutcome::Renamed {
                path: "/NC/O3002.nc".into(),
                original: "O3001.nc".into()
            }
        );
        assert_eq!(
            outcomes[1],
            UploadOutcome::Renamed {
                path: "/NC/O3003.nc".into(),
                original: "O3001.nc".into()
            }
        );
    }

    #[tokio::test]
    async fn collision_check_is_case_insensitive() {
        let bridge = Arc::new(MapBridge::with(&["/NC/PART.NC"]));
        let browser = BridgeBrowser::new(bridge.clone());
        let outcomes = browser
            .upload(
                "/NC",
                files(&["part.nc"]),
                &FixedPolicy(ConflictDecision::AutoRename),
            )
            .await
            .unwrap();
        assert!(matches!(outcomes[0], UploadOutcome::Renamed { .. }));
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_content() {
        let bridge = Arc::new(MapBridge::with(&["/NC/a.nc"]));
        let browser = BridgeBrowser::new(bridge.clone());
        browser
            .upload(
                "/NC",
                files(&["a.nc"]),
                &FixedPolicy(ConflictDecision::Overwrite),
            )
            .await
            .unwrap();
        assert_eq!(bridge.files.lock()["/NC/a.nc"], "G0 X0");
    }

    #[tokio::test]
    async fn nonempty_dir_delete_needs_confirmation() {
        let bridge = Arc::new(MapBridge::with(&["/NC/sub/a.nc"]));
        let browser = BridgeBrowser::new(bridge.clone());
        let outcome = browser.delete_dir("/NC/sub", false).await.unwrap();
        assert_eq!(
            outcome,
            DeleteDirOutcome::NeedsConfirmation {
                entries: vec!["a.nc".into()]
            }
        );
        let outcome = browser.delete_dir("/NC/sub", true).await.unwrap();
        assert_eq!(outcome, DeleteDirOutcome::Deleted);
        assert!(bridge.files.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_dir_delete_skips_confirmation() {
        let bridge = Arc::new(MapBridge::default());
        let browser = BridgeBrowser::new(bridge);
        let outcome = browser.delete_dir("/NC/empty", false).await.unwrap();
        assert_eq!(outcome, DeleteDirOutcome::Deleted);
    }
}
