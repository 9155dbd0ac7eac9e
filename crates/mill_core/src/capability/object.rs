//! Object-storage capability.

use async_trait::async_trait;

use crate::error::CoreResult;

/// Read side of object storage plus the server-side recovery hook.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the text stored under `key`.
    async fn download(&self, key: &str) -> CoreResult<String>;

    /// Ask the backend to re-materialize the bridge copy for an external
    /// job reference. Returns the bridge path it wrote.
    ///
    /// Used when a managed program's bridge file has gone missing; the
    /// caller retries the bridge read once after this succeeds.
    async fn ensure_bridge_copy(&self, request_id: &str) -> CoreResult<String>;
}
