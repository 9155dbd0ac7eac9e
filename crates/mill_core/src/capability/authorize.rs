//! Write-authorization gate for machine-resident edits.
//!
//! Direct writes to legacy (unmanaged) machine programs are gated; the host
//! application supplies the interactive implementation (a daily PIN prompt
//! in production). Denial or dismissal both come back as `false`; the
//! caller aborts silently rather than raising an error.

use async_trait::async_trait;

/// What the operator is about to write, for display in the prompt.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub machine_uid: String,
    pub program_no: u32,
    pub program_name: String,
}

/// Gate in front of unmanaged machine-resident writes.
#[async_trait]
pub trait WriteAuthorizer: Send + Sync {
    async fn authorize(&self, ctx: &WriteContext) -> bool;
}

/// Authorizer that grants everything. Useful when a deployment disables the
/// gate, and in tests.
pub struct AlwaysAllow;

#[async_trait]
impl WriteAuthorizer for AlwaysAllow {
    async fn authorize(&self, _ctx: &WriteContext) -> bool {
        true
    }
}

/// Authorizer that denies everything.
pub struct AlwaysDeny;

#[async_trait]
impl WriteAuthorizer for AlwaysDeny {
    async fn authorize(&self, _ctx: &WriteContext) -> bool {
        false
    }
}
