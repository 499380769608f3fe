//! ots-backend: storage collaborators for encrypted envelopes
//!
//! The backend only ever sees the wire envelope and hands out opaque IDs.
//! [`HttpBackend`] talks to the one-time secret API; [`MemoryBackend`]
//! implements the same contract in process for tests and local use.

pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use ots_core::{OpaqueId, OtsResult};
use ots_crypto::WireBlob;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Acknowledgement of a stored envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    pub id: OpaqueId,
    /// Expiry as recorded by the backend, when it reports one.
    pub expires_at: Option<u64>,
}

/// Result of a destructive read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(WireBlob),
    NotFound,
    Consumed,
    Expired,
}

/// Contract every backend must honor.
///
/// `fetch_and_delete` is atomic: at most one caller ever receives
/// `Found` for a given ID, and every later call sees `Consumed`.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt>;

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome>;
}

#[async_trait]
impl<T: SecretBackend + ?Sized> SecretBackend for Arc<T> {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt> {
        (**self).store(blob).await
    }

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome> {
        (**self).fetch_and_delete(id).await
    }
}
