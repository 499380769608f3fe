//! In-process backend honoring the same one-time contract as the HTTP API

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::sync::Mutex;

use ots_core::{Clock, OpaqueId, OtsError, OtsResult, SystemClock};
use ots_crypto::{decode_wire, EntropySource, OsEntropy, WireBlob};

use crate::{FetchOutcome, SecretBackend, StoreReceipt};

/// Random bytes per generated ID (22 base64url characters).
const ID_BYTES: usize = 16;

#[derive(Debug)]
enum Slot {
    Live { blob: WireBlob, expires_at: u64 },
    Consumed,
    Expired,
}

/// Stores envelopes in a map guarded by a single lock.
///
/// A fetch checks, returns and tombstones a record within one critical
/// section, so concurrent reveals of the same ID see exactly one `Found`.
/// Tombstones are kept so later reads report `Consumed` or `Expired`
/// rather than `NotFound`.
pub struct MemoryBackend {
    slots: Mutex<HashMap<OpaqueId, Slot>>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    stores: AtomicUsize,
    fetches: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Backend whose expiry decisions follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
            entropy: Arc::new(OsEntropy),
            stores: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of `store` calls received.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Number of `fetch_and_delete` calls received.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Records still holding ciphertext.
    pub async fn live_count(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|s| matches!(s, Slot::Live { .. }))
            .count()
    }

    fn fresh_id(&self) -> OtsResult<OpaqueId> {
        let mut raw = [0u8; ID_BYTES];
        self.entropy.fill(&mut raw)?;
        OpaqueId::new(URL_SAFE_NO_PAD.encode(raw))
            .map_err(|e| OtsError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl SecretBackend for MemoryBackend {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt> {
        self.stores.fetch_add(1, Ordering::SeqCst);

        // The backend reads the public header for its expiry bookkeeping
        // only; the payload stays opaque.
        let expires_at = decode_wire(blob)?.expires_at;

        let mut slots = self.slots.lock().await;
        let id = loop {
            let candidate = self.fresh_id()?;
            if !slots.contains_key(&candidate) {
                break candidate;
            }
        };
        slots.insert(
            id.clone(),
            Slot::Live {
                blob: blob.clone(),
                expires_at,
            },
        );
        tracing::debug!(id = %id, expires_at, "memory backend stored envelope");

        Ok(StoreReceipt {
            id,
            expires_at: Some(expires_at),
        })
    }

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();

        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(id) else {
            return Ok(FetchOutcome::NotFound);
        };

        if matches!(slot, Slot::Live { expires_at, .. } if now >= *expires_at) {
            *slot = Slot::Expired;
        }

        // Leave a tombstone in place of whatever was there.
        let outcome = match std::mem::replace(slot, Slot::Consumed) {
            Slot::Live { blob, .. } => FetchOutcome::Found(blob),
            Slot::Consumed => FetchOutcome::Consumed,
            Slot::Expired => {
                *slot = Slot::Expired;
                FetchOutcome::Expired
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_core::{CipherKind, ManualClock};
    use ots_crypto::{encode_wire, Envelope, Nonce, SecretKey};

    fn blob(created_at: u64, expires_at: u64) -> WireBlob {
        let key = SecretKey::from_bytes([3u8; 32]);
        let env = Envelope::seal(
            &key,
            Nonce::from_bytes([4u8; 12]),
            CipherKind::ChaCha20Poly1305,
            b"payload",
            created_at,
            expires_at,
        )
        .unwrap();
        encode_wire(&env).unwrap()
    }

    #[tokio::test]
    async fn test_store_then_fetch_once() {
        let backend = MemoryBackend::with_clock(Arc::new(ManualClock::new(100)));
        let stored = blob(100, 200);

        let receipt = backend.store(&stored).await.unwrap();
        assert_eq!(receipt.expires_at, Some(200));
        assert_eq!(receipt.id.as_str().len(), 22);

        let first = backend.fetch_and_delete(&receipt.id).await.unwrap();
        assert_eq!(first, FetchOutcome::Found(stored));

        let second = backend.fetch_and_delete(&receipt.id).await.unwrap();
        assert_eq!(second, FetchOutcome::Consumed);
        assert_eq!(backend.live_count().await, 0);
        assert_eq!(backend.store_count(), 1);
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let backend = MemoryBackend::new();
        let id = OpaqueId::new("nope").unwrap();
        assert_eq!(backend.fetch_and_delete(&id).await.unwrap(), FetchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_expiry_uses_backend_clock() {
        let clock = Arc::new(ManualClock::new(100));
        let backend = MemoryBackend::with_clock(clock.clone());
        let receipt = backend.store(&blob(100, 160)).await.unwrap();

        clock.set(160);
        assert_eq!(
            backend.fetch_and_delete(&receipt.id).await.unwrap(),
            FetchOutcome::Expired
        );
        // stays expired, never resurrected
        clock.set(100);
        assert_eq!(
            backend.fetch_and_delete(&receipt.id).await.unwrap(),
            FetchOutcome::Expired
        );
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let backend = MemoryBackend::with_clock(Arc::new(ManualClock::new(0)));
        let a = backend.store(&blob(0, 60)).await.unwrap();
        let b = backend.store(&blob(0, 60)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(backend.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_rejects_malformed_envelope() {
        let backend = MemoryBackend::new();
        let err = backend
            .store(&WireBlob::from(b"not json".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, OtsError::MalformedEnvelope(_)));
        assert_eq!(backend.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_yields_single_winner() {
        let backend = Arc::new(MemoryBackend::with_clock(Arc::new(ManualClock::new(0))));
        let receipt = backend.store(&blob(0, 3600)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let backend = backend.clone();
            let id = receipt.id.clone();
            handles.push(tokio::spawn(async move {
                backend.fetch_and_delete(&id).await.unwrap()
            }));
        }

        let mut found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                FetchOutcome::Found(_) => found += 1,
                FetchOutcome::Consumed => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(found, 1, "exactly one fetch may see the envelope");
    }
}
