//! End-to-end share/reveal against the in-memory backend.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use ots_backend::{FetchOutcome, MemoryBackend, SecretBackend, StoreReceipt};
use ots_core::config::LifecycleConfig;
use ots_core::{CipherKind, ManualClock, OpaqueId, OtsError, OtsResult};
use ots_crypto::{decode_wire, EntropySource, ShareLink, WireBlob};
use ots_lifecycle::SecretClient;

const T0: u64 = 1_700_000_000;
const HOUR: Duration = Duration::from_secs(3600);

fn base() -> Url {
    Url::parse("https://ots.example.com").unwrap()
}

/// Client and backend sharing one manual clock.
fn setup() -> (SecretClient<Arc<MemoryBackend>>, Arc<MemoryBackend>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let backend = Arc::new(MemoryBackend::with_clock(clock.clone()));
    let client = SecretClient::new(backend.clone(), base(), LifecycleConfig::default())
        .with_clock(clock.clone());
    (client, backend, clock)
}

/// Records every stored blob before passing it on.
#[derive(Default)]
struct RecordingBackend {
    inner: MemoryBackend,
    stored: Mutex<Vec<WireBlob>>,
}

#[async_trait]
impl SecretBackend for RecordingBackend {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt> {
        self.stored.lock().unwrap().push(blob.clone());
        self.inner.store(blob).await
    }

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome> {
        self.inner.fetch_and_delete(id).await
    }
}

/// Rewrites the envelope header on its way back to the recipient.
struct TamperingBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl SecretBackend for TamperingBackend {
    async fn store(&self, blob: &WireBlob) -> OtsResult<StoreReceipt> {
        self.inner.store(blob).await
    }

    async fn fetch_and_delete(&self, id: &OpaqueId) -> OtsResult<FetchOutcome> {
        match self.inner.fetch_and_delete(id).await? {
            FetchOutcome::Found(blob) => {
                let mut value: serde_json::Value = serde_json::from_slice(blob.as_bytes()).unwrap();
                let expires = value["expiresAt"].as_u64().unwrap();
                value["expiresAt"] = serde_json::json!(expires + 86_400);
                Ok(FetchOutcome::Found(WireBlob::from(serde_json::to_vec(&value).unwrap())))
            }
            other => Ok(other),
        }
    }
}

/// Deterministic entropy: every fill writes the same pattern.
struct FixedEntropy(AtomicU8);

impl EntropySource for FixedEntropy {
    fn fill(&self, buf: &mut [u8]) -> OtsResult<()> {
        let seed = self.0.load(Ordering::SeqCst);
        buf.iter_mut().for_each(|b| *b = seed);
        Ok(())
    }
}

struct NoEntropy;

impl EntropySource for NoEntropy {
    fn fill(&self, _buf: &mut [u8]) -> OtsResult<()> {
        Err(OtsError::EntropyUnavailable("no entropy device".into()))
    }
}

fn replace_fragment(link: &ShareLink, fragment: &str) -> ShareLink {
    let (before, _) = link.as_str().split_once('#').unwrap();
    ShareLink::from(format!("{before}#{fragment}"))
}

fn replace_id(link: &ShareLink, id: &str) -> ShareLink {
    let mut url = Url::parse(link.as_str()).unwrap();
    url.path_segments_mut().unwrap().pop().push(id);
    ShareLink::from(String::from(url))
}

#[tokio::test]
async fn hunter2_scenario() {
    let (client, backend, _clock) = setup();

    let link = client
        .share(b"hunter2", HOUR, CipherKind::ChaCha20Poly1305)
        .await
        .unwrap();
    assert_eq!(backend.store_count(), 1, "share must make exactly one store call");

    let plaintext = client.reveal(&link).await.unwrap();
    assert_eq!(plaintext.as_slice(), b"hunter2");
    assert_eq!(backend.fetch_count(), 1, "reveal must make exactly one fetch");

    let second = client.reveal(&link).await.unwrap_err();
    assert!(matches!(second, OtsError::Consumed), "got {second:?}");

    let mismatched = replace_id(&link, "doesnotexist");
    let err = client.reveal(&mismatched).await.unwrap_err();
    assert!(matches!(err, OtsError::NotFound), "got {err:?}");
}

#[tokio::test]
async fn roundtrip_each_cipher() {
    let (client, _backend, _clock) = setup();
    for cipher in CipherKind::ALL {
        let secret = format!("secret for {cipher}");
        let link = client.share(secret.as_bytes(), HOUR, cipher).await.unwrap();
        assert!(link.as_str().contains(&format!("cipher={cipher}")));
        assert_eq!(client.reveal(&link).await.unwrap().as_slice(), secret.as_bytes());
    }
}

#[tokio::test]
async fn empty_secret_roundtrips() {
    let (client, _backend, _clock) = setup();
    let link = client.share(b"", HOUR, CipherKind::Aes256Gcm).await.unwrap();
    assert!(client.reveal(&link).await.unwrap().is_empty());
}

#[tokio::test]
async fn identical_shares_never_collide() {
    let backend = Arc::new(RecordingBackend::default());
    let client = SecretClient::new(backend.clone(), base(), LifecycleConfig::default());

    let a = client.share(b"same", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    let b = client.share(b"same", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    assert_ne!(a.as_str(), b.as_str());
    assert_ne!(a.as_str().split_once('#').unwrap().1, b.as_str().split_once('#').unwrap().1);

    let stored = backend.stored.lock().unwrap().clone();
    assert_eq!(stored.len(), 2);
    let first = decode_wire(&stored[0]).unwrap();
    let second = decode_wire(&stored[1]).unwrap();
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[tokio::test]
async fn backend_never_sees_plaintext_or_key() {
    let backend = Arc::new(RecordingBackend::default());
    let client = SecretClient::new(backend.clone(), base(), LifecycleConfig::default());
    let link = client
        .share(b"correct horse battery staple", HOUR, CipherKind::Aes256Gcm)
        .await
        .unwrap();
    let key = link.as_str().split_once('#').unwrap().1.to_string();

    let stored = backend.stored.lock().unwrap().clone();
    let text = String::from_utf8(stored[0].as_bytes().to_vec()).unwrap();
    assert!(!text.contains("correct horse"));
    assert!(!text.contains(&key));
}

#[tokio::test]
async fn injected_entropy_determines_key() {
    let entropy = Arc::new(FixedEntropy(AtomicU8::new(0x42)));
    let client = SecretClient::new(MemoryBackend::new(), base(), LifecycleConfig::default())
        .with_entropy(entropy.clone());

    let a = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    entropy.0.store(0x43, Ordering::SeqCst);
    let b = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();

    // 32 bytes of 0x42 in unpadded base64url
    assert!(a.as_str().ends_with("#QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI"));
    assert_ne!(a.as_str().split_once('#').unwrap().1, b.as_str().split_once('#').unwrap().1);
    assert_eq!(client.reveal(&a).await.unwrap().as_slice(), b"x");
}

#[tokio::test]
async fn entropy_failure_aborts_before_store() {
    let client = SecretClient::new(MemoryBackend::new(), base(), LifecycleConfig::default())
        .with_entropy(Arc::new(NoEntropy));
    let err = client
        .share(b"x", HOUR, CipherKind::ChaCha20Poly1305)
        .await
        .unwrap_err();
    assert!(matches!(err, OtsError::EntropyUnavailable(_)));
    assert_eq!(client.backend().store_count(), 0);
}

#[tokio::test]
async fn invalid_expiry_is_rejected_locally() {
    let (client, backend, _clock) = setup();
    for ttl in [Duration::ZERO, Duration::from_secs(60), Duration::from_secs(8 * 86_400)] {
        let err = client
            .share(b"x", ttl, CipherKind::ChaCha20Poly1305)
            .await
            .unwrap_err();
        assert!(matches!(err, OtsError::InvalidExpiry(_)), "{ttl:?}: {err:?}");
    }
    assert_eq!(backend.store_count(), 0);
}

#[tokio::test]
async fn backend_reports_expiry() {
    let (client, _backend, clock) = setup();
    let link = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();

    clock.advance(HOUR);
    let err = client.reveal(&link).await.unwrap_err();
    assert!(matches!(err, OtsError::Expired), "got {err:?}");
}

#[tokio::test]
async fn client_precheck_expires_without_decrypting() {
    // Backend clock lags behind, so only the client-side check can fire.
    let backend_clock = Arc::new(ManualClock::new(T0));
    let client_clock = Arc::new(ManualClock::new(T0));
    let client = SecretClient::new(
        MemoryBackend::with_clock(backend_clock),
        base(),
        LifecycleConfig::default(),
    )
    .with_clock(client_clock.clone());

    let link = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    client_clock.advance(HOUR + Duration::from_secs(1));

    // A wrong key would surface as TamperDetected if decryption were tried.
    let wrong_key = replace_fragment(&link, &"A".repeat(43));
    let err = client.reveal(&wrong_key).await.unwrap_err();
    assert!(matches!(err, OtsError::Expired), "got {err:?}");
}

#[tokio::test]
async fn wrong_key_is_tamper_detected_and_burns_secret() {
    let (client, _backend, _clock) = setup();
    let link = client.share(b"x", HOUR, CipherKind::Aes256Gcm).await.unwrap();

    let err = client
        .reveal(&replace_fragment(&link, &"A".repeat(43)))
        .await
        .unwrap_err();
    assert!(matches!(err, OtsError::TamperDetected), "got {err:?}");

    let err = client.reveal(&link).await.unwrap_err();
    assert!(matches!(err, OtsError::Consumed), "fetch already burned it: {err:?}");
}

#[tokio::test]
async fn rewritten_expiry_is_tamper_detected() {
    let client = SecretClient::new(
        TamperingBackend {
            inner: MemoryBackend::new(),
        },
        base(),
        LifecycleConfig::default(),
    );
    let link = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    let err = client.reveal(&link).await.unwrap_err();
    assert!(matches!(err, OtsError::TamperDetected), "got {err:?}");
}

#[tokio::test]
async fn swapped_link_cipher_is_tamper_detected() {
    let (client, _backend, _clock) = setup();
    let link = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    let swapped = ShareLink::from(link.as_str().replace("cipher=chachapoly", "cipher=aes256gcm"));

    let err = client.reveal(&swapped).await.unwrap_err();
    assert!(matches!(err, OtsError::TamperDetected), "got {err:?}");
}

#[tokio::test]
async fn invalid_link_makes_no_backend_call() {
    let (client, backend, _clock) = setup();
    let link = client.share(b"x", HOUR, CipherKind::ChaCha20Poly1305).await.unwrap();
    let truncated = ShareLink::from(link.as_str().split_once('#').unwrap().0);

    let err = client.reveal(&truncated).await.unwrap_err();
    assert!(matches!(err, OtsError::InvalidLink(_)), "got {err:?}");
    assert_eq!(backend.fetch_count(), 0);

    // still revealable with the intact link
    assert_eq!(client.reveal(&link).await.unwrap().as_slice(), b"x");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reveals_yield_one_plaintext() {
    let (client, _backend, _clock) = setup();
    let client = Arc::new(client);
    let link = client.share(b"race", HOUR, CipherKind::Aes256Gcm).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let link = link.clone();
        handles.push(tokio::spawn(async move { client.reveal(&link).await }));
    }

    let mut revealed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(plaintext) => {
                assert_eq!(plaintext.as_slice(), b"race");
                revealed += 1;
            }
            Err(OtsError::Consumed) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(revealed, 1);
}
