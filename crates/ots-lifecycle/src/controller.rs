//! Secret lifecycle controller
//!
//! Sender:    Drafted -> Encrypted -> Submitted -> LinkReady
//! Recipient: LinkParsed -> Fetched -> Decrypted
//!            (or Expired | Consumed | NotFound | TamperDetected)
//!
//! Each `share` makes exactly one store call and each `reveal` exactly one
//! destructive fetch. Neither is retried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;
use zeroize::Zeroizing;

use ots_backend::{FetchOutcome, SecretBackend};
use ots_core::config::{LifecycleConfig, OtsConfig};
use ots_core::{
    CipherKind, Clock, OpaqueId, OtsError, OtsResult, RecipientState, SenderState, SystemClock,
};
use ots_crypto::{
    decode_link, decode_wire, encode_link, encode_wire, generate_key, generate_nonce,
    EntropySource, Envelope, OsEntropy, ShareLink,
};

/// Shares and reveals one-time secrets through a backend.
///
/// Holds no mutable state; concurrent calls are independent.
pub struct SecretClient<B> {
    backend: B,
    link_base: Url,
    policy: LifecycleConfig,
    entropy: Arc<dyn EntropySource>,
    clock: Arc<dyn Clock>,
}

impl<B: SecretBackend> SecretClient<B> {
    pub fn new(backend: B, link_base: Url, policy: LifecycleConfig) -> Self {
        Self {
            backend,
            link_base,
            policy,
            entropy: Arc::new(OsEntropy),
            clock: Arc::new(SystemClock),
        }
    }

    /// Build from a loaded config: link base from `[link]`, ttl policy and
    /// default cipher from `[lifecycle]`.
    pub fn from_config(backend: B, config: &OtsConfig) -> OtsResult<Self> {
        let link_base = Url::parse(&config.link.base_url).map_err(|e| {
            OtsError::Config(format!("link.base_url {:?}: {e}", config.link.base_url))
        })?;
        Ok(Self::new(backend, link_base, config.lifecycle.clone()))
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &LifecycleConfig {
        &self.policy
    }

    /// Check `ttl` against the configured bounds.
    pub fn validate_ttl(&self, ttl: Duration) -> OtsResult<()> {
        if ttl.as_secs() == 0 {
            return Err(OtsError::InvalidExpiry(format!(
                "ttl must be at least one second, got {ttl:?}"
            )));
        }
        if ttl < self.policy.min_ttl() {
            return Err(OtsError::InvalidExpiry(format!(
                "ttl {}s is below the minimum of {}s",
                ttl.as_secs(),
                self.policy.min_ttl_secs
            )));
        }
        if ttl > self.policy.max_ttl() {
            return Err(OtsError::InvalidExpiry(format!(
                "ttl {}s exceeds the maximum of {}s",
                ttl.as_secs(),
                self.policy.max_ttl_secs
            )));
        }
        Ok(())
    }

    /// Encrypt `plaintext`, store the envelope and return the share link.
    pub async fn share(
        &self,
        plaintext: &[u8],
        ttl: Duration,
        cipher: CipherKind,
    ) -> OtsResult<ShareLink> {
        debug!(state = ?SenderState::Drafted, %cipher, ttl_secs = ttl.as_secs(), "share");
        self.validate_ttl(ttl)?;

        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add(ttl.as_secs())
            .ok_or_else(|| OtsError::InvalidExpiry("expiry overflows the clock".into()))?;

        let key = generate_key(self.entropy.as_ref())?;
        let nonce = generate_nonce(self.entropy.as_ref(), cipher)?;
        let envelope = Envelope::seal(&key, nonce, cipher, plaintext, created_at, expires_at)?;
        let blob = encode_wire(&envelope)?;
        debug!(state = ?SenderState::Encrypted, bytes = blob.as_bytes().len(), "share");

        let receipt = self.backend.store(&blob).await?;
        debug!(state = ?SenderState::Submitted, id = %receipt.id, "share");
        if let Some(backend_expiry) = receipt.expires_at {
            if backend_expiry != expires_at {
                debug!(
                    id = %receipt.id,
                    backend_expiry,
                    expires_at,
                    "backend reports a different expiry"
                );
            }
        }

        let link = encode_link(&self.link_base, &receipt.id, &key, cipher)?;
        debug!(state = ?SenderState::LinkReady, id = %receipt.id, "share");
        info!(id = %receipt.id, %cipher, expires_at, "secret stored");
        Ok(link)
    }

    /// [`share`](Self::share) with the configured default ttl and cipher.
    pub async fn share_default(&self, plaintext: &[u8]) -> OtsResult<ShareLink> {
        self.share(
            plaintext,
            self.policy.default_ttl(),
            self.policy.default_cipher,
        )
        .await
    }

    /// Fetch, burn and decrypt the secret behind `link`.
    ///
    /// The fetch is destructive: once it has been issued the secret must be
    /// treated as consumed, even if this future is dropped or fails later.
    pub async fn reveal(&self, link: &ShareLink) -> OtsResult<Zeroizing<Vec<u8>>> {
        let (id, key, cipher) = decode_link(link)?;
        debug!(state = ?RecipientState::LinkParsed, id = %id, %cipher, "reveal");

        let blob = match self.backend.fetch_and_delete(&id).await? {
            FetchOutcome::Found(blob) => blob,
            FetchOutcome::NotFound => return Err(terminal(&id, OtsError::NotFound)),
            FetchOutcome::Consumed => return Err(terminal(&id, OtsError::Consumed)),
            FetchOutcome::Expired => return Err(terminal(&id, OtsError::Expired)),
        };
        debug!(state = ?RecipientState::Fetched, id = %id, "reveal");

        let envelope = decode_wire(&blob)?;
        if envelope.cipher != cipher {
            return Err(terminal(&id, OtsError::TamperDetected));
        }
        if envelope.is_expired(self.clock.now()) {
            return Err(terminal(&id, OtsError::Expired));
        }

        let plaintext = envelope
            .open(&key)
            .map_err(|_| terminal(&id, OtsError::TamperDetected))?;
        debug!(state = ?RecipientState::Decrypted, id = %id, "reveal");
        info!(id = %id, %cipher, "secret revealed");
        Ok(plaintext)
    }
}

fn terminal(id: &OpaqueId, err: OtsError) -> OtsError {
    if let Some(state) = RecipientState::from_error(&err) {
        debug!(state = ?state, id = %id, "reveal");
    }
    err
}
