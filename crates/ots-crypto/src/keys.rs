//! Key and nonce generation from an injected entropy source

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use ots_core::{CipherKind, OtsError, OtsResult};

use crate::{KEY_SIZE, NONCE_SIZE};

/// Source of cryptographically secure random bytes.
///
/// Failure is fatal for the caller: implementations must never fall back to
/// a weaker generator.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> OtsResult<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> OtsResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| OtsError::EntropyUnavailable(e.to_string()))
    }
}

/// A per-secret 256-bit key. Zeroized on drop.
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns `None` unless `slice` is exactly `KEY_SIZE` bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 96-bit AEAD nonce. Public, but never reused under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// Generate a fresh random key.
pub fn generate_key(source: &dyn EntropySource) -> OtsResult<SecretKey> {
    let mut bytes = [0u8; KEY_SIZE];
    if let Err(e) = source.fill(&mut bytes) {
        bytes.zeroize();
        return Err(e);
    }
    Ok(SecretKey::from_bytes(bytes))
}

/// Generate a fresh random nonce for `cipher`.
pub fn generate_nonce(source: &dyn EntropySource, cipher: CipherKind) -> OtsResult<Nonce> {
    // Both supported ciphers take 96-bit nonces.
    match cipher {
        CipherKind::ChaCha20Poly1305 | CipherKind::Aes256Gcm => {
            let mut bytes = [0u8; NONCE_SIZE];
            source.fill(&mut bytes)?;
            Ok(Nonce::from_bytes(bytes))
        }
    }
}
