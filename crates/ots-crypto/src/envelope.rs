//! Envelope: the encrypted payload handed to the backend
//!
//! Wire format (JSON body of `POST /secret`, returned by `GET /secret/{id}`):
//! ```text
//! {
//!   "version": 1,
//!   "cipher": "chachapoly" | "aes256gcm",
//!   "encryptedBytes": base64(nonce || ciphertext || tag),
//!   "createdAt": unix seconds,
//!   "expiresAt": unix seconds,
//!   "expiresIn": seconds
//! }
//! ```
//!
//! AAD = "ots/v" || version (1 byte) || cipher code (1 byte) || createdAt (8 bytes BE)
//!       || expiresAt (8 bytes BE)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use ots_core::{CipherKind, OtsError, OtsResult};

use crate::aead;
use crate::keys::{Nonce, SecretKey};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Current wire format version
pub const WIRE_VERSION: u8 = 1;

/// An encrypted secret plus the metadata needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub cipher: CipherKind,
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds, strictly after `created_at`
    pub expires_at: u64,
}

impl Envelope {
    /// Encrypt `plaintext` into a new envelope, binding the header as AAD.
    pub fn seal(
        key: &SecretKey,
        nonce: Nonce,
        cipher: CipherKind,
        plaintext: &[u8],
        created_at: u64,
        expires_at: u64,
    ) -> OtsResult<Self> {
        if expires_at <= created_at {
            return Err(OtsError::InvalidExpiry(format!(
                "expiry {expires_at} is not after creation {created_at}"
            )));
        }
        let aad = build_aad(cipher, created_at, expires_at);
        let (ciphertext, tag) = aead::encrypt(key, &nonce, plaintext, cipher, &aad)?;
        Ok(Self {
            cipher,
            nonce,
            ciphertext,
            tag,
            created_at,
            expires_at,
        })
    }

    /// Verify and decrypt. Any change to the payload or header yields
    /// `AuthenticationFailed`.
    pub fn open(&self, key: &SecretKey) -> OtsResult<Zeroizing<Vec<u8>>> {
        let aad = build_aad(self.cipher, self.created_at, self.expires_at);
        aead::decrypt(key, &self.nonce, &self.ciphertext, &self.tag, self.cipher, &aad)
    }

    pub fn ttl_secs(&self) -> u64 {
        self.expires_at.saturating_sub(self.created_at)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Serialized envelope as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBlob(Vec<u8>);

impl WireBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for WireBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    version: u8,
    cipher: String,
    encrypted_bytes: String,
    created_at: u64,
    expires_at: u64,
    /// Redundant with the timestamps; kept for backends that only read a
    /// relative lifetime.
    #[serde(default)]
    expires_in: u64,
}

/// Serialize an envelope into the backend wire format.
pub fn encode_wire(envelope: &Envelope) -> OtsResult<WireBlob> {
    let mut payload = Vec::with_capacity(NONCE_SIZE + envelope.ciphertext.len() + TAG_SIZE);
    payload.extend_from_slice(envelope.nonce.as_bytes());
    payload.extend_from_slice(&envelope.ciphertext);
    payload.extend_from_slice(&envelope.tag);

    let wire = WireEnvelope {
        version: WIRE_VERSION,
        cipher: envelope.cipher.as_str().to_string(),
        encrypted_bytes: STANDARD.encode(&payload),
        created_at: envelope.created_at,
        expires_at: envelope.expires_at,
        expires_in: envelope.ttl_secs(),
    };
    serde_json::to_vec(&wire)
        .map(WireBlob)
        .map_err(|e| OtsError::MalformedEnvelope(format!("serialization: {e}")))
}

/// Parse a backend wire blob. Rejects unknown versions and ciphers, truncated
/// payloads and non-increasing timestamps.
pub fn decode_wire(blob: &WireBlob) -> OtsResult<Envelope> {
    let wire: WireEnvelope = serde_json::from_slice(blob.as_bytes())
        .map_err(|e| OtsError::MalformedEnvelope(format!("invalid JSON: {e}")))?;

    if wire.version != WIRE_VERSION {
        return Err(OtsError::MalformedEnvelope(format!(
            "unsupported version {}",
            wire.version
        )));
    }
    let cipher: CipherKind = wire
        .cipher
        .parse()
        .map_err(|_| OtsError::MalformedEnvelope(format!("unrecognized cipher {:?}", wire.cipher)))?;
    if wire.expires_at <= wire.created_at {
        return Err(OtsError::MalformedEnvelope(format!(
            "expiresAt {} is not after createdAt {}",
            wire.expires_at, wire.created_at
        )));
    }

    let payload = STANDARD
        .decode(wire.encrypted_bytes.as_bytes())
        .map_err(|e| OtsError::MalformedEnvelope(format!("base64 decode: {e}")))?;
    if payload.len() < NONCE_SIZE + TAG_SIZE {
        return Err(OtsError::MalformedEnvelope(format!(
            "encrypted payload too short: {} bytes (minimum {})",
            payload.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce_bytes, rest) = payload.split_at(NONCE_SIZE);
    let (ciphertext, tag_bytes) = rest.split_at(rest.len() - TAG_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes)
        .ok_or_else(|| OtsError::MalformedEnvelope("bad nonce length".into()))?;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(tag_bytes);

    Ok(Envelope {
        cipher,
        nonce,
        ciphertext: ciphertext.to_vec(),
        tag,
        created_at: wire.created_at,
        expires_at: wire.expires_at,
    })
}

/// Build AAD from the envelope header.
fn build_aad(cipher: CipherKind, created_at: u64, expires_at: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(5 + 1 + 1 + 8 + 8);
    aad.extend_from_slice(b"ots/v");
    aad.push(WIRE_VERSION);
    aad.push(cipher.code());
    aad.extend_from_slice(&created_at.to_be_bytes());
    aad.extend_from_slice(&expires_at.to_be_bytes());
    aad
}
