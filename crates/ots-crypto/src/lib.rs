//! ots-crypto: client-side envelope protocol for one-time secrets
//!
//! Pipeline: plaintext → AEAD seal (fresh key + nonce) → wire envelope → backend
//!
//! The backend only ever receives the wire envelope. The key travels in the
//! fragment of the share link, which browsers and HTTP clients do not send:
//! ```text
//! {base}/view/{id}?ref=ots&cipher=chachapoly#{base64url(key)}
//!        └──── sent to backend ────────────┘ └─ link holder only ─┘
//! ```
//!
//! Envelope header (version, cipher, created/expires timestamps) is bound as
//! AEAD associated data, so a backend cannot extend a secret's lifetime or
//! swap its cipher without failing authentication.

pub mod aead;
pub mod envelope;
pub mod keys;
pub mod link;

pub use aead::{decrypt, encrypt};
pub use envelope::{decode_wire, encode_wire, Envelope, WireBlob};
pub use keys::{generate_key, generate_nonce, EntropySource, Nonce, OsEntropy, SecretKey};
pub use link::{decode_link, encode_link, ShareLink};

/// Size of a secret key in bytes (256-bit, both ciphers)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96-bit, both ciphers)
pub const NONCE_SIZE: usize = 12;

/// Size of an authentication tag (Poly1305 and GHASH)
pub const TAG_SIZE: usize = 16;
