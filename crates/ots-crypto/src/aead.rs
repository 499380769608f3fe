//! AEAD engine: ChaCha20-Poly1305 and AES-256-GCM with detached tags
//!
//! Both ciphers take a 256-bit key, a 96-bit nonce and produce a 128-bit tag,
//! so the envelope layout is identical for either choice:
//! ```text
//! [12 bytes: nonce][N bytes: ciphertext][16 bytes: tag]
//! ```

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305,
};
use zeroize::{Zeroize, Zeroizing};

use ots_core::{CipherKind, OtsError, OtsResult};

use crate::keys::{Nonce, SecretKey};
use crate::TAG_SIZE;

/// Encrypt `plaintext` under `key`/`nonce` with `cipher`, authenticating `aad`.
///
/// Returns `(ciphertext, tag)`. The ciphertext has the same length as the
/// plaintext. The caller is responsible for never reusing `nonce` with `key`.
pub fn encrypt(
    key: &SecretKey,
    nonce: &Nonce,
    plaintext: &[u8],
    cipher: CipherKind,
    aad: &[u8],
) -> OtsResult<(Vec<u8>, [u8; TAG_SIZE])> {
    let mut buffer = plaintext.to_vec();
    let tag = match cipher {
        CipherKind::ChaCha20Poly1305 => seal::<ChaCha20Poly1305>(key, nonce, aad, &mut buffer),
        CipherKind::Aes256Gcm => seal::<Aes256Gcm>(key, nonce, aad, &mut buffer),
    };
    match tag {
        Ok(tag) => Ok((buffer, tag)),
        Err(e) => {
            buffer.zeroize();
            Err(e)
        }
    }
}

/// Decrypt and verify. Fails with `AuthenticationFailed` on any mismatch of
/// key, nonce, ciphertext, tag or associated data; no plaintext is released
/// unless the tag verifies.
pub fn decrypt(
    key: &SecretKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
    cipher: CipherKind,
    aad: &[u8],
) -> OtsResult<Zeroizing<Vec<u8>>> {
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    match cipher {
        CipherKind::ChaCha20Poly1305 => open::<ChaCha20Poly1305>(key, nonce, aad, &mut buffer, tag)?,
        CipherKind::Aes256Gcm => open::<Aes256Gcm>(key, nonce, aad, &mut buffer, tag)?,
    }
    Ok(buffer)
}

fn seal<C: KeyInit + AeadInPlace>(
    key: &SecretKey,
    nonce: &Nonce,
    aad: &[u8],
    buffer: &mut [u8],
) -> OtsResult<[u8; TAG_SIZE]> {
    let cipher = C::new_from_slice(key.as_bytes())
        .map_err(|_| OtsError::MalformedEnvelope("key length does not match cipher".into()))?;
    let tag = cipher
        .encrypt_in_place_detached(
            chacha20poly1305::aead::Nonce::<C>::from_slice(nonce.as_bytes()),
            aad,
            buffer,
        )
        .map_err(|_| OtsError::MalformedEnvelope("plaintext too large for cipher".into()))?;

    let mut out = [0u8; TAG_SIZE];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn open<C: KeyInit + AeadInPlace>(
    key: &SecretKey,
    nonce: &Nonce,
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_SIZE],
) -> OtsResult<()> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| OtsError::AuthenticationFailed)?;
    let verified = cipher.decrypt_in_place_detached(
        chacha20poly1305::aead::Nonce::<C>::from_slice(nonce.as_bytes()),
        aad,
        buffer,
        chacha20poly1305::aead::Tag::<C>::from_slice(tag),
    );
    if verified.is_err() {
        buffer.zeroize();
        return Err(OtsError::AuthenticationFailed);
    }
    Ok(())
}
