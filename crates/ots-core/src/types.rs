use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OtsError;

/// AEAD algorithm used for a secret.
///
/// The wire identifier is recorded in every envelope and link, so adding a
/// variant here is the only way to introduce a new cipher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherKind {
    #[default]
    #[serde(rename = "chachapoly")]
    ChaCha20Poly1305,
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
}

impl CipherKind {
    pub const ALL: [CipherKind; 2] = [CipherKind::ChaCha20Poly1305, CipherKind::Aes256Gcm];

    /// Stable identifier used in the wire envelope and the link query.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChaCha20Poly1305 => "chachapoly",
            Self::Aes256Gcm => "aes256gcm",
        }
    }

    /// One-byte code bound into associated data.
    pub fn code(&self) -> u8 {
        match self {
            Self::ChaCha20Poly1305 => 0x01,
            Self::Aes256Gcm => 0x02,
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherKind {
    type Err = OtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| OtsError::Config(format!("unknown cipher: {s:?}")))
    }
}

/// Maximum length of a backend-assigned identifier.
pub const MAX_ID_LEN: usize = 128;

/// Error returned when a string is not a usable opaque ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid opaque id {value:?}: {reason}")]
pub struct InvalidId {
    pub value: String,
    pub reason: &'static str,
}

/// Backend-assigned handle for a stored envelope. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OpaqueId(String);

impl OpaqueId {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidId> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("empty")
        } else if value == "." || value == ".." {
            Some("dot segment")
        } else if value.len() > MAX_ID_LEN {
            Some("too long")
        } else if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            Some("contains characters outside [A-Za-z0-9_.-]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidId { value, reason }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OpaqueId {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OpaqueId> for String {
    fn from(id: OpaqueId) -> Self {
        id.0
    }
}

/// Sender-side progress of a secret through `share`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Drafted,
    Encrypted,
    Submitted,
    LinkReady,
}

/// Recipient-side progress of a secret through `reveal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientState {
    LinkParsed,
    Fetched,
    Decrypted,
    Expired,
    Consumed,
    NotFound,
    TamperDetected,
}

impl RecipientState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::LinkParsed | Self::Fetched)
    }

    /// Terminal failure state corresponding to an error, if any.
    pub fn from_error(err: &OtsError) -> Option<Self> {
        match err {
            OtsError::Expired => Some(Self::Expired),
            OtsError::Consumed => Some(Self::Consumed),
            OtsError::NotFound => Some(Self::NotFound),
            OtsError::TamperDetected | OtsError::AuthenticationFailed => {
                Some(Self::TamperDetected)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_identifiers_are_stable() {
        assert_eq!(CipherKind::ChaCha20Poly1305.as_str(), "chachapoly");
        assert_eq!(CipherKind::Aes256Gcm.as_str(), "aes256gcm");
        assert_eq!(CipherKind::default(), CipherKind::ChaCha20Poly1305);
    }

    #[test]
    fn test_cipher_from_str() {
        for cipher in CipherKind::ALL {
            assert_eq!(cipher.as_str().parse::<CipherKind>().unwrap(), cipher);
        }
        assert!("aes128gcm".parse::<CipherKind>().is_err());
        assert!("ChaChaPoly".parse::<CipherKind>().is_err());
    }

    #[test]
    fn test_cipher_serde_uses_wire_identifier() {
        #[derive(Serialize, Deserialize)]
        struct Wrap {
            cipher: CipherKind,
        }
        let toml_str = toml::to_string(&Wrap { cipher: CipherKind::Aes256Gcm }).unwrap();
        assert_eq!(toml_str.trim(), r#"cipher = "aes256gcm""#);
        let back: Wrap = toml::from_str(r#"cipher = "chachapoly""#).unwrap();
        assert_eq!(back.cipher, CipherKind::ChaCha20Poly1305);
    }

    #[test]
    fn test_cipher_codes_distinct() {
        assert_ne!(CipherKind::ChaCha20Poly1305.code(), CipherKind::Aes256Gcm.code());
    }

    #[test]
    fn test_opaque_id_validation() {
        assert!(OpaqueId::new("a1B2-c3_d4.e5").is_ok());
        assert_eq!(OpaqueId::new("").unwrap_err().reason, "empty");
        assert!(OpaqueId::new("has/slash").is_err());
        assert!(OpaqueId::new("has space").is_err());
        assert!(OpaqueId::new("frag#ment").is_err());
        assert!(OpaqueId::new("..").is_err());
        assert!(OpaqueId::new("...").is_ok());
        assert!(OpaqueId::new("x".repeat(MAX_ID_LEN)).is_ok());
        assert!(OpaqueId::new("x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_recipient_state_mapping() {
        assert_eq!(
            RecipientState::from_error(&OtsError::Consumed),
            Some(RecipientState::Consumed)
        );
        assert_eq!(
            RecipientState::from_error(&OtsError::AuthenticationFailed),
            Some(RecipientState::TamperDetected)
        );
        assert_eq!(
            RecipientState::from_error(&OtsError::BackendUnavailable("down".into())),
            None
        );
        assert!(RecipientState::Decrypted.is_terminal());
        assert!(!RecipientState::Fetched.is_terminal());
    }
}
