//! Share link codec
//!
//! ```text
//! {base}/view/{id}?ref=ots&cipher={cipher}#{base64url(key)}
//! ```
//!
//! The key lives in the URL fragment, which user agents never send to the
//! server, so neither the backend nor its access logs see it.

use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use url::Url;
use zeroize::Zeroizing;

use ots_core::{CipherKind, OpaqueId, OtsError, OtsResult};

use crate::keys::SecretKey;

/// Path segment preceding the opaque ID
pub const VIEW_SEGMENT: &str = "view";

/// Unpadded base64url on encode; accepts padded keys too, since older links
/// carried `=` padding.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A shareable URL carrying the opaque ID, cipher, and key.
///
/// Deliberately has no `Display` impl: use [`ShareLink::as_str`] where the
/// full link is meant to be shown. `Debug` strips the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ShareLink(String);

impl ShareLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for ShareLink {
    fn from(s: String) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<&str> for ShareLink {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl std::fmt::Debug for ShareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visible = self.0.split('#').next().unwrap_or_default();
        f.debug_tuple("ShareLink")
            .field(&format_args!("{visible}#[REDACTED]"))
            .finish()
    }
}

/// Build the share link for a stored secret.
pub fn encode_link(
    base: &Url,
    id: &OpaqueId,
    key: &SecretKey,
    cipher: CipherKind,
) -> OtsResult<ShareLink> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| OtsError::InvalidLink(format!("base URL cannot hold a path: {base}")))?
        .pop_if_empty()
        .push(VIEW_SEGMENT)
        .push(id.as_str());
    url.query_pairs_mut()
        .clear()
        .append_pair("ref", "ots")
        .append_pair("cipher", cipher.as_str());

    let encoded_key = Zeroizing::new(KEY_ENGINE.encode(key.as_bytes()));
    url.set_fragment(Some(encoded_key.as_str()));

    Ok(ShareLink(url.into()))
}

/// Parse a share link back into its parts.
///
/// A link without a `cipher` parameter is read as ChaCha20-Poly1305, the
/// only cipher links were produced with before the parameter existed.
pub fn decode_link(link: &ShareLink) -> OtsResult<(OpaqueId, SecretKey, CipherKind)> {
    let url = Url::parse(link.as_str())
        .map_err(|e| OtsError::InvalidLink(format!("not an absolute URL: {e}")))?;

    let mut segments: Vec<&str> = url
        .path_segments()
        .ok_or_else(|| OtsError::InvalidLink("URL has no path".into()))?
        .collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    let [.., view, id] = segments.as_slice() else {
        return Err(OtsError::InvalidLink(format!(
            "path must end in /{VIEW_SEGMENT}/{{id}}"
        )));
    };
    if *view != VIEW_SEGMENT {
        return Err(OtsError::InvalidLink(format!(
            "path must end in /{VIEW_SEGMENT}/{{id}}"
        )));
    }
    let id = OpaqueId::new(*id).map_err(|e| OtsError::InvalidLink(e.to_string()))?;

    let cipher = match url.query_pairs().find(|(k, _)| k == "cipher") {
        Some((_, value)) => value
            .parse::<CipherKind>()
            .map_err(|_| OtsError::InvalidLink(format!("unrecognized cipher {value:?}")))?,
        None => CipherKind::ChaCha20Poly1305,
    };

    let fragment = url
        .fragment()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| OtsError::InvalidLink("missing key fragment".into()))?;
    let key_bytes = Zeroizing::new(
        KEY_ENGINE
            .decode(fragment)
            .map_err(|_| OtsError::InvalidLink("key fragment is not base64url".into()))?,
    );
    let key = SecretKey::from_slice(&key_bytes).ok_or_else(|| {
        OtsError::InvalidLink(format!("key must be 32 bytes, got {}", key_bytes.len()))
    })?;

    Ok((id, key, cipher))
}
