// ============================================
// File: crates/keyfleet-core/src/subscription.rs
// ============================================
//! # Subscription Bundles
//!
//! A subscription bundle is what proxy apps poll: every URL of one client,
//! one per line, base64-encoded (standard alphabet, padded).
//!
//! ## Last Modified
//! v0.1.0 - Initial bundle encoding

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{CoreError, Result};

/// Encodes connection URLs into a subscription bundle.
///
/// # Example
/// ```
/// use keyfleet_core::{decode_bundle, encode_bundle};
///
/// let bundle = encode_bundle(["vless://a@x:443", "vless://b@y:443"]);
/// assert_eq!(decode_bundle(&bundle).unwrap().len(), 2);
/// ```
#[must_use]
pub fn encode_bundle<I, S>(urls: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = urls
        .into_iter()
        .map(|u| u.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    BASE64.encode(joined.as_bytes())
}

/// Decodes a subscription bundle back into its URLs.
///
/// Blank lines are skipped.
///
/// # Errors
/// Returns `CoreError::BundleDecoding` if the input is not valid base64 or
/// does not decode to UTF-8.
pub fn decode_bundle(bundle: &str) -> Result<Vec<String>> {
    let bytes = BASE64
        .decode(bundle.trim())
        .map_err(|e| CoreError::BundleDecoding { details: e.to_string() })?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CoreError::BundleDecoding { details: e.to_string() })?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        // "a\nb"
        assert_eq!(encode_bundle(["a", "b"]), "YQpi");
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let bundle = BASE64.encode("vless://a@x:443\n\n  \nvless://b@y:443\n");
        assert_eq!(
            decode_bundle(&bundle).unwrap(),
            vec!["vless://a@x:443".to_string(), "vless://b@y:443".to_string()]
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_bundle("%%%"),
            Err(CoreError::BundleDecoding { .. })
        ));
    }
}
