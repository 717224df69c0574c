//! Storage key derivation
//!
//! All annotations of a document live under one key: a namespace prefix
//! followed by the base64 form of the document's location.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const DEFAULT_KEY_PREFIX: &str = "pdf_annotations_";

/// Derive the storage key for a document location using the default prefix.
pub fn derive_storage_key(location: &str) -> String {
    derive_storage_key_with(DEFAULT_KEY_PREFIX, location)
}

pub fn derive_storage_key_with(prefix: &str, location: &str) -> String {
    format!("{}{}", prefix, STANDARD.encode(location.as_bytes()))
}

/// Recover the location from a key produced by [`derive_storage_key_with`].
///
/// Returns `None` when the key carries another prefix or is not valid base64/UTF-8.
pub fn decode_storage_key(prefix: &str, key: &str) -> Option<String> {
    let encoded = key.strip_prefix(prefix)?;
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_known_location() {
        assert_eq!(
            derive_storage_key("file:///tmp/a.pdf"),
            "pdf_annotations_ZmlsZTovLy90bXAvYS5wZGY="
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let url = "https://example.com/papers/report.pdf?x=1";
        assert_eq!(derive_storage_key(url), derive_storage_key(url));
        assert_ne!(
            derive_storage_key(url),
            derive_storage_key("https://example.com/papers/other.pdf")
        );
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert_eq!(decode_storage_key(DEFAULT_KEY_PREFIX, "settings"), None);
        assert_eq!(
            decode_storage_key(DEFAULT_KEY_PREFIX, "pdf_annotations_%%%"),
            None
        );
    }

    proptest! {
        #[test]
        fn derived_keys_decode_to_location(location in ".*", prefix in "[a-z_]{0,12}") {
            let key = derive_storage_key_with(&prefix, &location);
            prop_assert!(key.starts_with(&prefix));
            prop_assert_eq!(decode_storage_key(&prefix, &key), Some(location));
        }
    }
}
