//! Record identifier codec
//!
//! Externally-visible record and group identifiers are a reversible,
//! URL/HTML-safe encoding of the entry's distinguished name: the standard
//! base64 alphabet with `+/` replaced by `-_` and trailing padding stripped.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{StoreError, StoreResult};

/// Encode a DN into a URL-safe identifier.
pub fn encode_id(dn: &str) -> String {
    URL_SAFE_NO_PAD.encode(dn.as_bytes())
}

/// Decode an identifier back into the DN it was derived from.
pub fn decode_id(id: &str) -> StoreResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(id.as_bytes())
        .map_err(|e| StoreError::invalid_data(format!("malformed record id '{id}': {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| StoreError::invalid_data(format!("record id '{id}' is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_reserved_characters() {
        let dns = [
            "cn=Jane Doe,ou=people,dc=example,dc=com",
            "cn=O'Brien\\, Pat,ou=people,dc=example,dc=com",
            "uid=a+b/c=d,ou=people,dc=example,dc=com",
            "cn=#leading hash,dc=example,dc=com",
        ];
        for dn in dns {
            assert_eq!(decode_id(&encode_id(dn)).unwrap(), dn);
        }
    }

    #[test]
    fn test_encoding_is_url_safe_and_unpadded() {
        let id = encode_id("cn=Jane Doe,ou=people,dc=example,dc=com");
        assert!(!id.contains('+'));
        assert!(!id.contains('/'));
        assert!(!id.contains('='));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_id("not*base64!").is_err());
    }
}
