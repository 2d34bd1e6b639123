use crate::core::errors::BybitError;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{PrivateKeyInfo, SecretDocument};
use rsa::RsaPrivateKey;
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

const PKCS8_LABEL: &str = "PRIVATE KEY";

/// Parse an RSA private key from PEM text.
///
/// The PKCS#1 `RSA PRIVATE KEY` container is tried first, then the PKCS#8
/// `PRIVATE KEY` container. A PKCS#8 key for any algorithm other than
/// `rsaEncryption` is rejected with [`BybitError::UnsupportedKeyType`].
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, BybitError> {
    match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(key) => return Ok(key),
        Err(e) => debug!("not a PKCS#1 key, trying PKCS#8: {}", e),
    }

    let (label, document) = SecretDocument::from_pem(pem)
        .map_err(|e| BybitError::KeyFormatError(format!("no valid PEM key block: {}", e)))?;

    if label != PKCS8_LABEL {
        return Err(BybitError::KeyFormatError(format!(
            "unexpected PEM label '{}'",
            label
        )));
    }

    let info = PrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|e| BybitError::KeyFormatError(format!("malformed PKCS#8 structure: {}", e)))?;

    if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
        return Err(BybitError::UnsupportedKeyType(info.algorithm.oid.to_string()));
    }

    RsaPrivateKey::try_from(info)
        .map_err(|e| BybitError::KeyFormatError(format!("malformed RSA key: {}", e)))
}

/// Read a PEM file and parse the RSA private key it contains
pub fn load_private_key_file(path: impl AsRef<Path>) -> Result<RsaPrivateKey, BybitError> {
    let path = path.as_ref();
    let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        BybitError::KeyFormatError(format!("cannot read {}: {}", path.display(), e))
    })?);

    parse_private_key(&pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    const PKCS1_PEM: &str = include_str!("../../../tests/fixtures/rsa_pkcs1.pem");
    const PKCS8_PEM: &str = include_str!("../../../tests/fixtures/rsa_pkcs8.pem");
    const ED25519_PEM: &str = include_str!("../../../tests/fixtures/ed25519_pkcs8.pem");

    #[test]
    fn test_both_containers_decode_to_same_key() {
        let from_pkcs1 = parse_private_key(PKCS1_PEM).unwrap();
        let from_pkcs8 = parse_private_key(PKCS8_PEM).unwrap();
        assert_eq!(from_pkcs1, from_pkcs8);
    }

    #[test]
    fn test_round_trip_pkcs1() {
        let key = parse_private_key(PKCS1_PEM).unwrap();
        let encoded = key.to_pkcs1_pem(LineEnding::LF).unwrap();
        assert_eq!(parse_private_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_round_trip_pkcs8() {
        let key = parse_private_key(PKCS8_PEM).unwrap();
        let encoded = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        assert_eq!(parse_private_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_non_rsa_pkcs8_is_unsupported() {
        let err = parse_private_key(ED25519_PEM).unwrap_err();
        assert!(matches!(err, BybitError::UnsupportedKeyType(ref oid) if oid == "1.3.101.112"));
    }

    #[test]
    fn test_garbage_is_key_format_error() {
        let err = parse_private_key("definitely not a key").unwrap_err();
        assert!(matches!(err, BybitError::KeyFormatError(_)));
    }

    #[test]
    fn test_corrupted_body_is_key_format_error() {
        let corrupted = PKCS8_PEM.replacen("MII", "AAA", 1);
        let err = parse_private_key(&corrupted).unwrap_err();
        assert!(matches!(err, BybitError::KeyFormatError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_private_key_file("/nonexistent/bybitx/key.pem").unwrap_err();
        assert!(matches!(err, BybitError::KeyFormatError(_)));
    }
}
