use crate::core::errors::BybitError;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

pub const HEADER_API_KEY: &str = "X-BAPI-API-KEY";
pub const HEADER_TIMESTAMP: &str = "X-BAPI-TIMESTAMP";
pub const HEADER_SIGN: &str = "X-BAPI-SIGN";
pub const HEADER_RECV_WINDOW: &str = "X-BAPI-RECV-WINDOW";

/// Result type for signing operations: the authentication headers to attach
pub type SignatureResult = Result<HashMap<String, String>, BybitError>;

/// Build the byte string the exchange expects to be signed.
///
/// `timestamp || api_key || recv_window || payload` with no separators, where
/// `payload` is the URL-encoded query string for GET and the raw JSON body
/// otherwise.
pub fn canonical_payload(timestamp: u64, api_key: &str, recv_window: u64, payload: &str) -> String {
    let mut canonical = String::with_capacity(32 + api_key.len() + payload.len());
    canonical.push_str(&timestamp.to_string());
    canonical.push_str(api_key);
    canonical.push_str(&recv_window.to_string());
    canonical.push_str(payload);
    canonical
}

/// Signer trait for request authentication
///
/// Implementations own immutable credentials; the signing scheme is chosen
/// when the signer is constructed, never per call.
pub trait Signer: Send + Sync {
    fn api_key(&self) -> &str;

    fn recv_window(&self) -> u64;

    /// Sign an arbitrary message and return the encoded signature
    fn sign(&self, message: &[u8]) -> Result<String, BybitError>;

    /// Sign a REST request and return the headers to include
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `query_string` - URL-encoded query string (without leading '?')
    /// * `body` - Raw request body bytes
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(
        &self,
        method: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        let payload = if method.eq_ignore_ascii_case("GET") {
            query_string
        } else {
            std::str::from_utf8(body)
                .map_err(|_| BybitError::AuthError("Invalid body encoding".to_string()))?
        };

        let canonical = canonical_payload(timestamp, self.api_key(), self.recv_window(), payload);
        let signature = self.sign(canonical.as_bytes())?;

        let mut headers = HashMap::new();
        headers.insert(HEADER_API_KEY.to_string(), self.api_key().to_string());
        headers.insert(HEADER_TIMESTAMP.to_string(), timestamp.to_string());
        headers.insert(HEADER_SIGN.to_string(), signature);
        headers.insert(HEADER_RECV_WINDOW.to_string(), self.recv_window().to_string());

        Ok(headers)
    }
}

/// HMAC-SHA256 signer producing lowercase hex signatures
pub struct HmacSigner {
    api_key: String,
    secret_key: Secret<String>,
    recv_window: u64,
}

impl HmacSigner {
    pub fn new(api_key: String, secret_key: String, recv_window: u64) -> Self {
        Self {
            api_key,
            secret_key: Secret::new(secret_key),
            recv_window,
        }
    }
}

impl Signer for HmacSigner {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn recv_window(&self) -> u64 {
        self.recv_window
    }

    fn sign(&self, message: &[u8]) -> Result<String, BybitError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| BybitError::AuthError(format!("Invalid secret key: {}", e)))?;

        mac.update(message);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// RSA signer producing base64 PKCS#1 v1.5 signatures over the SHA-256 digest
pub struct RsaSigner {
    api_key: String,
    private_key: Arc<RsaPrivateKey>,
    recv_window: u64,
}

impl RsaSigner {
    pub fn new(api_key: String, private_key: RsaPrivateKey, recv_window: u64) -> Self {
        Self {
            api_key,
            private_key: Arc::new(private_key),
            recv_window,
        }
    }
}

impl Signer for RsaSigner {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn recv_window(&self) -> u64 {
        self.recv_window
    }

    fn sign(&self, message: &[u8]) -> Result<String, BybitError> {
        let digest = Sha256::digest(message);
        let signature = self
            .private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| BybitError::AuthError(format!("RSA signing failed: {}", e)))?;

        Ok(general_purpose::STANDARD.encode(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_KEY: &str = "0s4stkea3xIc44bYoq";
    const TIMESTAMP: u64 = 1_658_384_314_791;

    #[test]
    fn test_canonical_payload_has_no_separators() {
        let canonical = canonical_payload(TIMESTAMP, API_KEY, 5000, "accountType=UNIFIED");
        assert_eq!(
            canonical,
            "16583843147910s4stkea3xIc44bYoq5000accountType=UNIFIED"
        );
    }

    #[test]
    fn test_hmac_matches_reference_digest() {
        let signer = HmacSigner::new(API_KEY.to_string(), "test_secret_key".to_string(), 5000);
        let canonical = canonical_payload(TIMESTAMP, API_KEY, 5000, "");
        let signature = signer.sign(canonical.as_bytes()).unwrap();
        assert_eq!(
            signature,
            "db772e18f4af51eb6715283a556b4d231cf64f8fec53476b61ed42140f1efd9e"
        );
    }

    #[test]
    fn test_hmac_is_deterministic() {
        let signer = HmacSigner::new(API_KEY.to_string(), "test_secret_key".to_string(), 5000);
        let first = signer
            .sign_request("GET", "accountType=UNIFIED&coin=USDT", &[], TIMESTAMP)
            .unwrap();
        let second = signer
            .sign_request("GET", "accountType=UNIFIED&coin=USDT", &[], TIMESTAMP)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first[HEADER_SIGN],
            "4bf174c587ac35bd4f184f11f20eb1d17076198cb5f4729be124a290114f93ba"
        );
    }

    #[test]
    fn test_post_signs_body_not_query() {
        let signer = HmacSigner::new(API_KEY.to_string(), "test_secret_key".to_string(), 5000);
        let body =
            br#"{"category":"linear","symbol":"BTCUSDT","buyLeverage":"2","sellLeverage":"2"}"#;
        let headers = signer
            .sign_request("POST", "ignored=1", body, TIMESTAMP)
            .unwrap();
        assert_eq!(
            headers[HEADER_SIGN],
            "3c8dbedd4446c19b3faa0262c2c62752a84d00fe6adcf9319407fd2414715097"
        );
    }

    #[test]
    fn test_headers_present() {
        let signer = HmacSigner::new(API_KEY.to_string(), "secret".to_string(), 20000);
        let headers = signer.sign_request("GET", "", &[], TIMESTAMP).unwrap();
        assert_eq!(headers[HEADER_API_KEY], API_KEY);
        assert_eq!(headers[HEADER_TIMESTAMP], "1658384314791");
        assert_eq!(headers[HEADER_RECV_WINDOW], "20000");
        assert_eq!(headers[HEADER_SIGN].len(), 64);
    }

    #[test]
    fn test_non_utf8_body_rejected() {
        let signer = HmacSigner::new(API_KEY.to_string(), "secret".to_string(), 5000);
        let result = signer.sign_request("POST", "", &[0xff, 0xfe], TIMESTAMP);
        assert!(matches!(result, Err(BybitError::AuthError(_))));
    }
}
