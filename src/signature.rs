//! HTTP Signatures for outbound GET requests
//!
//! Implements the `rsa-sha256` scheme from draft-cavage-http-signatures as
//! deployed across the fediverse, covering `(request-target) host date`.
//! Instances with authorized fetch enabled reject unsigned webfinger and
//! actor requests.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use sha2::Sha256;
use thiserror::Error;
use url::Url;

/// Headers covered by the signature, in order
pub const SIGNED_HEADERS: &[&str] = &["(request-target)", "host", "date"];

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub host: String,
    pub date: String,
    pub signature: String,
}

/// Private key used to sign requests on behalf of an actor
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load a PKCS#8 PEM private key
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, SignatureError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| SignatureError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self::new(key_id, private_key))
    }

    pub fn new(key_id: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            key_id: key_id.into(),
            private_key,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a GET of `url` at the given time
    pub fn sign_get(&self, url: &Url, now: DateTime<Utc>) -> Result<SignedHeaders, SignatureError> {
        let host = host_header(url)?;
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let signing_string = signing_string("get", &request_target(url), &host, &date);

        let signer = pkcs1v15::SigningKey::<Sha256>::new(self.private_key.clone());
        let mut rng = rand::rngs::OsRng;
        let signature = signer.sign_with_rng(&mut rng, signing_string.as_bytes());

        let signature = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            SIGNED_HEADERS.join(" "),
            BASE64.encode(signature.to_bytes())
        );

        Ok(SignedHeaders {
            host,
            date,
            signature,
        })
    }
}

fn host_header(url: &Url) -> Result<String, SignatureError> {
    let host = url
        .host_str()
        .ok_or_else(|| SignatureError::MissingHost(url.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// The string covered by the signature
pub fn signing_string(method: &str, target: &str, host: &str, date: &str) -> String {
    format!(
        "(request-target): {} {}\nhost: {}\ndate: {}",
        method.to_lowercase(),
        target,
        host,
        date
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rsa::RsaPublicKey;
    use rsa::signature::Verifier;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    }

    #[test]
    fn test_signing_string() {
        assert_eq!(
            signing_string("GET", "/.well-known/webfinger?resource=acct:a@b.c", "b.c", "Mon, 01 Jan 2024 00:00:00 GMT"),
            "(request-target): get /.well-known/webfinger?resource=acct:a@b.c\nhost: b.c\ndate: Mon, 01 Jan 2024 00:00:00 GMT"
        );
    }

    #[test]
    fn test_sign_get_verifies() {
        let private_key = test_key();
        let public_key = RsaPublicKey::from(&private_key);
        let key = SigningKey::new("https://example.com/actor#main-key", private_key);

        let url = Url::parse("https://remote.example:8443/.well-known/webfinger?resource=acct%3Aa%40remote.example").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let headers = key.sign_get(&url, now).unwrap();

        assert_eq!(headers.host, "remote.example:8443");
        assert_eq!(headers.date, "Mon, 01 Jan 2024 00:00:00 GMT");
        assert!(headers.signature.starts_with("keyId=\"https://example.com/actor#main-key\""));
        assert!(headers.signature.contains("headers=\"(request-target) host date\""));

        let encoded = headers
            .signature
            .rsplit_once("signature=\"")
            .unwrap()
            .1
            .trim_end_matches('"');
        let raw = BASE64.decode(encoded).unwrap();
        let signature = pkcs1v15::Signature::try_from(raw.as_slice()).unwrap();
        let verifier = pkcs1v15::VerifyingKey::<Sha256>::new(public_key);
        let expected = signing_string("get", &request_target(&url), &headers.host, &headers.date);
        assert!(verifier.verify(expected.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn test_rejects_bad_pem() {
        assert!(matches!(
            SigningKey::from_pem("k", "not a key"),
            Err(SignatureError::InvalidKeyFormat(_))
        ));
    }
}
