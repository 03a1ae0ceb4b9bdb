//! Client-side encryption of provider keys
//!
//! The bundle is AES-256-GCM encrypted JSON whose content key is wrapped
//! with the service's RSA public key (OAEP, SHA-256). The header value is
//! `base64url(JSON{alg, enc, ek, iv, ct, tag})` without padding.

use crate::error::{Error, Result};
use crate::provider_keys::ProviderKeys;
use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

/// Header carrying the encrypted bundle
pub const PROVIDER_KEYS_HEADER: &str = "X-TR-Provider-Keys";

const KEY_ALGORITHM: &str = "RSA-OAEP-256";
const CONTENT_ALGORITHM: &str = "A256GCM";
const TAG_LEN: usize = 16;

#[derive(Serialize)]
struct Envelope<'a> {
    alg: &'a str,
    enc: &'a str,
    ek: String,
    iv: String,
    ct: String,
    tag: String,
}

/// Parse a PEM public key (SubjectPublicKeyInfo or PKCS#1)
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::encryption(format!("unusable public key: {e}")))
}

/// Extract the PEM text from a discovery response
///
/// Accepts `{"public_key": ...}` (also `pem` or `key`) or the bare PEM.
pub fn public_key_from_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.to_string());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|_| {
        Error::invalid_response(
            "public key discovery returned neither JSON nor PEM",
            Some(body.to_string()),
        )
    })?;
    ["public_key", "pem", "key"]
        .iter()
        .find_map(|field| value.get(*field).and_then(|v| v.as_str()))
        .map(str::to_string)
        .ok_or_else(|| {
            Error::invalid_response(
                "public key discovery response has no `public_key` field",
                Some(body.to_string()),
            )
        })
}

/// Encrypt `keys` for `public_key` and return the header value
pub fn encrypt_provider_keys(keys: &ProviderKeys, public_key: &RsaPublicKey) -> Result<String> {
    let plaintext = keys
        .to_plaintext_json()
        .map_err(|e| Error::encryption(format!("cannot serialize provider keys: {e}")))?;

    let content_key = Aes256Gcm::generate_key(&mut OsRng);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let cipher = Aes256Gcm::new(&content_key);
    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| Error::encryption("AES-GCM encryption failed"))?;
    let (ct, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let wrapped_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), content_key.as_slice())
        .map_err(|e| Error::encryption(format!("RSA-OAEP key wrap failed: {e}")))?;

    let envelope = Envelope {
        alg: KEY_ALGORITHM,
        enc: CONTENT_ALGORITHM,
        ek: URL_SAFE_NO_PAD.encode(wrapped_key),
        iv: URL_SAFE_NO_PAD.encode(nonce),
        ct: URL_SAFE_NO_PAD.encode(ct),
        tag: URL_SAFE_NO_PAD.encode(tag),
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|e| Error::encryption(format!("cannot serialize envelope: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Per-client cache of the service public key and the encrypted bundle
///
/// Both are computed at most once per client in the common case; two calls
/// racing on a cold cache may each fetch, and the first stored value wins.
#[derive(Default)]
pub struct KeyBundleCache {
    public_key: Mutex<Option<RsaPublicKey>>,
    header: Mutex<Option<SecretString>>,
}

impl KeyBundleCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached header value, if already built
    pub fn header(&self) -> Option<SecretString> {
        self.header.lock().clone()
    }

    /// Cached public key, if already fetched
    pub fn public_key(&self) -> Option<RsaPublicKey> {
        self.public_key.lock().clone()
    }

    /// Remember the fetched public key
    pub fn store_public_key(&self, key: RsaPublicKey) -> RsaPublicKey {
        self.public_key.lock().get_or_insert(key).clone()
    }

    /// Encrypt `keys` with `public_key` unless a header is already cached
    pub fn header_for(&self, keys: &ProviderKeys, public_key: &RsaPublicKey) -> Result<SecretString> {
        if let Some(header) = self.header() {
            return Ok(header);
        }
        let header = SecretString::from(encrypt_provider_keys(keys, public_key)?);
        Ok(self.header.lock().get_or_insert(header).clone())
    }

    /// Whether a public key has been fetched
    pub fn has_public_key(&self) -> bool {
        self.public_key.lock().is_some()
    }
}

impl std::fmt::Debug for KeyBundleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundleCache")
            .field("public_key", &self.has_public_key())
            .field("header", &self.header.lock().as_ref().map(|h| h.expose_secret().len()))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aes_gcm::Nonce;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use serde_json::Value;

    pub(crate) fn test_keypair() -> (RsaPrivateKey, String) {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private, pem)
    }

    fn open(header: &str, private: &RsaPrivateKey) -> Value {
        let envelope: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap();
        assert_eq!(envelope["alg"], "RSA-OAEP-256");
        assert_eq!(envelope["enc"], "A256GCM");

        let field = |name: &str| URL_SAFE_NO_PAD.decode(envelope[name].as_str().unwrap()).unwrap();
        let content_key = private
            .decrypt(Oaep::new::<Sha256>(), &field("ek"))
            .unwrap();
        let iv = field("iv");
        assert_eq!(iv.len(), 12);
        let mut sealed = field("ct");
        let tag = field("tag");
        assert_eq!(tag.len(), 16);
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(&content_key).unwrap();
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }

    #[test]
    fn test_bundle_decrypts_to_normalized_keys() {
        let (private, pem) = test_keypair();
        let public = parse_public_key(&pem).unwrap();
        let keys = ProviderKeys::new()
            .with_key("OpenAI", "sk-1")
            .with_key("gemini", "g-2");

        let header = encrypt_provider_keys(&keys, &public).unwrap();
        assert!(!header.contains('='));
        assert!(!header.contains("sk-1"));

        let plaintext = open(&header, &private);
        assert_eq!(plaintext["openai"], "sk-1");
        assert_eq!(plaintext["google"], "g-2");
    }

    #[test]
    fn test_public_key_from_body_shapes() {
        let pem = "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----";
        assert_eq!(public_key_from_body(pem).unwrap(), pem);

        let json = serde_json::json!({ "public_key": pem }).to_string();
        assert_eq!(public_key_from_body(&json).unwrap(), pem);

        let json = serde_json::json!({ "pem": pem }).to_string();
        assert_eq!(public_key_from_body(&json).unwrap(), pem);

        assert!(public_key_from_body(r#"{"kid": "1"}"#).is_err());
        assert!(public_key_from_body("garbage").is_err());
    }

    #[test]
    fn test_bad_pem_is_encryption_error() {
        let err = parse_public_key("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----")
            .unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[test]
    fn test_cache_builds_header_once() {
        let (_private, pem) = test_keypair();
        let cache = KeyBundleCache::new();
        assert!(cache.header().is_none());
        let public = cache.store_public_key(parse_public_key(&pem).unwrap());
        assert!(cache.has_public_key());

        let keys = ProviderKeys::new().with_key("anthropic", "sk-ant");
        let first = cache.header_for(&keys, &public).unwrap();
        let second = cache.header_for(&keys, &public).unwrap();
        assert_eq!(first.expose_secret(), second.expose_secret());
        assert!(!format!("{cache:?}").contains(first.expose_secret()));
    }
}
