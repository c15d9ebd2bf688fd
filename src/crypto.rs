//! Signature verification for both directions of the protocol.
//!
//! Inbound WLS assertions carry a detached RSA signature made with the
//! WLS's private key; we verify it against a public key resolved by key id
//! through a [`KeyStore`]. The local session cookie is authenticated
//! symmetrically with HMAC-SHA1 under the configured cookie key.
//!
//! Verification never panics and never propagates errors: a key that
//! cannot be resolved or parsed, or a signature that cannot be decoded,
//! simply fails the check (fail closed).

use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::codec;
use crate::error::Error;

type HmacSha1 = Hmac<Sha1>;

/// Resolves WLS key identifiers to PEM key material.
///
/// Implementations may cache; the agent calls this at most once per
/// authentication attempt.
pub trait KeyStore {
    /// Load the PEM bytes for `key_id`, or `None` if no such key exists.
    fn load(&self, key_id: &str) -> Result<Option<Vec<u8>>, Error>;
}

/// Verifies WLS assertion signatures.
///
/// This is the seam that lets the protocol engine run against a fake
/// verifier in tests; [`RsaSha1Verifier`] is the production
/// implementation.
pub trait WlsSignatureVerifier {
    /// Check `sig` (transport-encoded) over `signed_data` using the key
    /// named by `key_id`. Must fail closed: any resolution, parse or
    /// cryptographic error yields `false`.
    fn verify(&self, signed_data: &str, sig: &str, key_id: &str) -> bool;
}

/// Loads `<key_dir>/<key_id>.crt` from disk.
///
/// Key ids are restricted to ASCII alphanumerics (Raven kids are short
/// digit strings); anything else resolves to no key rather than touching
/// the filesystem.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    key_dir: PathBuf,
}

impl FileKeyStore {
    #[must_use]
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self, key_id: &str) -> Result<Option<Vec<u8>>, Error> {
        if key_id.is_empty() || !key_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Ok(None);
        }
        let path = self.key_dir.join(format!("{key_id}.crt"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::KeyStore(format!("{}: {e}", path.display()))),
        }
    }
}

/// RSA PKCS#1 v1.5 / SHA-1 verification of WLS assertion signatures, the
/// scheme Raven v3 mandates.
#[derive(Debug, Clone)]
pub struct RsaSha1Verifier<S> {
    keys: S,
}

impl<S: KeyStore> RsaSha1Verifier<S> {
    #[must_use]
    pub fn new(keys: S) -> Self {
        Self { keys }
    }
}

impl<S: KeyStore> WlsSignatureVerifier for RsaSha1Verifier<S> {
    fn verify(&self, signed_data: &str, sig: &str, key_id: &str) -> bool {
        let pem = match self.keys.load(key_id) {
            Ok(Some(pem)) => pem,
            Ok(None) => {
                debug!(key_id, "no key material for key id");
                return false;
            }
            Err(e) => {
                warn!(key_id, error = %e, "key store failure, failing verification closed");
                return false;
            }
        };
        let Some(public_key) = public_key_from_pem(&pem) else {
            warn!(key_id, "key material is not a usable RSA certificate or public key");
            return false;
        };
        let Ok(raw_sig) = codec::transport_decode(sig) else {
            debug!("signature is not valid transport base64");
            return false;
        };

        let hashed = Sha1::digest(signed_data.as_bytes());
        public_key
            .verify(Pkcs1v15Sign::new::<Sha1>(), &hashed, &raw_sig)
            .is_ok()
    }
}

/// Extract an RSA public key from a PEM block: either an X.509 certificate
/// (the form Raven distributes) or a bare SPKI public key.
fn public_key_from_pem(pem_bytes: &[u8]) -> Option<RsaPublicKey> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_bytes).ok()?;
    match pem.label.as_str() {
        "CERTIFICATE" => {
            let cert = pem.parse_x509().ok()?;
            RsaPublicKey::from_public_key_der(cert.public_key().raw).ok()
        }
        "PUBLIC KEY" => RsaPublicKey::from_public_key_der(&pem.contents).ok(),
        _ => None,
    }
}

/// HMAC-SHA1 a payload and produce the protocol's double-encoded signature
/// string: the raw digest as lowercase hex, then that hex text
/// transport-encoded. Both layers are part of the wire contract.
#[must_use]
pub fn hmac_sha1(key: &str, data: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    let digest = mac.finalize().into_bytes();
    codec::transport_encode(hex::encode(digest).as_bytes())
}

/// Verify a symmetric signature by recomputation and exact string
/// comparison.
#[must_use]
pub fn hmac_sha1_verify(key: &str, data: &str, sig: &str) -> bool {
    hmac_sha1(key, data) == sig
}
