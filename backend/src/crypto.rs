//! The RSA request envelope.
//!
//! Sensitive request bodies (credentials, account changes) arrive
//! RSA-OAEP(MGF1-SHA-256) encrypted against the server's public key,
//! which clients fetch from `GET /rsa_key`. Bodies longer than one RSA
//! block are ciphertext chunks of exactly the key size, concatenated
//! before base64 encoding.

use std::fs;
use std::path::Path;

use base64::prelude::*;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use sha2::Sha256;

use crate::error::{ApiError, ApiResult};

pub struct Envelope {
    private_key: RsaPrivateKey,
    public_pem: String,
}

impl Envelope {
    /// Load the private key from a PEM file, generating and saving a new
    /// key pair on first start.
    pub fn load_or_generate(path: &Path, bits: usize) -> ApiResult<Envelope> {
        let private_key = match fs::read_to_string(path) {
            Ok(pem) => RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|err| ApiError::Internal(format!("invalid RSA key file: {err}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(?path, "generating new RSA key pair");
                let key = generate_key(bits)?;
                let pem = key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|err| ApiError::Internal(format!("key encoding failed: {err}")))?;
                fs::write(path, pem.as_bytes())
                    .map_err(|err| ApiError::Internal(format!("could not save key: {err}")))?;
                key
            }
            Err(err) => {
                return Err(ApiError::Internal(format!("could not read key file: {err}")))
            }
        };
        Envelope::from_private_key(private_key)
    }

    /// An in-memory envelope; used by tests.
    pub fn ephemeral(bits: usize) -> ApiResult<Envelope> {
        Envelope::from_private_key(generate_key(bits)?)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> ApiResult<Envelope> {
        let public_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| ApiError::Internal(format!("public key encoding failed: {err}")))?;
        Ok(Envelope {
            private_key,
            public_pem,
        })
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Decrypt a base64 body into plaintext bytes.
    pub fn decrypt(&self, body: &[u8]) -> ApiResult<Vec<u8>> {
        let ciphertext = BASE64_STANDARD
            .decode(body)
            .map_err(|_| ApiError::BadEncryptedData)?;
        let block = self.private_key.size();
        if ciphertext.is_empty() || ciphertext.len() % block != 0 {
            return Err(ApiError::BadEncryptedData);
        }
        let mut plaintext = Vec::new();
        for chunk in ciphertext.chunks(block) {
            let part = self
                .private_key
                .decrypt(Oaep::new::<Sha256>(), chunk)
                .map_err(|_| ApiError::BadEncryptedData)?;
            plaintext.extend_from_slice(&part);
        }
        Ok(plaintext)
    }

    /// Decrypt a base64 body and parse the plaintext as JSON.
    pub fn decrypt_json<T: DeserializeOwned>(&self, body: &[u8]) -> ApiResult<T> {
        let plaintext = self.decrypt(body)?;
        serde_json::from_slice(&plaintext).map_err(|_| ApiError::InvalidJson)
    }

    /// The client half: encrypt plaintext against our public key. The
    /// server never calls this in production; tests and tooling do.
    pub fn encrypt(&self, plaintext: &[u8]) -> ApiResult<String> {
        let public_key = RsaPublicKey::from(&self.private_key);
        // OAEP overhead: two hash blocks plus two bytes.
        let chunk_size = self.private_key.size() - 66;
        let mut rng = rand::rngs::OsRng;
        let mut ciphertext = Vec::new();
        for chunk in plaintext.chunks(chunk_size) {
            let block = public_key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                .map_err(|err| ApiError::Internal(format!("encryption failed: {err}")))?;
            ciphertext.extend_from_slice(&block);
        }
        Ok(BASE64_STANDARD.encode(ciphertext))
    }
}

fn generate_key(bits: usize) -> ApiResult<RsaPrivateKey> {
    RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|err| ApiError::Internal(format!("key generation failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn round_trip_through_the_envelope() {
        let envelope = Envelope::ephemeral(2048).expect("generate");
        let body = envelope.encrypt(br#"{"username":"maya"}"#).expect("encrypt");

        #[derive(Deserialize)]
        struct Payload {
            username: String,
        }
        let payload: Payload = envelope.decrypt_json(body.as_bytes()).expect("decrypt");
        assert_eq!(payload.username, "maya");
    }

    #[test]
    fn long_bodies_span_multiple_blocks() {
        let envelope = Envelope::ephemeral(2048).expect("generate");
        let plaintext = vec![b'x'; 1000];
        let body = envelope.encrypt(&plaintext).expect("encrypt");
        assert_eq!(envelope.decrypt(body.as_bytes()).expect("decrypt"), plaintext);
    }

    #[test]
    fn garbage_is_rejected_with_bad_encrypted_data() {
        let envelope = Envelope::ephemeral(2048).expect("generate");
        assert_eq!(envelope.decrypt(b"not base64!!").unwrap_err().code(), 3103);
        let wrong_size = BASE64_STANDARD.encode([0u8; 100]);
        assert_eq!(
            envelope.decrypt(wrong_size.as_bytes()).unwrap_err().code(),
            3103
        );
    }
}
