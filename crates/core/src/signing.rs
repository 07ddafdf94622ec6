//! C8: token signing adapter (spec §4.8).
//!
//! Grounded in the `ed25519-dalek` dependency seen in the pack's auth stack
//! (`other_examples/penserai-acteon`). Kept behind a trait so the key can
//! live in-process (development) or behind a remote KMS (production) per
//! spec §4.8/§9 without the call sites changing.

use crate::error::SignerError;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

pub const ALG: &str = "EdDSA";

#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `signing_string`, returning the base64url-encoded signature and
    /// the algorithm identifier (always `"EdDSA"`).
    async fn sign(&self, signing_string: &str) -> Result<(String, &'static str), SignerError>;

    /// Verifies `signature_base64url` over `signing_string`.
    async fn verify(&self, signing_string: &str, signature_base64url: &str) -> Result<(), SignerError>;

    fn public_key(&self) -> VerifyingKey;
}

/// Holds the Ed25519 private key in process.
pub struct LocalSigner {
    signing_key: SigningKey,
}

impl LocalSigner {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn sign(&self, signing_string: &str) -> Result<(String, &'static str), SignerError> {
        let signature = self.signing_key.sign(signing_string.as_bytes());
        Ok((URL_SAFE_NO_PAD.encode(signature.to_bytes()), ALG))
    }

    async fn verify(&self, signing_string: &str, signature_base64url: &str) -> Result<(), SignerError> {
        verify_with_key(&self.signing_key.verifying_key(), signing_string, signature_base64url)
    }

    fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

fn verify_with_key(
    key: &VerifyingKey,
    signing_string: &str,
    signature_base64url: &str,
) -> Result<(), SignerError> {
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(signature_base64url)
        .map_err(|e| SignerError::Verify(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|e| SignerError::Verify(e.to_string()))?;
    key.verify(signing_string.as_bytes(), &signature)
        .map_err(|e| SignerError::Verify(e.to_string()))
}

/// Forwards sign/verify to a remote KMS-shaped HTTP endpoint, documenting
/// the production key-rotation path from spec §4.8/§9. No concrete KMS is
/// named by the spec (same treatment as the LLM provider and SQL backend in
/// spec §1), so this is a thin capability stub over `reqwest`.
pub struct RemoteSigner {
    client: reqwest::Client,
    base_url: String,
    public_key: VerifyingKey,
}

impl RemoteSigner {
    pub fn new(base_url: impl Into<String>, public_key: VerifyingKey) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            public_key,
        }
    }
}

#[derive(serde::Serialize)]
struct SignRequest<'a> {
    signing_string: &'a str,
}

#[derive(serde::Deserialize)]
struct SignResponse {
    signature: String,
}

#[async_trait]
impl Signer for RemoteSigner {
    async fn sign(&self, signing_string: &str) -> Result<(String, &'static str), SignerError> {
        let resp = self
            .client
            .post(format!("{}/sign", self.base_url))
            .json(&SignRequest { signing_string })
            .send()
            .await
            .map_err(|e| SignerError::Sign(e.to_string()))?;
        let body: SignResponse = resp
            .json()
            .await
            .map_err(|e| SignerError::Sign(e.to_string()))?;
        Ok((body.signature, ALG))
    }

    async fn verify(&self, signing_string: &str, signature_base64url: &str) -> Result<(), SignerError> {
        verify_with_key(&self.public_key, signing_string, signature_base64url)
    }

    fn public_key(&self) -> VerifyingKey {
        self.public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_signer_round_trips() {
        let signer = LocalSigner::generate();
        let (sig, alg) = signer.sign("header.payload").await.unwrap();
        assert_eq!(alg, "EdDSA");
        assert!(signer.verify("header.payload", &sig).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_message_fails_verification() {
        let signer = LocalSigner::generate();
        let (sig, _) = signer.sign("header.payload").await.unwrap();
        assert!(signer.verify("header.tampered", &sig).await.is_err());
    }
}
