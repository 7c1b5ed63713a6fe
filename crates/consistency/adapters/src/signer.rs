use std::fmt;

use async_trait::async_trait;
use ed25519_dalek::{SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Hex-encoded signature produced by a [`Signer`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signing capability consumed by the ledger.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, message: &[u8]) -> Result<Signature, AdapterError>;

    /// `Ok(false)` for a well-formed but wrong signature; `Err` only when the
    /// signer itself is unavailable.
    async fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool, AdapterError>;
}

/// Ed25519 signer holding this node's key and the verifying keys of the
/// peers whose records it accepts.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    trusted: Vec<VerifyingKey>,
}

impl Ed25519Signer {
    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            trusted: Vec::new(),
        }
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(seed)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Accept signatures made by `peer`.
    pub fn trust(&mut self, peer: VerifyingKey) {
        if !self.trusted.contains(&peer) {
            self.trusted.push(peer);
        }
    }

    pub fn with_trusted_peer(mut self, peer: VerifyingKey) -> Self {
        self.trust(peer);
        self
    }

    /// Accept signatures from a peer given its hex-encoded public key.
    pub fn trust_hex(&mut self, public_key_hex: &str) -> Result<(), AdapterError> {
        let bytes: [u8; 32] = hex::decode(public_key_hex)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| AdapterError::Signature("public key must be 32 hex-encoded bytes".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AdapterError::Signature(e.to_string()))?;
        self.trust(key);
        Ok(())
    }

    fn decode_signature(signature: &Signature) -> Option<ed25519_dalek::Signature> {
        let bytes: [u8; 64] = hex::decode(&signature.0).ok()?.try_into().ok()?;
        Some(ed25519_dalek::Signature::from_bytes(&bytes))
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, message: &[u8]) -> Result<Signature, AdapterError> {
        let signature = ed25519_dalek::Signer::sign(&self.signing_key, message);
        Ok(Signature(hex::encode(signature.to_bytes())))
    }

    async fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool, AdapterError> {
        let Some(signature) = Self::decode_signature(signature) else {
            return Ok(false);
        };
        let own = self.signing_key.verifying_key();
        Ok(std::iter::once(&own)
            .chain(self.trusted.iter())
            .any(|key| key.verify(message, &signature).is_ok()))
    }
}
