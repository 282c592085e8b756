//! Ed25519 keypairs in the ledger's base58 encoding.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rbac_model::PublicKey;
use std::fmt;

use crate::error::{LedgerError, LedgerResult};

/// Ed25519 private key length (32 bytes)
pub const PRIVATE_KEY_LEN: usize = 32;

/// Ed25519 signature length (64 bytes)
pub const SIGNATURE_LEN: usize = 64;

/// A signing keypair.
///
/// # Example
///
/// ```
/// use rbac_ledger::Keypair;
///
/// let kp = Keypair::generate();
/// let restored = Keypair::from_private_key(&kp.private_key()).unwrap();
/// assert_eq!(kp.public_key(), restored.public_key());
///
/// let sig = kp.sign(b"hello");
/// assert!(Keypair::verify(&kp.public_key(), b"hello", &sig));
/// ```
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new keypair from the OS random number generator.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Restore a keypair from its base58 private key.
    pub fn from_private_key(encoded: &str) -> LedgerResult<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| LedgerError::Signing(format!("Invalid private key: {e}")))?;
        let seed: [u8; PRIVATE_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            LedgerError::Signing(format!(
                "Invalid private key: expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                b.len()
            ))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let public = PublicKey::from_bytes(&signing.verifying_key().to_bytes());
        Self { signing, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    /// The base58 private key.
    pub fn private_key(&self) -> String {
        bs58::encode(self.signing.to_bytes()).into_string()
    }

    /// Sign `message`; returns the base58 signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing.sign(message);
        bs58::encode(signature.to_bytes()).into_string()
    }

    /// Check a base58 signature against a public key.
    pub fn verify(public_key: &PublicKey, message: &[u8], signature: &str) -> bool {
        let Ok(key_bytes) = public_key.to_bytes() else {
            return false;
        };
        let Ok(verifying) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Some(sig_bytes) = bs58::decode(signature)
            .into_vec()
            .ok()
            .and_then(|b| <[u8; SIGNATURE_LEN]>::try_from(b).ok())
        else {
            return false;
        };
        verifying
            .verify(message, &Signature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("signing", &"[REDACTED]")
            .finish()
    }
}
