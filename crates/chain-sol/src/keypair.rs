//! Ed25519 keypairs and the [`Signer`] seam used by transaction signing.

use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::address::bytes_to_address;
use crate::error::SolError;

/// Anything that can produce an Ed25519 signature for a public key.
///
/// Transactions are signed through this trait so that callers can plug in
/// hardware or remote signers without the wire code knowing about them.
pub trait Signer: Send + Sync {
    /// The 32-byte public key this signer signs for.
    fn pubkey(&self) -> [u8; 32];

    /// Sign `message`, returning the 64-byte signature.
    fn try_sign(&self, message: &[u8]) -> Result<[u8; 64], SolError>;
}

/// An in-memory Ed25519 keypair. The secret half is zeroized on drop by
/// `ed25519-dalek`.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a keypair from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut seed = *seed;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing_key }
    }

    /// Base58 address of the public key.
    pub fn address(&self) -> String {
        bytes_to_address(&self.pubkey())
    }
}

impl Signer for Keypair {
    fn pubkey(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn try_sign(&self, message: &[u8]) -> Result<[u8; 64], SolError> {
        Ok(self.signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.address())
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature over `message` for `pubkey`.
pub fn verify_signature(pubkey: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    key.verify_strict(message, &signature).is_ok()
}
