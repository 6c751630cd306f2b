//! ed25519 keys doubling as X25519 keys via the standard Curve25519
//! conversion (spec.md §3 `PublicKey`/`PrivateKey`, §4.A
//! `x25519_shared_secret`).

use std::cmp::Ordering;
use std::fmt;

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha512};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// A 32-byte ed25519 verification key, also usable as an X25519 public key.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct PublicKey(pub(crate) [u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&self.0)
            .map_err(|_| Error::CryptoFailure("invalid ed25519 public key"))?;
        verifying_key
            .verify(message, &signature.to_ed25519())
            .map_err(|_| Error::BadSignature)
    }

    /// Curve25519 (Montgomery) encoding of this ed25519 (Edwards) public
    /// key, used as the X25519 DH public point.
    pub(crate) fn to_x25519_bytes(self) -> Result<[u8; 32]> {
        let compressed = CompressedEdwardsY(self.0);
        let point = compressed
            .decompress()
            .ok_or(Error::CryptoFailure("public key is not a valid curve point"))?;
        Ok(point.to_montgomery().to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex_preview(&self.0))
    }
}

/// Ascending byte order, used to make the verification chain's nonce
/// concatenation order deterministic across participants (spec.md §4.D).
impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A 32-byte ed25519 signing key. Also usable to derive an X25519 shared
/// secret with a peer's `PublicKey`, via the same SHA-512-clamp
/// conversion `libsodium` uses for `crypto_sign_ed25519_sk_to_curve25519`.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        PrivateKey { signing_key }
    }

    pub fn from_bytes(seed: [u8; 32]) -> Self {
        PrivateKey {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(Signature::from_ed25519(self.signing_key.sign(message)))
    }

    /// X25519 shared secret with `peer_public_key`, both keys converted
    /// from their ed25519 form (spec.md §4.A).
    pub fn compute_shared_secret(&self, peer_public_key: &PublicKey) -> Result<[u8; 32]> {
        let mut seed_hash = Sha512::digest(self.signing_key.to_bytes());
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&seed_hash[..32]);
        seed_hash.zeroize();

        let static_secret = StaticSecret::from(scalar_bytes);
        scalar_bytes.zeroize();

        let peer_montgomery = peer_public_key.to_x25519_bytes()?;
        let shared = static_secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer_montgomery));
        Ok(*shared.as_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(..)")
    }
}

/// A 64-byte ed25519 signature.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Signature(pub(crate) [u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// All-zero placeholder used while hashing/signing a block with its
    /// signature field normalized to zero (spec.md §4.C.1 step 4, §6).
    pub fn zero() -> Self {
        Signature([0u8; 64])
    }

    fn from_ed25519(sig: ed25519_dalek::Signature) -> Self {
        Signature(sig.to_bytes())
    }

    fn to_ed25519(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex_preview(&self.0))
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}
