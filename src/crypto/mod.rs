//! Crypto primitives facade (spec.md §4.A): uniform access to ed25519
//! sign/verify, X25519 ECDH, SHA-256/512, HMAC-SHA512, PBKDF2-SHA512 and
//! AES-256-CBC. Owns no keys and performs no logging.

mod aes_cbc;
mod hash;
mod keys;
mod rng;

pub use aes_cbc::{decrypt as aes256_cbc_decrypt, encrypt as aes256_cbc_encrypt};
pub use hash::{hmac_sha512, pbkdf2_sha512, sha256, sha512, Hash256};
pub use keys::{PrivateKey, PublicKey, Signature};
pub use rng::{constant_time_eq, secure_random_array, secure_random_bytes};
