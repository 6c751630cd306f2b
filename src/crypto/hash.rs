//! SHA-256/512, HMAC-SHA512 and PBKDF2-SHA512 (spec.md §4.A).

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

pub type Hash256 = [u8; 32];

pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

pub fn hmac_sha512(key: &[u8], message: &[u8]) -> [u8; 64] {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; 64];
    out.copy_from_slice(&result);
    out
}

pub fn pbkdf2_sha512(password: &[u8], salt: &[u8], iterations: u32, out_len: usize) -> Result<Vec<u8>> {
    if iterations == 0 {
        return Err(Error::CryptoFailure("pbkdf2 requires at least one iteration"));
    }
    let mut out = vec![0u8; out_len];
    pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("") per FIPS 180-4 test vector.
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn hmac_sha512_is_deterministic() {
        let a = hmac_sha512(b"key", b"message");
        let b = hmac_sha512(b"key", b"message");
        assert_eq!(a, b);
    }

    #[test]
    fn pbkdf2_different_salts_differ() {
        let a = pbkdf2_sha512(b"password", b"salt-a", 1000, 64).unwrap();
        let b = pbkdf2_sha512(b"password", b"salt-b", 1000, 64).unwrap();
        assert_ne!(a, b);
    }
}
