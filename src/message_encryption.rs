//! Envelope encryption for arbitrary call payloads (spec.md §4.B),
//! grounded on `original_source/.../MessageEncryption.cpp`.
//!
//! Encrypting `P` under a 32-byte `secret`:
//! 1. prefix-pad `P` to a multiple of 16 bytes (first pad byte = pad
//!    length, rest random);
//! 2. expand `secret` via `HMAC_SHA512(secret, "tde2e_encrypt_data")`
//!    into an encryption key and a MAC key;
//! 3. derive a 16-byte message id as `HMAC_SHA512(mac_key, M)[0..16]`;
//! 4. derive a fresh AES key/IV from `HMAC_SHA512(enc_key, id)`;
//! 5. AES-256-CBC encrypt and prepend the id.

use crate::crypto::{self, Hash256};
use crate::error::{Error, Result};

const MIN_PADDING: usize = 16;
const DATA_INFO: &[u8] = b"tde2e_encrypt_data";
const HEADER_INFO: &[u8] = b"tde2e_encrypt_header";

/// `HMAC_SHA512(secret, "tde2e_combine_secrets")` is *not* how
/// `combine_secrets` itself is defined -- see below; this constant is
/// the `kdf_expand` domain separator used by `encrypt_data`/`decrypt_data`.
fn kdf_expand(secret: &[u8], info: &[u8]) -> [u8; 64] {
    crypto::hmac_sha512(secret, info)
}

fn cbc_state_from_hash(hash: &[u8]) -> ([u8; 32], [u8; 16]) {
    debug_assert!(hash.len() >= 48);
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&hash[0..32]);
    iv.copy_from_slice(&hash[32..48]);
    (key, iv)
}

fn gen_random_prefix(data_len: usize) -> Vec<u8> {
    let padded_total = (MIN_PADDING + 15 + data_len) & !15;
    let pad_len = padded_total - data_len;
    let mut prefix = crypto::secure_random_bytes(pad_len);
    prefix[0] = pad_len as u8;
    prefix
}

/// Encrypts `data` under `secret`, as described in spec.md §4.B steps 1-6.
pub fn encrypt_data(data: &[u8], secret: &[u8]) -> Vec<u8> {
    let prefix = gen_random_prefix(data.len());
    let mut message = prefix;
    message.extend_from_slice(data);
    encrypt_data_with_prefix(&message, secret)
}

fn encrypt_data_with_prefix(message: &[u8], secret: &[u8]) -> Vec<u8> {
    assert_eq!(message.len() % 16, 0);

    let expanded = kdf_expand(secret, DATA_INFO);
    let (enc_secret, mac_secret) = (&expanded[0..32], &expanded[32..64]);

    let msg_id_full = crypto::hmac_sha512(mac_secret, message);
    let msg_id = &msg_id_full[0..16];

    let cbc_seed = crypto::hmac_sha512(enc_secret, msg_id);
    let (aes_key, iv) = cbc_state_from_hash(&cbc_seed);

    let ciphertext = crypto::aes256_cbc_encrypt(&aes_key, &iv, message)
        .expect("message length is already a multiple of 16");

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(msg_id);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts the output of [`encrypt_data`], rejecting malformed input
/// per spec.md §4.B's failure modes.
pub fn decrypt_data(encrypted: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    if encrypted.len() < 16 || encrypted.len() % 16 != 0 {
        return Err(Error::InvalidLength);
    }

    let expanded = kdf_expand(secret, DATA_INFO);
    let (enc_secret, mac_secret) = (&expanded[0..32], &expanded[32..64]);

    let msg_id = &encrypted[0..16];
    let ciphertext = &encrypted[16..];

    let cbc_seed = crypto::hmac_sha512(enc_secret, msg_id);
    let (aes_key, iv) = cbc_state_from_hash(&cbc_seed);

    let message = crypto::aes256_cbc_decrypt(&aes_key, &iv, ciphertext)
        .map_err(|_| Error::InvalidLength)?;

    let expected_msg_id = crypto::hmac_sha512(mac_secret, &message);
    if !crypto::constant_time_eq(&expected_msg_id[0..16], msg_id) {
        return Err(Error::MacMismatch);
    }

    let pad_len = message[0] as usize;
    if pad_len < MIN_PADDING || pad_len > message.len() {
        return Err(Error::InvalidPadding);
    }

    Ok(message[pad_len..].to_vec())
}

/// Wraps a 32-byte `header` with no padding and no authentication tag;
/// callers must rely on the outer envelope or an ECDH-derived secret
/// (spec.md §4.B).
pub fn encrypt_header(header: &[u8; 32], encrypted_message: &[u8], secret: &[u8]) -> Result<[u8; 32]> {
    if encrypted_message.len() < 16 {
        return Err(Error::InvalidLength);
    }
    let expanded = kdf_expand(secret, HEADER_INFO);
    let encryption_key = &expanded[0..32];

    let msg_id = &encrypted_message[0..16];
    let cbc_seed = kdf_expand(encryption_key, msg_id);
    let (aes_key, iv) = cbc_state_from_hash(&cbc_seed);

    let ciphertext = crypto::aes256_cbc_encrypt(&aes_key, &iv, header)
        .expect("header is exactly 32 bytes, block-aligned");
    let mut out = [0u8; 32];
    out.copy_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt_header(encrypted_header: &[u8; 32], encrypted_message: &[u8], secret: &[u8]) -> Result<[u8; 32]> {
    if encrypted_message.len() < 16 {
        return Err(Error::InvalidLength);
    }
    let expanded = kdf_expand(secret, HEADER_INFO);
    let encryption_key = &expanded[0..32];

    let msg_id = &encrypted_message[0..16];
    let cbc_seed = crypto::hmac_sha512(encryption_key, msg_id);
    let (aes_key, iv) = cbc_state_from_hash(&cbc_seed);

    let plaintext = crypto::aes256_cbc_decrypt(&aes_key, &iv, encrypted_header)
        .map_err(|_| Error::InvalidLength)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&plaintext);
    Ok(out)
}

/// `HMAC_SHA512(a, b)[0..32]`, used both for delivering the group shared
/// key (as `kdf_expand`'s sibling) and for deriving the emoji hash in the
/// verification chain (spec.md §4.D).
pub fn combine_secrets(a: &[u8], b: &[u8]) -> Hash256 {
    let combined = crypto::hmac_sha512(a, b);
    let mut out = [0u8; 32];
    out.copy_from_slice(&combined[0..32]);
    out
}

/// PBKDF2-SHA512 key stretching, exposed for embedders that need to turn
/// a passphrase into call key material. The call core itself never calls
/// this.
pub fn kdf(secret: &[u8], password: &[u8], iterations: u32) -> Result<[u8; 64]> {
    let derived = crypto::pbkdf2_sha512(secret, password, iterations, 64)?;
    let mut out = [0u8; 64];
    out.copy_from_slice(&derived);
    Ok(out)
}
