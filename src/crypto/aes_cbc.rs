//! AES-256-CBC with no padding (spec.md §4.A). The caller guarantees
//! input lengths are multiples of 16 bytes; this module never pads.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{Error, Result};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

pub fn encrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
        return Err(Error::CryptoFailure("aes_cbc_encrypt: input is not block-aligned"));
    }
    let mut buffer = data.to_vec();
    let written_len = buffer.len();
    let ciphertext = Encryptor::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, written_len)
        .map_err(|_| Error::CryptoFailure("aes_cbc_encrypt failed"))?;
    Ok(ciphertext.to_vec())
}

pub fn decrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
        return Err(Error::CryptoFailure("aes_cbc_decrypt: input is not block-aligned"));
    }
    let mut buffer = data.to_vec();
    let plaintext = Decryptor::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::CryptoFailure("aes_cbc_decrypt failed"))?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let data = [1u8; 48];
        let ciphertext = encrypt(&key, &iv, &data).unwrap();
        let plaintext = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(plaintext, data);
    }

    #[test]
    fn rejects_unaligned_input() {
        let key = [0u8; 32];
        let iv = [0u8; 16];
        assert!(encrypt(&key, &iv, &[0u8; 15]).is_err());
    }
}
