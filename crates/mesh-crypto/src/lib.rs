//! Mesh Storage Crypto - client-side content encryption (spec §4.3)
//!
//! AES-256-GCM with a 96-bit random nonce and 128-bit auth tag. Three
//! password-based-KDF modes derive the 256-bit key: wallet address,
//! signature string, or a user-supplied password. Grounded on the
//! teacher's `aes-gcm`/`sha2` crate choices, enriched with `pbkdf2` and
//! `zeroize` from the `saorsa-fec` sibling example (see DESIGN.md) since
//! the teacher has no password-KDF path of its own (its auth code signs
//! HTTP requests, it does not encrypt blobs).

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key as AesKey, Nonce};
use mesh_common::{UserAddress, UserAddressError};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid wallet address: {0}")]
    InvalidWalletAddress(#[from] UserAddressError),
    #[error("signature must be at least 10 characters")]
    SignatureTooShort,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("decryption failed: wrong key, tampered ciphertext, or malformed nonce")]
    AuthFailure,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// How the 256-bit content key is derived (spec §4.3).
pub enum KeyMode {
    /// KDF input: the lowercase hex body of a wallet address, `0x` stripped.
    Wallet(UserAddress),
    /// KDF input: the full signature string, as bytes.
    Signature(String),
    /// KDF input: a user-supplied password.
    Password(String),
}

/// A derived 256-bit AES key, zeroized on drop.
pub struct ContentKey(Zeroizing<[u8; 32]>);

impl ContentKey {
    fn as_aes_key(&self) -> &AesKey<Aes256Gcm> {
        AesKey::<Aes256Gcm>::from_slice(self.0.as_slice())
    }
}

/// Derive the 256-bit content key for `mode` via PBKDF2-HMAC-SHA256,
/// 100,000 iterations, fixed application salt (spec §4.3/§6).
pub fn derive_key(mode: &KeyMode) -> Result<ContentKey> {
    let input: Vec<u8> = match mode {
        KeyMode::Wallet(addr) => addr.hex_body_lowercase().into_bytes(),
        KeyMode::Signature(sig) => {
            if sig.len() < 10 {
                return Err(CryptoError::SignatureTooShort);
            }
            sig.clone().into_bytes()
        }
        KeyMode::Password(pw) => {
            if pw.is_empty() {
                return Err(CryptoError::EmptyPassword);
            }
            pw.clone().into_bytes()
        }
    };

    let mut key = Zeroizing::new([0u8; mesh_common::constants::KDF_OUTPUT_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        &input,
        mesh_common::constants::KDF_SALT,
        mesh_common::constants::KDF_ITERATIONS,
        key.as_mut_slice(),
    );
    Ok(ContentKey(key))
}

/// Wire/durable form of an encrypted blob (spec §3/§6): a 12-byte nonce and
/// ciphertext (which includes the 16-byte auth tag).
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Authenticated-encrypt `plaintext` under `key`, with a fresh random nonce
/// (spec property: two encryptions of the same plaintext never collide).
#[must_use]
pub fn encrypt(plaintext: &[u8], key: &ContentKey) -> EncryptedBlob {
    let cipher = Aes256Gcm::new(key.as_aes_key());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    // `encrypt` only fails on plaintext length limits far beyond anything
    // this engine's 100 MiB API ceiling allows.
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("plaintext within AES-GCM length limits");
    EncryptedBlob {
        nonce: nonce.as_slice().try_into().expect("AES-GCM nonce is 12 bytes"),
        ciphertext,
    }
}

/// Decrypt `blob` under `key`. Fails with `AuthFailure` on a wrong key,
/// tampered ciphertext, or malformed nonce (spec §4.3).
pub fn decrypt(blob: &EncryptedBlob, key: &ContentKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_aes_key());
    let nonce = Nonce::from_slice(&blob.nonce);
    cipher
        .decrypt(nonce, blob.ciphertext.as_slice())
        .map_err(|_| CryptoError::AuthFailure)
}

/// Hex digest of `plaintext`, for external integrity checking (spec §4.3).
#[must_use]
pub fn digest_hex(plaintext: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(Sha256::digest(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(n: u8) -> UserAddress {
        UserAddress::new(format!("0x{}", n.to_string().repeat(40))).unwrap()
    }

    #[test]
    fn round_trip() {
        let key = derive_key(&KeyMode::Password("hunter2".into())).unwrap();
        let blob = encrypt(b"hello mesh", &key);
        assert_eq!(decrypt(&blob, &key).unwrap(), b"hello mesh");
    }

    #[test]
    fn wrong_key_fails_auth() {
        let key_a = derive_key(&KeyMode::Password("a".into())).unwrap();
        let key_b = derive_key(&KeyMode::Password("b".into())).unwrap();
        let blob = encrypt(b"secret", &key_a);
        assert!(matches!(decrypt(&blob, &key_b), Err(CryptoError::AuthFailure)));
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = derive_key(&KeyMode::Password("a".into())).unwrap();
        let mut blob = encrypt(b"secret", &key);
        let last = blob.ciphertext.len() - 1;
        blob.ciphertext[last] ^= 0xff;
        assert!(matches!(decrypt(&blob, &key), Err(CryptoError::AuthFailure)));
    }

    #[test]
    fn nonce_is_unique_per_encryption() {
        let key = derive_key(&KeyMode::Password("a".into())).unwrap();
        let a = encrypt(b"same plaintext", &key);
        let b = encrypt(b"same plaintext", &key);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wallet_and_signature_modes_derive_distinct_keys() {
        let wallet_key = derive_key(&KeyMode::Wallet(wallet(1))).unwrap();
        let sig_key = derive_key(&KeyMode::Signature("0123456789abcdef".into())).unwrap();
        let blob = encrypt(b"payload", &wallet_key);
        assert!(decrypt(&blob, &sig_key).is_err());
    }

    #[test]
    fn short_signature_rejected() {
        assert!(matches!(
            derive_key(&KeyMode::Signature("short".into())),
            Err(CryptoError::SignatureTooShort)
        ));
    }

    #[test]
    fn empty_password_rejected() {
        assert!(matches!(
            derive_key(&KeyMode::Password(String::new())),
            Err(CryptoError::EmptyPassword)
        ));
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_hex(b"abc"), digest_hex(b"abc"));
        assert_ne!(digest_hex(b"abc"), digest_hex(b"abd"));
    }
}
