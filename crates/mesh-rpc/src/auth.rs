//! Authenticated shard deletion (spec §4.4, §6, §8 property 8).
//!
//! The canonical signed message is `"{user_address}|{chunk_id}|{shard_index}|{timestamp}"`,
//! signed with Ed25519 and carried as a base64 signature plus a PEM-wrapped
//! public key. Grounded on the verify-trusted-bytes idiom in
//! `Ian-Reitsma-the-block/node/src/net/peer.rs`
//! (`VerifyingKey::from_bytes` / `Signature::from_bytes` / `.verify(...)`).

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use mesh_common::constants::DELETE_SIGNATURE_MAX_SKEW_SECS;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed timestamp: {0}")]
    BadTimestamp(String),
    #[error("signature timestamp skew {0}s exceeds the {max}s limit", max = DELETE_SIGNATURE_MAX_SKEW_SECS)]
    ClockSkew(i64),
    #[error("malformed PEM public key: {0}")]
    BadPublicKeyPem(String),
    #[error("public key is not a valid Ed25519 key: {0}")]
    BadPublicKeyBytes(String),
    #[error("malformed base64 signature: {0}")]
    BadSignatureEncoding(String),
    #[error("malformed signature bytes: {0}")]
    BadSignatureBytes(String),
    #[error("signature does not verify under the supplied public key")]
    SignatureMismatch,
    #[error("empty signature fields rejected: unsigned deletion is disabled")]
    UnsignedDeleteDisabled,
}

/// The canonical message a per-shard deletion signature covers (spec §6).
#[must_use]
pub fn canonical_delete_message(
    user_address: &str,
    chunk_id: u64,
    shard_index: u8,
    timestamp_rfc3339: &str,
) -> String {
    format!("{user_address}|{chunk_id}|{shard_index}|{timestamp_rfc3339}")
}

/// The canonical message a chunk-level API `delete_chunk` signature covers
/// (spec §6): one signature authorizes the whole chunk, independent of how
/// many shards it currently has.
#[must_use]
pub fn canonical_chunk_delete_message(user_address: &str, chunk_id: u64, timestamp_rfc3339: &str) -> String {
    format!("{user_address}|{chunk_id}|{timestamp_rfc3339}")
}

/// Sign a canonical delete message. Used by clients and by tests that
/// exercise the verification path end to end.
#[must_use]
pub fn sign_delete_message(signing_key: &SigningKey, message: &str) -> String {
    use ed25519_dalek::Signer;
    let sig: Signature = signing_key.sign(message.as_bytes());
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, sig.to_bytes())
}

/// Verify a `delete_shard` request (spec §4.4 authenticated deletion
/// contract). `allow_unsigned` gates the staged-rollout fallback that
/// accepts empty signature fields with a caller-side warning log; the
/// spec requires this be `false` in production (§9 open question 3).
pub fn verify_delete(
    user_address: &str,
    chunk_id: u64,
    shard_index: u8,
    timestamp_rfc3339: &str,
    signature_b64: &str,
    public_key_pem: &str,
    now: DateTime<Utc>,
    allow_unsigned: bool,
) -> Result<(), AuthError> {
    let message = canonical_delete_message(user_address, chunk_id, shard_index, timestamp_rfc3339);
    verify_signed_message(&message, timestamp_rfc3339, signature_b64, public_key_pem, now, allow_unsigned)
}

/// Verify a chunk-level `delete_chunk` API call (spec §4.9/§6): same
/// signature mechanics as a per-shard delete, over the shorter chunk-level
/// canonical message.
pub fn verify_chunk_delete(
    user_address: &str,
    chunk_id: u64,
    timestamp_rfc3339: &str,
    signature_b64: &str,
    public_key_pem: &str,
    now: DateTime<Utc>,
    allow_unsigned: bool,
) -> Result<(), AuthError> {
    let message = canonical_chunk_delete_message(user_address, chunk_id, timestamp_rfc3339);
    verify_signed_message(&message, timestamp_rfc3339, signature_b64, public_key_pem, now, allow_unsigned)
}

fn verify_signed_message(
    message: &str,
    timestamp_rfc3339: &str,
    signature_b64: &str,
    public_key_pem: &str,
    now: DateTime<Utc>,
    allow_unsigned: bool,
) -> Result<(), AuthError> {
    if signature_b64.is_empty() && public_key_pem.is_empty() {
        return if allow_unsigned {
            Ok(())
        } else {
            Err(AuthError::UnsignedDeleteDisabled)
        };
    }

    let timestamp = DateTime::parse_from_rfc3339(timestamp_rfc3339)
        .map_err(|e| AuthError::BadTimestamp(e.to_string()))?
        .with_timezone(&Utc);
    let skew = (now - timestamp).num_seconds().abs();
    if skew > DELETE_SIGNATURE_MAX_SKEW_SECS {
        return Err(AuthError::ClockSkew(skew));
    }

    let pem = pem::parse(public_key_pem).map_err(|e| AuthError::BadPublicKeyPem(e.to_string()))?;
    let key_bytes: [u8; 32] = pem
        .contents()
        .try_into()
        .map_err(|_| AuthError::BadPublicKeyBytes("expected 32-byte Ed25519 public key".to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|e| AuthError::BadPublicKeyBytes(e.to_string()))?;

    let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signature_b64)
        .map_err(|e| AuthError::BadSignatureEncoding(e.to_string()))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| AuthError::BadSignatureBytes("expected 64-byte signature".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| AuthError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn pem_encode(key: &VerifyingKey) -> String {
        pem::encode(&pem::Pem::new("PUBLIC KEY", key.to_bytes().to_vec()))
    }

    #[test]
    fn valid_signature_verifies() {
        let signing_key = keypair();
        let verifying_key = signing_key.verifying_key();
        let ts = Utc::now().to_rfc3339();
        let message = canonical_delete_message("0xabc", 7, 2, &ts);
        let sig = sign_delete_message(&signing_key, &message);

        verify_delete(
            "0xabc",
            7,
            2,
            &ts,
            &sig,
            &pem_encode(&verifying_key),
            Utc::now(),
            false,
        )
        .unwrap();
    }

    #[test]
    fn tampered_field_fails_verification() {
        let signing_key = keypair();
        let verifying_key = signing_key.verifying_key();
        let ts = Utc::now().to_rfc3339();
        let message = canonical_delete_message("0xabc", 7, 2, &ts);
        let sig = sign_delete_message(&signing_key, &message);

        let err = verify_delete(
            "0xabc",
            7,
            3, // tampered shard_index
            &ts,
            &sig,
            &pem_encode(&verifying_key),
            Utc::now(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::SignatureMismatch));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let signing_key = keypair();
        let verifying_key = signing_key.verifying_key();
        let old_ts = (Utc::now() - chrono::Duration::minutes(6)).to_rfc3339();
        let message = canonical_delete_message("0xabc", 7, 2, &old_ts);
        let sig = sign_delete_message(&signing_key, &message);

        let err = verify_delete(
            "0xabc",
            7,
            2,
            &old_ts,
            &sig,
            &pem_encode(&verifying_key),
            Utc::now(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::ClockSkew(_)));
    }

    #[test]
    fn empty_signature_rejected_unless_explicitly_allowed() {
        let err = verify_delete("0xabc", 7, 2, "", "", "", Utc::now(), false).unwrap_err();
        assert!(matches!(err, AuthError::UnsignedDeleteDisabled));

        verify_delete("0xabc", 7, 2, "", "", "", Utc::now(), true).unwrap();
    }
}
