//! Ed25519 verification of inbound interaction HTTP requests.
//!
//! Discord signs every interaction webhook with the application's Ed25519
//! key: the signature (hex, `X-Signature-Ed25519`) covers the
//! `X-Signature-Timestamp` header value concatenated with the raw request
//! body. The verifier is framework-free: callers hand it the two header
//! values and the captured body, so the body stays available for
//! downstream JSON decoding.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "X-Signature-Ed25519";

/// Header carrying the signed timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Signature-Timestamp";

/// Verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The configured public key is not a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature header is missing, not hex, or not 64 bytes.
    #[error("malformed signature")]
    MalformedSignature,

    /// The signature does not match `timestamp || body`.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Result type for verification.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Verifier for one application's interaction endpoint.
#[derive(Debug, Clone)]
pub struct InteractionVerifier {
    public_key: VerifyingKey,
}

impl InteractionVerifier {
    /// Create from the hex public key shown in the developer portal.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidPublicKey`] for malformed keys.
    pub fn from_hex(public_key_hex: &str) -> VerifyResult<Self> {
        let bytes = hex::decode(public_key_hex).map_err(|_| VerifyError::InvalidPublicKey)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VerifyError::InvalidPublicKey)?;
        Self::from_bytes(&key)
    }

    /// Create from raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidPublicKey`] for malformed keys.
    pub fn from_bytes(public_key: &[u8; 32]) -> VerifyResult<Self> {
        let public_key =
            VerifyingKey::from_bytes(public_key).map_err(|_| VerifyError::InvalidPublicKey)?;
        Ok(Self { public_key })
    }

    /// Verify one request.
    ///
    /// `signature_hex` and `timestamp` are the raw values of
    /// [`SIGNATURE_HEADER`] and [`TIMESTAMP_HEADER`]; `body` is the full
    /// request body as read off the wire.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedSignature`] when the signature is
    /// not 64 hex-decoded bytes and [`VerifyError::VerificationFailed`]
    /// when it does not match.
    pub fn verify(&self, signature_hex: &str, timestamp: &str, body: &[u8]) -> VerifyResult<()> {
        let sig_bytes = hex::decode(signature_hex).map_err(|_| VerifyError::MalformedSignature)?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| VerifyError::MalformedSignature)?;
        let signature = Signature::from_bytes(&sig_array);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.public_key
            .verify(&message, &signature)
            .map_err(|_| VerifyError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn sign(timestamp: &str, body: &[u8]) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        hex::encode(test_key().sign(&message).to_bytes())
    }

    fn verifier() -> InteractionVerifier {
        InteractionVerifier::from_bytes(&test_key().verifying_key().to_bytes()).unwrap()
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"type":1}"#;
        let signature = sign("1700000000", body);
        assert!(verifier().verify(&signature, "1700000000", body).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let signature = sign("1700000000", br#"{"type":1}"#);
        let err = verifier()
            .verify(&signature, "1700000000", br#"{"type":2}"#)
            .unwrap_err();
        assert!(matches!(err, VerifyError::VerificationFailed));
    }

    #[test]
    fn tampered_timestamp_fails() {
        let body = br#"{"type":1}"#;
        let signature = sign("1700000000", body);
        let err = verifier()
            .verify(&signature, "1700000001", body)
            .unwrap_err();
        assert!(matches!(err, VerifyError::VerificationFailed));
    }

    #[test]
    fn short_signature_is_malformed() {
        let err = verifier().verify("deadbeef", "t", b"x").unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSignature));
    }

    #[test]
    fn non_hex_signature_is_malformed() {
        let err = verifier().verify("not-hex!", "t", b"x").unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSignature));
    }

    #[test]
    fn hex_public_key_roundtrip() {
        let hex_key = hex::encode(test_key().verifying_key().to_bytes());
        let verifier = InteractionVerifier::from_hex(&hex_key).unwrap();

        let body = b"payload";
        let signature = sign("123", body);
        assert!(verifier.verify(&signature, "123", body).is_ok());
    }

    #[test]
    fn bad_public_key_rejected() {
        assert!(matches!(
            InteractionVerifier::from_hex("zz"),
            Err(VerifyError::InvalidPublicKey)
        ));
    }
}
