//! Signature verification
//!
//! Verifies a JWS signing input against a parsed [`VerificationKey`]. ECDSA
//! signatures arrive in IEEE P-1363 fixed-length form on the JWS wire
//! (RFC 7518 Section 3.4); ASN.1 DER input is detected and normalized to the
//! form the RustCrypto verifiers consume. Lengths matching neither encoding
//! for the key's curve are rejected outright.

use signature::Verifier;

use crate::error::ValidationError;

use super::{JwsAlgorithm, VerificationKey};

/// Verifies `signature` over `signing_input` with the given key and algorithm.
///
/// Returns [`ValidationError::AlgorithmKeyMismatch`] when the key type cannot
/// serve the declared algorithm and [`ValidationError::BadSignature`] for any
/// decoding or verification failure.
pub fn verify_signature(
    key: &VerificationKey,
    alg: JwsAlgorithm,
    signing_input: &[u8],
    signature: &[u8],
) -> Result<(), ValidationError> {
    match (key, alg) {
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::RS256) => {
            let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(rsa_key.clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::RS384) => {
            let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha384>::new(rsa_key.clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::RS512) => {
            let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha512>::new(rsa_key.clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::PS256) => {
            let vk = rsa::pss::VerifyingKey::<sha2::Sha256>::new(rsa_key.clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::PS384) => {
            let vk = rsa::pss::VerifyingKey::<sha2::Sha384>::new(rsa_key.clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Rsa(rsa_key), JwsAlgorithm::PS512) => {
            let vk = rsa::pss::VerifyingKey::<sha2::Sha512>::new(rsa_key.clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::P256(vk), JwsAlgorithm::ES256) => {
            let sig = parse_p256_signature(signature)?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::P384(vk), JwsAlgorithm::ES384) => {
            let sig = parse_p384_signature(signature)?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::P521(vk), JwsAlgorithm::ES512) => {
            let sig = parse_p521_signature(signature)?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (VerificationKey::Ed25519(vk), JwsAlgorithm::EdDSA) => {
            let sig = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))?;
            vk.verify(signing_input, &sig)
                .map_err(|e| ValidationError::BadSignature(e.to_string()))
        }
        (key, alg) => Err(ValidationError::AlgorithmKeyMismatch(format!(
            "{} key cannot verify {alg}",
            key.kind()
        ))),
    }
}

// ECDSA signature parsing: accept P-1363 at the curve's exact 2n length,
// otherwise attempt DER. Anything else is a bad signature.

fn parse_p256_signature(bytes: &[u8]) -> Result<p256::ecdsa::Signature, ValidationError> {
    if bytes.len() == 64 {
        p256::ecdsa::Signature::from_slice(bytes)
            .map_err(|e| ValidationError::BadSignature(e.to_string()))
    } else {
        p256::ecdsa::Signature::from_der(bytes).map_err(|_| {
            ValidationError::BadSignature(format!(
                "ES256 signature must be 64 bytes P-1363 or DER, got {} bytes",
                bytes.len()
            ))
        })
    }
}

fn parse_p384_signature(bytes: &[u8]) -> Result<p384::ecdsa::Signature, ValidationError> {
    if bytes.len() == 96 {
        p384::ecdsa::Signature::from_slice(bytes)
            .map_err(|e| ValidationError::BadSignature(e.to_string()))
    } else {
        p384::ecdsa::Signature::from_der(bytes).map_err(|_| {
            ValidationError::BadSignature(format!(
                "ES384 signature must be 96 bytes P-1363 or DER, got {} bytes",
                bytes.len()
            ))
        })
    }
}

fn parse_p521_signature(bytes: &[u8]) -> Result<p521::ecdsa::Signature, ValidationError> {
    if bytes.len() == 132 {
        p521::ecdsa::Signature::from_slice(bytes)
            .map_err(|e| ValidationError::BadSignature(e.to_string()))
    } else {
        p521::ecdsa::Signature::from_der(bytes).map_err(|_| {
            ValidationError::BadSignature(format!(
                "ES512 signature must be 132 bytes P-1363 or DER, got {} bytes",
                bytes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer as _;

    fn p256_pair() -> (p256::ecdsa::SigningKey, VerificationKey) {
        let signing = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let verifying = VerificationKey::P256(*signing.verifying_key());
        (signing, verifying)
    }

    #[test]
    fn es256_p1363_signature_verifies() {
        let (signing, verifying) = p256_pair();
        let input = b"header.payload";
        let sig: p256::ecdsa::Signature = signing.sign(input);
        let raw = sig.to_bytes();
        assert_eq!(raw.len(), 64);

        verify_signature(&verifying, JwsAlgorithm::ES256, input, &raw).unwrap();
    }

    #[test]
    fn es256_der_signature_is_normalized_and_verifies() {
        let (signing, verifying) = p256_pair();
        let input = b"header.payload";
        let sig: p256::ecdsa::Signature = signing.sign(input);
        let der = sig.to_der();

        verify_signature(&verifying, JwsAlgorithm::ES256, input, der.as_bytes()).unwrap();
    }

    #[test]
    fn es256_truncated_signature_is_rejected() {
        let (signing, verifying) = p256_pair();
        let input = b"header.payload";
        let sig: p256::ecdsa::Signature = signing.sign(input);
        let raw = sig.to_bytes();
        let truncated = &raw[..63];

        let err = verify_signature(&verifying, JwsAlgorithm::ES256, input, truncated).unwrap_err();
        assert!(matches!(err, ValidationError::BadSignature(_)));
    }

    #[test]
    fn es256_tampered_signature_is_rejected() {
        let (signing, verifying) = p256_pair();
        let input = b"header.payload";
        let sig: p256::ecdsa::Signature = signing.sign(input);
        let mut raw = sig.to_bytes().to_vec();
        raw[10] ^= 0x01;

        let result = verify_signature(&verifying, JwsAlgorithm::ES256, input, &raw);
        assert!(matches!(result, Err(ValidationError::BadSignature(_))));
    }

    #[test]
    fn ed25519_signature_verifies() {
        use ed25519_dalek::Signer as _;
        let signing = ed25519_dalek::SigningKey::generate(&mut rand::thread_rng());
        let verifying = VerificationKey::Ed25519(signing.verifying_key());
        let input = b"header.payload";
        let sig = signing.sign(input);

        verify_signature(&verifying, JwsAlgorithm::EdDSA, input, &sig.to_bytes()).unwrap();
    }

    #[test]
    fn key_algorithm_mismatch_is_typed() {
        let (_, verifying) = p256_pair();
        let err = verify_signature(&verifying, JwsAlgorithm::RS256, b"input", &[0u8; 256])
            .unwrap_err();
        assert!(matches!(err, ValidationError::AlgorithmKeyMismatch(_)));
    }
}
