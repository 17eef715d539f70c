// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token signature verification.
//!
//! The signature covers the raw `header.payload` segments as received, never
//! a re-serialization. A key of the wrong family for the declared algorithm
//! simply does not verify; an algorithm outside the supported set is an
//! error so it can never pass silently.

use std::str::FromStr;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::Verifier;
use ring::signature::{self as ring_sig, RsaPublicKeyComponents, UnparsedPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use super::error::AuthErrorReason;
use super::token::Jwt;
use super::verification_key::{EcCurve, VerificationKey};

/// Signature algorithms accepted in the token header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
    ES256K,
    EdDSA,
    HS256,
    HS384,
    HS512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES256K => "ES256K",
            Algorithm::EdDSA => "EdDSA",
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
        }
    }
}

impl FromStr for Algorithm {
    type Err = AuthErrorReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            "ES256" => Ok(Algorithm::ES256),
            "ES384" => Ok(Algorithm::ES384),
            "ES256K" => Ok(Algorithm::ES256K),
            "EdDSA" => Ok(Algorithm::EdDSA),
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(AuthErrorReason::UnsupportedAlgorithm),
        }
    }
}

/// Verify a decoded token's signature.
///
/// `Ok(false)` means the signature does not verify under `key`.
pub fn verify<P>(token: &Jwt<P>, key: &VerificationKey) -> Result<bool, AuthErrorReason> {
    let algorithm: Algorithm = token.header().alg.parse()?;
    Ok(verify_signature(
        algorithm,
        token.signing_input(),
        token.signature(),
        key,
    ))
}

/// Verify `signature` over `message` with an explicit algorithm.
pub fn verify_signature(
    algorithm: Algorithm,
    message: &[u8],
    signature: &[u8],
    key: &VerificationKey,
) -> bool {
    match (algorithm, key) {
        (Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512, VerificationKey::Rsa { n, e }) => {
            let params = match algorithm {
                Algorithm::RS256 => &ring_sig::RSA_PKCS1_2048_8192_SHA256,
                Algorithm::RS384 => &ring_sig::RSA_PKCS1_2048_8192_SHA384,
                _ => &ring_sig::RSA_PKCS1_2048_8192_SHA512,
            };
            RsaPublicKeyComponents {
                n: n.as_slice(),
                e: e.as_slice(),
            }
            .verify(params, message, signature)
            .is_ok()
        }
        (
            Algorithm::ES256,
            VerificationKey::Ec {
                curve: EcCurve::P256,
                point,
            },
        ) => UnparsedPublicKey::new(&ring_sig::ECDSA_P256_SHA256_FIXED, point)
            .verify(message, signature)
            .is_ok(),
        (
            Algorithm::ES384,
            VerificationKey::Ec {
                curve: EcCurve::P384,
                point,
            },
        ) => UnparsedPublicKey::new(&ring_sig::ECDSA_P384_SHA384_FIXED, point)
            .verify(message, signature)
            .is_ok(),
        (
            Algorithm::ES256K,
            VerificationKey::Ec {
                curve: EcCurve::Secp256k1,
                point,
            },
        ) => verify_secp256k1(point, message, signature),
        (Algorithm::EdDSA, VerificationKey::Ed25519(public_key)) => {
            UnparsedPublicKey::new(&ring_sig::ED25519, public_key)
                .verify(message, signature)
                .is_ok()
        }
        (Algorithm::HS256, VerificationKey::Hmac(secret)) => {
            verify_mac::<Hmac<Sha256>>(secret, message, signature)
        }
        (Algorithm::HS384, VerificationKey::Hmac(secret)) => {
            verify_mac::<Hmac<Sha384>>(secret, message, signature)
        }
        (Algorithm::HS512, VerificationKey::Hmac(secret)) => {
            verify_mac::<Hmac<Sha512>>(secret, message, signature)
        }
        _ => {
            tracing::debug!(
                algorithm = algorithm.as_str(),
                key = ?key,
                "Key type does not match token algorithm"
            );
            false
        }
    }
}

fn verify_secp256k1(point: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(point) else {
        return false;
    };
    let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// HMAC comparison through `verify_slice`, which is constant-time.
fn verify_mac<M: Mac + KeyInit>(secret: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(mut mac) = <M as KeyInit>::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(signature).is_ok()
}
