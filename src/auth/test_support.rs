// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token signing helpers shared by the auth tests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::Signer;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
    RSA_PKCS1_SHA256,
};
use serde_json::{json, Value};
use sha2::Sha256;

use super::verification_key::{EcCurve, VerificationKey};

pub const RSA_PRIVATE_PEM: &str = include_str!("testdata/rsa_private.pem");
pub const RSA_PUBLIC_PEM: &str = include_str!("testdata/rsa_public.pem");
pub const P256_PRIVATE_PEM: &str = include_str!("testdata/p256_private.pem");
pub const P256_PUBLIC_PEM: &str = include_str!("testdata/p256_public.pem");

/// Base64url-encode a JSON value as a token segment.
pub fn segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

fn header(alg: &str, kid: Option<&str>) -> Value {
    match kid {
        Some(kid) => json!({ "alg": alg, "typ": "JWT", "kid": kid }),
        None => json!({ "alg": alg, "typ": "JWT" }),
    }
}

fn assemble(signing_input: &str, signature: &[u8]) -> String {
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}

pub fn rsa_public_key() -> VerificationKey {
    VerificationKey::from_pem(RSA_PUBLIC_PEM).unwrap()
}

pub fn p256_public_key() -> VerificationKey {
    VerificationKey::from_pem(P256_PUBLIC_PEM).unwrap()
}

pub fn sign_rs256(kid: Option<&str>, claims: &Value) -> String {
    let pem = pem::parse(RSA_PRIVATE_PEM).unwrap();
    let key = RsaKeyPair::from_pkcs8(pem.contents()).unwrap();
    let input = format!("{}.{}", segment(&header("RS256", kid)), segment(claims));
    let mut signature = vec![0u8; key.public().modulus_len()];
    key.sign(
        &RSA_PKCS1_SHA256,
        &SystemRandom::new(),
        input.as_bytes(),
        &mut signature,
    )
    .unwrap();
    assemble(&input, &signature)
}

pub fn sign_es256(claims: &Value) -> String {
    let rng = SystemRandom::new();
    let pem = pem::parse(P256_PRIVATE_PEM).unwrap();
    let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pem.contents(), &rng)
        .unwrap();
    let input = format!("{}.{}", segment(&header("ES256", None)), segment(claims));
    let signature = key.sign(&rng, input.as_bytes()).unwrap();
    assemble(&input, signature.as_ref())
}

/// Sign with a fresh Ed25519 key; returns the token and its public key.
pub fn sign_eddsa(claims: &Value) -> (String, VerificationKey) {
    let rng = SystemRandom::new();
    let document = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let key = Ed25519KeyPair::from_pkcs8(document.as_ref()).unwrap();
    let input = format!("{}.{}", segment(&header("EdDSA", None)), segment(claims));
    let signature = key.sign(input.as_bytes());
    let public = VerificationKey::ed25519(key.public_key().as_ref().to_vec()).unwrap();
    (assemble(&input, signature.as_ref()), public)
}

/// Sign with a fixed secp256k1 key; returns the token and its public key.
pub fn sign_es256k(claims: &Value) -> (String, VerificationKey) {
    let key = k256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
    let input = format!("{}.{}", segment(&header("ES256K", None)), segment(claims));
    let signature: k256::ecdsa::Signature = key.sign(input.as_bytes());
    let point = key.verifying_key().to_encoded_point(false);
    let public = VerificationKey::ec_from_point(EcCurve::Secp256k1, point.as_bytes().to_vec())
        .unwrap();
    (assemble(&input, &signature.to_bytes()), public)
}

pub fn sign_hs256(secret: &[u8], claims: &Value) -> String {
    let input = format!("{}.{}", segment(&header("HS256", None)), segment(claims));
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret).unwrap();
    mac.update(input.as_bytes());
    assemble(&input, &mac.finalize().into_bytes())
}
