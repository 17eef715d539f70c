// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key material.
//!
//! Keys come from three places:
//!
//! - a PEM public key configured on the deployment (`CLERK_JWT_KEY`),
//!   with or without armor, possibly with escaped `\n` line breaks
//! - a JWK from an already-fetched key set
//! - raw components, mostly in tests
//!
//! The core never fetches or caches keys. [`KeySource`] is what a caller
//! hands in once key resolution is done.

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet};
use pkcs1::RsaPublicKey;
use spki::der::Decode;
use spki::{ObjectIdentifier, SubjectPublicKeyInfoRef};

use super::error::AuthErrorReason;
use super::token::{decode_base64url, TokenHeader};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const SECP256K1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.10");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Elliptic curves we verify signatures on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
    Secp256k1,
}

impl EcCurve {
    fn coordinate_len(&self) -> usize {
        match self {
            EcCurve::P256 | EcCurve::Secp256k1 => 32,
            EcCurve::P384 => 48,
        }
    }
}

/// A public (or shared-secret) key a token signature is checked against.
#[derive(Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// RSA modulus and exponent, big-endian without leading zeros
    Rsa { n: Vec<u8>, e: Vec<u8> },
    /// Uncompressed SEC1 point (`0x04 || x || y`)
    Ec { curve: EcCurve, point: Vec<u8> },
    /// 32-byte Ed25519 public key
    Ed25519(Vec<u8>),
    /// Shared HMAC secret
    Hmac(Vec<u8>),
}

// Secrets must not end up in logs.
impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationKey::Rsa { n, .. } => write!(f, "Rsa({} bits)", n.len() * 8),
            VerificationKey::Ec { curve, .. } => write!(f, "Ec({curve:?})"),
            VerificationKey::Ed25519(_) => write!(f, "Ed25519"),
            VerificationKey::Hmac(_) => write!(f, "Hmac(<redacted>)"),
        }
    }
}

impl VerificationKey {
    /// Parse a PEM public key (SPKI `PUBLIC KEY` or PKCS#1 `RSA PUBLIC KEY`).
    ///
    /// Bare base64 bodies are accepted and treated as SPKI.
    pub fn from_pem(input: &str) -> Result<Self, AuthErrorReason> {
        let normalized = input.trim().replace("\\n", "\n");
        let armored = if normalized.contains("-----BEGIN") {
            normalized
        } else {
            let body: String = normalized.split_whitespace().collect();
            let mut armored = String::from("-----BEGIN PUBLIC KEY-----\n");
            for chunk in body.as_bytes().chunks(64) {
                armored.push_str(std::str::from_utf8(chunk).unwrap_or_default());
                armored.push('\n');
            }
            armored.push_str("-----END PUBLIC KEY-----\n");
            armored
        };

        let pem = pem::parse(armored).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
        match pem.tag() {
            "PUBLIC KEY" => Self::from_spki_der(pem.contents()),
            "RSA PUBLIC KEY" => Self::from_pkcs1_der(pem.contents()),
            _ => Err(AuthErrorReason::InvalidVerificationKey),
        }
    }

    /// Parse a DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, AuthErrorReason> {
        const ERR: AuthErrorReason = AuthErrorReason::InvalidVerificationKey;

        let spki = SubjectPublicKeyInfoRef::from_der(der).map_err(|_| ERR)?;
        // `None` when the bit string has unused bits.
        let key = spki.subject_public_key.as_bytes().ok_or(ERR)?;
        let oid = spki.algorithm.oid;

        if oid == RSA_ENCRYPTION {
            Self::from_pkcs1_der(key)
        } else if oid == EC_PUBLIC_KEY {
            let curve_oid = spki.algorithm.parameters_oid().map_err(|_| ERR)?;
            let curve = if curve_oid == PRIME256V1 {
                EcCurve::P256
            } else if curve_oid == SECP384R1 {
                EcCurve::P384
            } else if curve_oid == SECP256K1 {
                EcCurve::Secp256k1
            } else {
                return Err(ERR);
            };
            Self::ec_from_point(curve, key.to_vec())
        } else if oid == ED25519 {
            Self::ed25519(key.to_vec())
        } else {
            Err(ERR)
        }
    }

    /// Parse a DER PKCS#1 `RSAPublicKey`.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, AuthErrorReason> {
        let key =
            RsaPublicKey::from_der(der).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
        Self::rsa_from_components(key.modulus.as_bytes(), key.public_exponent.as_bytes())
    }

    /// RSA key from big-endian modulus and exponent.
    pub fn rsa_from_components(n: &[u8], e: &[u8]) -> Result<Self, AuthErrorReason> {
        let n = strip_leading_zeros(n);
        let e = strip_leading_zeros(e);
        if n.is_empty() || e.is_empty() {
            return Err(AuthErrorReason::InvalidVerificationKey);
        }
        Ok(VerificationKey::Rsa {
            n: n.to_vec(),
            e: e.to_vec(),
        })
    }

    /// EC key from affine coordinates.
    pub fn ec_from_coordinates(curve: EcCurve, x: &[u8], y: &[u8]) -> Result<Self, AuthErrorReason> {
        let len = curve.coordinate_len();
        if x.len() != len || y.len() != len {
            return Err(AuthErrorReason::InvalidVerificationKey);
        }
        let mut point = Vec::with_capacity(1 + 2 * len);
        point.push(0x04);
        point.extend_from_slice(x);
        point.extend_from_slice(y);
        Ok(VerificationKey::Ec { curve, point })
    }

    /// EC key from an uncompressed SEC1 point.
    pub fn ec_from_point(curve: EcCurve, point: Vec<u8>) -> Result<Self, AuthErrorReason> {
        if point.len() != 1 + 2 * curve.coordinate_len() || point[0] != 0x04 {
            return Err(AuthErrorReason::InvalidVerificationKey);
        }
        Ok(VerificationKey::Ec { curve, point })
    }

    pub fn ed25519(key: Vec<u8>) -> Result<Self, AuthErrorReason> {
        if key.len() != 32 {
            return Err(AuthErrorReason::InvalidVerificationKey);
        }
        Ok(VerificationKey::Ed25519(key))
    }

    pub fn hmac(secret: impl Into<Vec<u8>>) -> Self {
        VerificationKey::Hmac(secret.into())
    }
}

impl TryFrom<&Jwk> for VerificationKey {
    type Error = AuthErrorReason;

    fn try_from(jwk: &Jwk) -> Result<Self, Self::Error> {
        match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                let n = decode_base64url(&rsa.n).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                let e = decode_base64url(&rsa.e).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                Self::rsa_from_components(&n, &e)
            }
            AlgorithmParameters::EllipticCurve(ec) => {
                let curve = match ec.curve {
                    EllipticCurve::P256 => EcCurve::P256,
                    EllipticCurve::P384 => EcCurve::P384,
                    _ => return Err(AuthErrorReason::InvalidVerificationKey),
                };
                let x = decode_base64url(&ec.x).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                let y = decode_base64url(&ec.y).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                Self::ec_from_coordinates(curve, &x, &y)
            }
            AlgorithmParameters::OctetKeyPair(okp) if okp.curve == EllipticCurve::Ed25519 => {
                let x = decode_base64url(&okp.x).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                Self::ed25519(x)
            }
            AlgorithmParameters::OctetKey(oct) => {
                let secret =
                    decode_base64url(&oct.value).map_err(|_| AuthErrorReason::InvalidVerificationKey)?;
                Ok(Self::hmac(secret))
            }
            _ => Err(AuthErrorReason::InvalidVerificationKey),
        }
    }
}

/// Keys from an already-fetched key set, looked up by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<(Option<String>, VerificationKey)>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JWKS document, skipping keys we cannot use.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut set = Self::new();
        for jwk in &jwks.keys {
            match VerificationKey::try_from(jwk) {
                Ok(key) => set.insert(jwk.common.key_id.clone(), key),
                Err(_) => tracing::warn!(
                    kid = ?jwk.common.key_id,
                    "Skipping unsupported key in JWKS"
                ),
            }
        }
        set
    }

    pub fn insert(&mut self, kid: Option<String>, key: VerificationKey) {
        self.keys.push((kid, key));
    }

    /// Find the key for `kid`. Tokens without a `kid` get the first key.
    pub fn find(&self, kid: Option<&str>) -> Result<&VerificationKey, AuthErrorReason> {
        let found = match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|(key_id, _)| key_id.as_deref() == Some(kid)),
            None => self.keys.first(),
        };
        found.map(|(_, key)| key).ok_or(AuthErrorReason::KeyNotFound)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Where the key for a token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// One configured key; the token's `kid` is not consulted
    Static(VerificationKey),
    /// A fetched key set, matched by `kid`
    KeySet(KeySet),
}

impl KeySource {
    pub fn resolve(&self, header: &TokenHeader) -> Result<&VerificationKey, AuthErrorReason> {
        match self {
            KeySource::Static(key) => Ok(key),
            KeySource::KeySet(set) => set.find(header.kid.as_deref()),
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PUBLIC_PEM: &str = include_str!("testdata/rsa_public.pem");
    const P256_PUBLIC_PEM: &str = include_str!("testdata/p256_public.pem");

    #[test]
    fn parses_rsa_spki_pem() {
        let key = VerificationKey::from_pem(RSA_PUBLIC_PEM).unwrap();
        match key {
            VerificationKey::Rsa { n, e } => {
                assert_eq!(n.len(), 256);
                assert_eq!(e, vec![0x01, 0x00, 0x01]);
            }
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn parses_pem_without_armor_and_with_escaped_newlines() {
        let expected = VerificationKey::from_pem(RSA_PUBLIC_PEM).unwrap();

        let body: String = RSA_PUBLIC_PEM
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();
        assert_eq!(VerificationKey::from_pem(&body).unwrap(), expected);

        let escaped = RSA_PUBLIC_PEM.trim().replace('\n', "\\n");
        assert_eq!(VerificationKey::from_pem(&escaped).unwrap(), expected);
    }

    #[test]
    fn parses_p256_spki_pem() {
        let key = VerificationKey::from_pem(P256_PUBLIC_PEM).unwrap();
        match key {
            VerificationKey::Ec { curve, point } => {
                assert_eq!(curve, EcCurve::P256);
                assert_eq!(point.len(), 65);
                assert_eq!(point[0], 0x04);
            }
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn parses_pkcs1_rsa_public_key() {
        let spki_der = pem::parse(RSA_PUBLIC_PEM).unwrap().into_contents();
        let spki = SubjectPublicKeyInfoRef::from_der(&spki_der).unwrap();
        let pkcs1_der = spki.subject_public_key.raw_bytes().to_vec();

        let expected = VerificationKey::from_pem(RSA_PUBLIC_PEM).unwrap();
        assert_eq!(VerificationKey::from_pkcs1_der(&pkcs1_der).unwrap(), expected);

        let armored = pem::encode(&pem::Pem::new("RSA PUBLIC KEY", pkcs1_der));
        assert_eq!(VerificationKey::from_pem(&armored).unwrap(), expected);
    }

    #[test]
    fn rejects_garbage_pem() {
        assert_eq!(
            VerificationKey::from_pem("not a key"),
            Err(AuthErrorReason::InvalidVerificationKey)
        );
        assert_eq!(
            VerificationKey::from_spki_der(&[0x30, 0x05, 0x00]),
            Err(AuthErrorReason::InvalidVerificationKey)
        );
    }

    #[test]
    fn converts_rsa_jwk() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": "ins_1",
                "use": "sig",
                "alg": "RS256",
                "n": "AQAB",
                "e": "AQAB"
            }]
        }))
        .unwrap();
        let set = KeySet::from_jwks(&jwks);
        assert_eq!(set.len(), 1);
        assert!(matches!(set.find(Some("ins_1")).unwrap(), VerificationKey::Rsa { .. }));
        assert_eq!(set.find(Some("ins_2")), Err(AuthErrorReason::KeyNotFound));
        assert!(set.find(None).is_ok());
    }

    #[test]
    fn static_source_ignores_kid() {
        let source = KeySource::Static(VerificationKey::hmac(b"secret".to_vec()));
        let header = TokenHeader {
            alg: "HS256".to_string(),
            kid: Some("whatever".to_string()),
            typ: None,
        };
        assert!(source.resolve(&header).is_ok());
    }

    #[test]
    fn empty_key_set_has_no_keys() {
        let source = KeySource::KeySet(KeySet::new());
        let header = TokenHeader {
            alg: "RS256".to_string(),
            kid: None,
            typ: None,
        };
        assert_eq!(source.resolve(&header), Err(AuthErrorReason::KeyNotFound));
    }

    #[test]
    fn debug_redacts_hmac_secret() {
        let key = VerificationKey::hmac(b"super-secret".to_vec());
        assert!(!format!("{key:?}").contains("super"));
    }

    #[test]
    fn ec_coordinates_must_match_curve() {
        assert!(VerificationKey::ec_from_coordinates(EcCurve::P256, &[1; 32], &[2; 32]).is_ok());
        assert_eq!(
            VerificationKey::ec_from_coordinates(EcCurve::P384, &[1; 32], &[2; 32]),
            Err(AuthErrorReason::InvalidVerificationKey)
        );
    }
}
