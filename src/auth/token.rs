// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact token decoding.
//!
//! A token is three base64url segments joined by `.`: header, payload,
//! signature. The base64url alphabet is decoded here through a 6-bit lookup
//! table so the result is identical on every host, independent of which
//! base64 implementation a runtime happens to ship.
//!
//! Decoding does not verify anything. See [`super::signature`] and
//! [`super::claims`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::claims::SessionClaims;
use super::error::AuthErrorReason;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const INVALID: u8 = 0xFF;
static DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Decode unpadded base64url.
///
/// Rejects padding, characters outside the alphabet, impossible lengths and
/// non-zero trailing bits, so every byte string has exactly one encoding.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, AuthErrorReason> {
    let bytes = input.as_bytes();
    if bytes.len() % 4 == 1 {
        return Err(AuthErrorReason::MalformedToken);
    }

    let mut out = Vec::with_capacity(bytes.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        let value = DECODE_TABLE[byte as usize];
        if value == INVALID {
            return Err(AuthErrorReason::MalformedToken);
        }
        acc = (acc << 6) | u32::from(value);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
        acc &= (1 << bits) - 1;
    }

    if acc != 0 {
        return Err(AuthErrorReason::MalformedToken);
    }
    Ok(out)
}

/// Token header (JOSE header subset the core reads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A decoded, not yet verified token.
///
/// Fields are private: a parsed token cannot be edited, only re-parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwt<P> {
    header: TokenHeader,
    payload: P,
    signature: Vec<u8>,
    raw: String,
    payload_dot: usize,
    signature_dot: usize,
}

/// A decoded session token.
pub type SessionToken = Jwt<SessionClaims>;

impl<P> Jwt<P> {
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The bytes the signature covers: `header.payload` as received.
    pub fn signing_input(&self) -> &[u8] {
        self.raw[..self.signature_dot].as_bytes()
    }

    /// The three raw segments.
    pub fn segments(&self) -> (&str, &str, &str) {
        (
            &self.raw[..self.payload_dot],
            &self.raw[self.payload_dot + 1..self.signature_dot],
            &self.raw[self.signature_dot + 1..],
        )
    }

    /// Re-encode the token by joining its raw segments.
    pub fn encode(&self) -> String {
        let (header, payload, signature) = self.segments();
        format!("{header}.{payload}.{signature}")
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

/// Decode a session token.
pub fn decode(token: &str) -> Result<SessionToken, AuthErrorReason> {
    decode_jwt(token)
}

/// Decode a token whose payload has shape `P`.
pub fn decode_jwt<P: DeserializeOwned>(token: &str) -> Result<Jwt<P>, AuthErrorReason> {
    let payload_dot = token.find('.').ok_or(AuthErrorReason::MalformedToken)?;
    let signature_dot = token[payload_dot + 1..]
        .find('.')
        .map(|i| payload_dot + 1 + i)
        .ok_or(AuthErrorReason::MalformedToken)?;
    if token[signature_dot + 1..].contains('.') {
        return Err(AuthErrorReason::MalformedToken);
    }

    let header_bytes = decode_base64url(&token[..payload_dot])?;
    let payload_bytes = decode_base64url(&token[payload_dot + 1..signature_dot])?;
    let signature = decode_base64url(&token[signature_dot + 1..])?;

    let header: TokenHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthErrorReason::MalformedToken)?;
    let payload: P =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthErrorReason::MalformedToken)?;

    Ok(Jwt {
        header,
        payload,
        signature,
        raw: token.to_string(),
        payload_dot,
        signature_dot,
    })
}
