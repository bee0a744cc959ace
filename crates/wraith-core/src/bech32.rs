//! Bech32 (BIP-173) encode/decode for `nsec`/`npub`-style key material.
//!
//! Uses the original bech32 checksum (not bech32m) — `GEN` and the
//! `xor-constant = 1` final-XOR the spec calls for are exactly BIP-173's.

use ::bech32::{Bech32, Hrp};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Bech32Error {
    #[error("invalid human-readable part: {0}")]
    InvalidHrp(String),
    #[error("bech32 decode failed: {0}")]
    DecodeFailed(String),
    #[error("bech32 encode failed: {0}")]
    EncodeFailed(String),
}

/// Encode `data` under human-readable part `hrp` (e.g. `"nsec"`, `"npub"`).
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, Bech32Error> {
    let hrp = Hrp::parse(hrp).map_err(|e| Bech32Error::InvalidHrp(e.to_string()))?;
    ::bech32::encode::<Bech32>(hrp, data).map_err(|e| Bech32Error::EncodeFailed(e.to_string()))
}

/// Decode a bech32 string, returning its human-readable part and data.
pub fn decode(s: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let (hrp, data) = ::bech32::decode(s).map_err(|e| Bech32Error::DecodeFailed(e.to_string()))?;
    Ok((hrp.to_string(), data))
}

/// Encode a 32-byte secret scalar as `nsec1...`.
pub fn encode_nsec(secret: &[u8; 32]) -> Result<String, Bech32Error> {
    encode("nsec", secret)
}

/// Decode `nsec1...` back into its 32-byte secret scalar.
pub fn decode_nsec(nsec: &str) -> Result<[u8; 32], Bech32Error> {
    let (hrp, data) = decode(nsec)?;
    if hrp != "nsec" {
        return Err(Bech32Error::InvalidHrp(hrp));
    }
    data.try_into()
        .map_err(|_| Bech32Error::DecodeFailed("nsec payload was not 32 bytes".to_string()))
}

/// Encode a 32-byte x-only public key as `npub1...`.
pub fn encode_npub(pubkey: &[u8; 32]) -> Result<String, Bech32Error> {
    encode("npub", pubkey)
}

/// Decode `npub1...` back into its 32-byte x-only public key.
pub fn decode_npub(npub: &str) -> Result<[u8; 32], Bech32Error> {
    let (hrp, data) = decode(npub)?;
    if hrp != "npub" {
        return Err(Bech32Error::InvalidHrp(hrp));
    }
    data.try_into()
        .map_err(|_| Bech32Error::DecodeFailed("npub payload was not 32 bytes".to_string()))
}
