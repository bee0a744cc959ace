//! NIP-44 v2 authenticated encryption: ECDH on secp256k1 + HKDF-SHA256 +
//! XChaCha20-Poly1305, framed as `"v2:" || base64url_nopad(nonce || ct‖tag)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::{ecdh, Parity, PublicKey, SecretKey, XOnlyPublicKey};
use sha2::Sha256;
use thiserror::Error;

const PREFIX: &str = "v2:";
const NONCE_LEN: usize = 24;
const MIN_CT_TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip44Error {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("ciphertext is malformed, too short, or does not authenticate")]
    InvalidCiphertext,
}

fn shared_secret_x(their_xonly: &[u8; 32], parity: Parity, our_secret: &[u8; 32]) -> Result<[u8; 32], Nip44Error> {
    let xonly = XOnlyPublicKey::from_slice(their_xonly).map_err(|_| Nip44Error::InvalidPublicKey)?;
    let full = xonly.public_key(parity);
    let sk = SecretKey::from_slice(our_secret).map_err(|_| Nip44Error::InvalidSecretKey)?;
    let point = ecdh::shared_secret_point(&full, &sk);
    let mut x = [0u8; 32];
    x.copy_from_slice(&point[..32]);
    Ok(x)
}

fn derive_key(shared_x: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(&[]), shared_x);
    let mut key = [0u8; 32];
    hk.expand(b"nip44-v2", &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

/// Encrypt `plaintext` for `recipient_xonly` under `sender_secret`. Always
/// lifts the recipient's x-only key with the default (even) parity.
pub fn encrypt(
    plaintext: &str,
    recipient_xonly: &[u8; 32],
    sender_secret: &[u8; 32],
) -> Result<String, Nip44Error> {
    let shared_x = shared_secret_x(recipient_xonly, Parity::Even, sender_secret)?;
    let key = derive_key(&shared_x);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let ct = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext.as_bytes(),
                aad: &[],
            },
        )
        .map_err(|_| Nip44Error::InvalidCiphertext)?;

    let mut body = Vec::with_capacity(NONCE_LEN + ct.len());
    body.extend_from_slice(&nonce_bytes);
    body.extend_from_slice(&ct);
    Ok(format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(body)))
}

/// Decrypt `payload` from `sender_xonly` under `recipient_secret`. Tries
/// even parity first and, only on AEAD failure, odd parity — some peers
/// publish x-only keys without recording which parity they signed with.
/// Failure is never surfaced until both have been attempted.
pub fn decrypt(
    payload: &str,
    sender_xonly: &[u8; 32],
    recipient_secret: &[u8; 32],
) -> Result<String, Nip44Error> {
    let encoded = payload.strip_prefix(PREFIX).ok_or(Nip44Error::InvalidCiphertext)?;
    let body = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| Nip44Error::InvalidCiphertext)?;
    if body.len() < NONCE_LEN + MIN_CT_TAG_LEN {
        return Err(Nip44Error::InvalidCiphertext);
    }
    let nonce_bytes = &body[..NONCE_LEN];
    let ct_tag = &body[NONCE_LEN..];

    for parity in [Parity::Even, Parity::Odd] {
        let Ok(shared_x) = shared_secret_x(sender_xonly, parity, recipient_secret) else {
            continue;
        };
        let key = derive_key(&shared_x);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        if let Ok(pt) = cipher.decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload { msg: ct_tag, aad: &[] },
        ) {
            return String::from_utf8(pt).map_err(|_| Nip44Error::InvalidCiphertext);
        }
    }
    Err(Nip44Error::InvalidCiphertext)
}
