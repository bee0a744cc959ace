//! NIP-04 legacy direct-message encryption: AES-256-CBC over an ECDH
//! shared x-coordinate, framed as `base64(ciphertext) || "?iv=" || base64(iv)`.
//!
//! Kept for interoperability with older clients. New code should prefer
//! [`super::nip44`]; this scheme has no message authentication of its own.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secp256k1::{ecdh, PublicKey, SecretKey, XOnlyPublicKey};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip04Error {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("content is missing the ciphertext or iv field")]
    MalformedContent,
    #[error("ciphertext does not decrypt under this key/iv")]
    InvalidCiphertext,
}

fn shared_secret_x(their_xonly: &[u8; 32], our_secret: &[u8; 32]) -> Result<[u8; 32], Nip04Error> {
    let xonly = XOnlyPublicKey::from_slice(their_xonly).map_err(|_| Nip04Error::InvalidPublicKey)?;
    let full: PublicKey = xonly.public_key(secp256k1::Parity::Even);
    let sk = SecretKey::from_slice(our_secret).map_err(|_| Nip04Error::InvalidSecretKey)?;
    let point = ecdh::shared_secret_point(&full, &sk);
    let mut x = [0u8; 32];
    x.copy_from_slice(&point[..32]);
    Ok(x)
}

/// `content = base64(AES-256-CBC(shared_x, iv, pt)) ‖ "?iv=" ‖ base64(iv)`.
pub fn encrypt(
    plaintext: &str,
    recipient_xonly: &[u8; 32],
    sender_secret: &[u8; 32],
) -> Result<String, Nip04Error> {
    let key = shared_secret_x(recipient_xonly, sender_secret)?;
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}?iv={}",
        STANDARD.encode(ct),
        STANDARD.encode(iv)
    ))
}

/// Accepts either field order (`ct?iv=...` as written above); both fields
/// are required.
pub fn decrypt(
    content: &str,
    sender_xonly: &[u8; 32],
    recipient_secret: &[u8; 32],
) -> Result<String, Nip04Error> {
    let (ct_b64, iv_b64) = split_fields(content)?;
    let key = shared_secret_x(sender_xonly, recipient_secret)?;

    let ct = STANDARD.decode(ct_b64).map_err(|_| Nip04Error::MalformedContent)?;
    let iv_bytes = STANDARD.decode(iv_b64).map_err(|_| Nip04Error::MalformedContent)?;
    if iv_bytes.len() != IV_LEN {
        return Err(Nip04Error::MalformedContent);
    }
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&iv_bytes);

    let mut buf = ct.clone();
    let pt = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| Nip04Error::InvalidCiphertext)?;
    String::from_utf8(pt.to_vec()).map_err(|_| Nip04Error::InvalidCiphertext)
}

/// `content` always carries `?iv=` but this accepts the ciphertext-then-iv
/// or iv-then-ciphertext ordering; both fields must be present.
fn split_fields(content: &str) -> Result<(&str, &str), Nip04Error> {
    let (a, b) = content.split_once("?iv=").ok_or(Nip04Error::MalformedContent)?;
    if a.is_empty() || b.is_empty() {
        return Err(Nip04Error::MalformedContent);
    }
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Keypair, Secp256k1};

    fn keypair() -> ([u8; 32], [u8; 32]) {
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let secret = kp.secret_bytes();
        let (xonly, _) = kp.x_only_public_key();
        (secret, xonly.serialize())
    }

    fn xonly_of(secret: &[u8; 32]) -> [u8; 32] {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(secret).unwrap();
        let kp = Keypair::from_secret_key(&secp, &sk);
        kp.x_only_public_key().0.serialize()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (sender_sk, _) = keypair();
        let (recipient_sk, recipient_pk) = keypair();
        let sender_xonly = xonly_of(&sender_sk);

        let content = encrypt("hello legacy", &recipient_pk, &sender_sk).unwrap();
        assert!(content.contains("?iv="));

        let pt = decrypt(&content, &sender_xonly, &recipient_sk).unwrap();
        assert_eq!(pt, "hello legacy");
    }

    #[test]
    fn missing_iv_field_rejected() {
        let (_, recipient_sk) = keypair();
        assert_eq!(
            decrypt("justbase64nofield", &[1u8; 32], &recipient_sk).unwrap_err(),
            Nip04Error::MalformedContent
        );
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let (sender_sk, _) = keypair();
        let (recipient_sk, recipient_pk) = keypair();
        let sender_xonly = xonly_of(&sender_sk);

        let content = encrypt("hi", &recipient_pk, &sender_sk).unwrap();
        let (ct_b64, iv_b64) = content.split_once("?iv=").unwrap();
        let mut ct = STANDARD.decode(ct_b64).unwrap();
        ct[0] ^= 0xff;
        let tampered = format!("{}?iv={}", STANDARD.encode(ct), iv_b64);

        assert!(decrypt(&tampered, &sender_xonly, &recipient_sk).is_err());
    }
}
