//! Symmetric state: the key-mixing half of the Noise machinery, built on
//! top of the cipher state in [`super::aead`] and HKDF-SHA256.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::aead::{AeadError, CipherState, NonceMode};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymmetricError {
    #[error(transparent)]
    Aead(#[from] AeadError),
}

/// `(chaining_key, hash, cipher_state)` — constructed once per handshake and
/// consumed by `split` at the end of it.
#[derive(ZeroizeOnDrop)]
pub struct SymmetricState {
    chaining_key: [u8; 32],
    hash: [u8; 32],
    #[zeroize(skip)]
    cipher: CipherState,
}

impl SymmetricState {
    /// Derive the initial hash from a Noise protocol name, per spec: names
    /// of 32 bytes or fewer are zero-padded; longer names are hashed.
    pub fn new(protocol_name: &[u8], nonce_mode: NonceMode) -> Self {
        let hash = if protocol_name.len() <= 32 {
            let mut h = [0u8; 32];
            h[..protocol_name.len()].copy_from_slice(protocol_name);
            h
        } else {
            let mut hasher = Sha256::new();
            hasher.update(protocol_name);
            hasher.finalize().into()
        };
        Self {
            chaining_key: hash,
            hash,
            cipher: CipherState::new(nonce_mode),
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    pub fn has_key(&self) -> bool {
        self.cipher.has_key()
    }

    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.hash);
        hasher.update(data);
        self.hash = hasher.finalize().into();
    }

    pub fn mix_key(&mut self, ikm: &[u8]) {
        let [ck, temp_k] = hkdf2(&self.chaining_key, ikm);
        self.chaining_key = ck;
        self.cipher.initialize_key(temp_k);
    }

    pub fn mix_key_and_hash(&mut self, ikm: &[u8]) {
        let [ck, temp_h, temp_k] = hkdf3(&self.chaining_key, ikm);
        self.chaining_key = ck;
        self.mix_hash(&temp_h);
        self.cipher.initialize_key(temp_k);
    }

    /// Encrypt `plaintext` (if a key is set) or pass it through, mixing the
    /// result (ciphertext, or plaintext when unkeyed) into the hash.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        if self.cipher.has_key() {
            let ct = self.cipher.encrypt(plaintext, &self.hash)?;
            self.mix_hash(&ct);
            Ok(ct)
        } else {
            self.mix_hash(plaintext);
            Ok(plaintext.to_vec())
        }
    }

    /// Decrypt `data` (if a key is set) or pass it through, mixing the
    /// ciphertext — not the recovered plaintext — into the hash.
    pub fn decrypt_and_hash(&mut self, data: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        if self.cipher.has_key() {
            let pt = self.cipher.decrypt(data, &self.hash)?;
            self.mix_hash(data);
            Ok(pt)
        } else {
            self.mix_hash(data);
            Ok(data.to_vec())
        }
    }

    /// Derive the two transport cipher states and zeroize self.
    pub fn split(mut self, nonce_mode: NonceMode) -> (CipherState, CipherState) {
        let [k1, k2] = hkdf2(&self.chaining_key, &[]);
        let mut c1 = CipherState::new(nonce_mode);
        c1.initialize_key(k1);
        let mut c2 = CipherState::new(nonce_mode);
        c2.initialize_key(k2);
        self.chaining_key.zeroize();
        self.hash.zeroize();
        (c1, c2)
    }
}

/// RFC 5869 HKDF instantiated with HMAC-SHA256, producing exactly two
/// 32-byte outputs as the Noise spec's `HKDF(ck, ikm, 2)` calls for.
fn hkdf2(chaining_key: &[u8; 32], ikm: &[u8]) -> [[u8; 32]; 2] {
    let outs = hkdf_n(chaining_key, ikm, 2);
    [outs[0], outs[1]]
}

fn hkdf3(chaining_key: &[u8; 32], ikm: &[u8]) -> [[u8; 32]; 3] {
    let outs = hkdf_n(chaining_key, ikm, 3);
    [outs[0], outs[1], outs[2]]
}

fn hkdf_n(chaining_key: &[u8; 32], ikm: &[u8], n: usize) -> Vec<[u8; 32]> {
    let mut temp_key = HmacSha256::new_from_slice(chaining_key).expect("hmac accepts any key length");
    temp_key.update(ikm);
    let temp_key: [u8; 32] = temp_key.finalize().into_bytes().into();

    let mut outs = Vec::with_capacity(n);
    let mut prev: Vec<u8> = Vec::new();
    for i in 1..=n {
        let mut mac = HmacSha256::new_from_slice(&temp_key).expect("hmac accepts any key length");
        mac.update(&prev);
        mac.update(&[i as u8]);
        let out: [u8; 32] = mac.finalize().into_bytes().into();
        prev = out.to_vec();
        outs.push(out);
    }
    outs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_protocol_name_zero_padded() {
        let st = SymmetricState::new(b"Noise_XX_25519_ChaChaPoly_SHA256", NonceMode::CounterSynchronous);
        let mut expected = [0u8; 32];
        expected[..b"Noise_XX_25519_ChaChaPoly_SHA256".len()]
            .copy_from_slice(b"Noise_XX_25519_ChaChaPoly_SHA256");
        assert_eq!(st.hash(), expected);
    }

    #[test]
    fn long_protocol_name_is_hashed() {
        let name = b"Noise_XX_25519_ChaChaPoly_SHA256_with_a_very_long_suffix_indeed";
        let st = SymmetricState::new(name, NonceMode::CounterSynchronous);
        let mut hasher = Sha256::new();
        hasher.update(name);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(st.hash(), expected);
    }

    #[test]
    fn mix_hash_changes_hash_deterministically() {
        let mut a = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        let mut b = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        a.mix_hash(b"data");
        b.mix_hash(b"data");
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), SymmetricState::new(b"proto", NonceMode::CounterSynchronous).hash());
    }

    #[test]
    fn encrypt_and_hash_without_key_is_identity() {
        let mut st = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        let out = st.encrypt_and_hash(b"payload").unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn encrypt_decrypt_and_hash_roundtrip_with_key() {
        let mut send = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        let mut recv = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        send.mix_key(b"shared secret material");
        recv.mix_key(b"shared secret material");

        let ct = send.encrypt_and_hash(b"payload").unwrap();
        let pt = recv.decrypt_and_hash(&ct).unwrap();
        assert_eq!(pt, b"payload");
        assert_eq!(send.hash(), recv.hash());
    }

    #[test]
    fn split_produces_independent_usable_ciphers() {
        let mut send = SymmetricState::new(b"proto", NonceMode::CounterSynchronous);
        send.mix_key(b"ikm");
        let (mut c1, mut c2) = send.split(NonceMode::CounterSynchronous);
        let ct = c1.encrypt(b"via c1", b"").unwrap();
        assert!(c2.decrypt(&ct, b"").is_err());
    }
}
