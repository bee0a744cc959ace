//! AEAD cipher state: ChaCha20-Poly1305 with a monotonic nonce counter and
//! a sliding-window replay guard.
//!
//! Two decrypt modes are supported. Counter-synchronous mode assumes both
//! ends agree on nonce order (used during the handshake proper); extracted-
//! nonce mode reads a nonce prefix carried on the wire and is the mode the
//! transport phase uses once a session is established.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Width of the replay window in bits (and in received nonces tracked).
const WINDOW_SIZE: u64 = 1024;
const WINDOW_WORDS: usize = (WINDOW_SIZE / 64) as usize;

/// Highest valid send counter. Noise limits nonces to 2^32-1 per the spec.
const MAX_COUNTER: u64 = u32::MAX as u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AeadError {
    #[error("cipher state has no key installed")]
    UninitializedCipher,
    #[error("ciphertext is malformed or too short")]
    InvalidCiphertext,
    #[error("nonce was replayed or is outside the receive window")]
    ReplayDetected,
    #[error("send counter would exceed 2^32-1; a new session is required")]
    NonceExceeded,
}

/// Sliding-window replay guard over `[highest_received - 1023, highest_received]`.
///
/// Mirrors the classic RFC 6479 bitmap approach, sized to the 1024-entry
/// window this protocol specifies rather than a generic default.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ReplayWindow {
    highest: u64,
    seen_any: bool,
    bitmap: [u64; WINDOW_WORDS],
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self {
            highest: 0,
            seen_any: false,
            bitmap: [0u64; WINDOW_WORDS],
        }
    }

    /// Returns true if `received` would be accepted by `mark`.
    fn check(&self, received: u64) -> bool {
        if !self.seen_any {
            return true;
        }
        if received > self.highest {
            return true;
        }
        if received <= self.highest.saturating_sub(WINDOW_SIZE) {
            return false;
        }
        let offset = self.highest - received;
        let (word, bit) = ((offset / 64) as usize, (offset % 64) as u32);
        self.bitmap[word] & (1u64 << bit) == 0
    }

    /// Check and, if acceptable, mark `received` as seen. Returns an error
    /// rather than panicking so callers never need a separate check+mark pair.
    fn check_and_mark(&mut self, received: u64) -> Result<(), AeadError> {
        if !self.check(received) {
            return Err(AeadError::ReplayDetected);
        }
        if !self.seen_any || received > self.highest {
            let shift = if self.seen_any {
                received - self.highest
            } else {
                0
            };
            self.shift_window(shift);
            self.highest = received;
            self.seen_any = true;
        }
        let offset = self.highest - received;
        let (word, bit) = ((offset / 64) as usize, (offset % 64) as u32);
        self.bitmap[word] |= 1u64 << bit;
        Ok(())
    }

    fn shift_window(&mut self, shift: u64) {
        if shift == 0 {
            return;
        }
        if shift >= WINDOW_SIZE {
            self.bitmap.fill(0);
            return;
        }
        let word_shift = (shift / 64) as usize;
        let bit_shift = (shift % 64) as u32;
        if word_shift > 0 {
            self.bitmap.rotate_right(word_shift);
            for w in &mut self.bitmap[..word_shift] {
                *w = 0;
            }
        }
        if bit_shift > 0 {
            let len = self.bitmap.len();
            for i in (1..len).rev() {
                self.bitmap[i] =
                    (self.bitmap[i] << bit_shift) | (self.bitmap[i - 1] >> (64 - bit_shift));
            }
            self.bitmap[0] <<= bit_shift;
        }
    }
}

/// Which nonce convention `decrypt` expects on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceMode {
    /// Nonce is implicit — the current counter is used, and advances on success.
    CounterSynchronous,
    /// Nonce is carried explicitly as a big-endian u32 prefix on the ciphertext.
    ExtractedNonce,
}

/// A single direction of an authenticated channel: one key, one send
/// counter, one receive window.
#[derive(ZeroizeOnDrop)]
pub struct CipherState {
    #[zeroize(skip)]
    cipher: Option<ChaCha20Poly1305>,
    key: Option<[u8; 32]>,
    send_counter: u64,
    replay: ReplayWindow,
    #[zeroize(skip)]
    mode: NonceMode,
}

impl CipherState {
    pub fn new(mode: NonceMode) -> Self {
        Self {
            cipher: None,
            key: None,
            send_counter: 0,
            replay: ReplayWindow::new(),
            mode,
        }
    }

    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Install a new key, resetting the send counter. The replay window is
    /// left untouched — a fresh `CipherState` already starts clear.
    pub fn initialize_key(&mut self, key: [u8; 32]) {
        self.cipher = Some(ChaCha20Poly1305::new(Key::from_slice(&key)));
        self.key = Some(key);
        self.send_counter = 0;
    }

    fn nonce_bytes(counter: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&counter.to_le_bytes());
        nonce
    }

    /// Encrypt `plaintext` under the next send nonce, returning ciphertext
    /// with the 16-byte Poly1305 tag appended. In `ExtractedNonce` mode the
    /// wire-visible 4-byte big-endian counter prefix is prepended as well.
    pub fn encrypt(&mut self, plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>, AeadError> {
        let cipher = self.cipher.as_ref().ok_or(AeadError::UninitializedCipher)?;
        if self.send_counter > MAX_COUNTER {
            return Err(AeadError::NonceExceeded);
        }
        let counter = self.send_counter;
        let nonce_bytes = Self::nonce_bytes(counter);
        let ct = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: ad,
                },
            )
            .map_err(|_| AeadError::InvalidCiphertext)?;
        self.send_counter += 1;

        match self.mode {
            NonceMode::CounterSynchronous => Ok(ct),
            NonceMode::ExtractedNonce => {
                let mut out = Vec::with_capacity(4 + ct.len());
                out.extend_from_slice(&(counter as u32).to_be_bytes());
                out.extend_from_slice(&ct);
                Ok(out)
            }
        }
    }

    /// Decrypt `ciphertext`. Counter-synchronous mode trusts the current
    /// counter and advances it; extracted-nonce mode reads the big-endian
    /// u32 prefix, reinterprets it into the little-endian nonce slot, and
    /// checks/marks the replay window instead of advancing a counter.
    pub fn decrypt(&mut self, ciphertext: &[u8], ad: &[u8]) -> Result<Vec<u8>, AeadError> {
        let cipher = self.cipher.as_ref().ok_or(AeadError::UninitializedCipher)?;

        match self.mode {
            NonceMode::CounterSynchronous => {
                if ciphertext.len() < 16 {
                    return Err(AeadError::InvalidCiphertext);
                }
                let nonce_bytes = Self::nonce_bytes(self.send_counter);
                let pt = cipher
                    .decrypt(
                        Nonce::from_slice(&nonce_bytes),
                        Payload {
                            msg: ciphertext,
                            aad: ad,
                        },
                    )
                    .map_err(|_| AeadError::InvalidCiphertext)?;
                self.send_counter += 1;
                Ok(pt)
            }
            NonceMode::ExtractedNonce => {
                if ciphertext.len() < 4 + 16 {
                    return Err(AeadError::InvalidCiphertext);
                }
                let counter = u32::from_be_bytes(ciphertext[..4].try_into().unwrap()) as u64;
                if !self.replay.check(counter) {
                    return Err(AeadError::ReplayDetected);
                }
                let nonce_bytes = Self::nonce_bytes(counter);
                let pt = cipher
                    .decrypt(
                        Nonce::from_slice(&nonce_bytes),
                        Payload {
                            msg: &ciphertext[4..],
                            aad: ad,
                        },
                    )
                    .map_err(|_| AeadError::InvalidCiphertext)?;
                self.replay.check_and_mark(counter)?;
                Ok(pt)
            }
        }
    }

    pub fn clear(&mut self) {
        self.cipher = None;
        if let Some(k) = self.key.as_mut() {
            k.zeroize();
        }
        self.key = None;
        self.send_counter = 0;
        self.replay = ReplayWindow::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(mode: NonceMode) -> CipherState {
        let mut cs = CipherState::new(mode);
        cs.initialize_key([7u8; 32]);
        cs
    }

    #[test]
    fn encrypt_decrypt_roundtrip_counter_synchronous() {
        let mut send = keyed(NonceMode::CounterSynchronous);
        let mut recv = keyed(NonceMode::CounterSynchronous);
        let ct = send.encrypt(b"hello", b"ad").unwrap();
        let pt = recv.decrypt(&ct, b"ad").unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn uninitialized_cipher_rejected() {
        let mut cs = CipherState::new(NonceMode::CounterSynchronous);
        assert_eq!(
            cs.encrypt(b"x", b"").unwrap_err(),
            AeadError::UninitializedCipher
        );
    }

    #[test]
    fn nonce_exceeded_after_max_counter() {
        let mut send = keyed(NonceMode::CounterSynchronous);
        send.send_counter = MAX_COUNTER;
        assert!(send.encrypt(b"last", b"").is_ok());
        assert_eq!(
            send.encrypt(b"overflow", b"").unwrap_err(),
            AeadError::NonceExceeded
        );
    }

    #[test]
    fn extracted_nonce_roundtrip_with_prefix() {
        let mut send = keyed(NonceMode::ExtractedNonce);
        let mut recv = keyed(NonceMode::ExtractedNonce);
        let ct = send.encrypt(b"transport", b"").unwrap();
        assert_eq!(&ct[..4], &0u32.to_be_bytes());
        let pt = recv.decrypt(&ct, b"").unwrap();
        assert_eq!(pt, b"transport");
    }

    #[test]
    fn replay_rejected_on_duplicate_delivery() {
        let mut send = keyed(NonceMode::ExtractedNonce);
        let mut recv = keyed(NonceMode::ExtractedNonce);

        let cts: Vec<_> = (0..5).map(|i| send.encrypt(format!("m{i}").as_bytes(), b"").unwrap()).collect();
        for ct in &cts {
            recv.decrypt(ct, b"").unwrap();
        }
        assert_eq!(
            recv.decrypt(&cts[2], b"").unwrap_err(),
            AeadError::ReplayDetected
        );
    }

    #[test]
    fn out_of_order_delivery_all_accepted() {
        let mut send = keyed(NonceMode::ExtractedNonce);
        let mut recv = keyed(NonceMode::ExtractedNonce);

        let cts: Vec<_> = (0..5).map(|i| send.encrypt(format!("m{i}").as_bytes(), b"").unwrap()).collect();
        for idx in [0usize, 2, 1, 4, 3] {
            let pt = recv.decrypt(&cts[idx], b"").unwrap();
            assert_eq!(pt, format!("m{idx}").as_bytes());
        }
    }

    #[test]
    fn nonce_older_than_window_rejected() {
        let mut send = keyed(NonceMode::ExtractedNonce);
        let mut recv = keyed(NonceMode::ExtractedNonce);

        let first = send.encrypt(b"early", b"").unwrap();
        for _ in 0..WINDOW_SIZE + 5 {
            let ct = send.encrypt(b"filler", b"").unwrap();
            recv.decrypt(&ct, b"").unwrap();
        }
        assert_eq!(
            recv.decrypt(&first, b"").unwrap_err(),
            AeadError::ReplayDetected
        );
    }

    #[test]
    fn clear_wipes_state() {
        let mut cs = keyed(NonceMode::CounterSynchronous);
        cs.clear();
        assert!(!cs.has_key());
        assert_eq!(
            cs.encrypt(b"x", b"").unwrap_err(),
            AeadError::UninitializedCipher
        );
    }
}
