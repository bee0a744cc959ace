//! Noise Protocol Framework crypto core: AEAD cipher state, symmetric
//! state, handshake state machine, and the session facade built on them.

pub mod aead;
pub mod handshake;
pub mod session;
pub mod symmetric;

pub use aead::{AeadError, CipherState, NonceMode, ReplayWindow};
pub use handshake::{HandshakeError, HandshakeState, Pattern, Role};
pub use session::{Session, SessionError};
pub use symmetric::{SymmetricError, SymmetricState};

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A long-term X25519 static keypair, used as the local static key in
/// Noise handshakes. Generated once per device and persisted via the
/// keystore; the private half never leaves this struct.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct NoiseKeypair {
    private: Zeroizing<[u8; 32]>,
    #[zeroize(skip)]
    pub public: [u8; 32],
}

impl NoiseKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    /// Private key bytes for persistent storage. Callers are responsible
    /// for writing these securely (see the keystore module).
    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.private)
    }
}
