//! Session facade: wraps the handshake state machine while a session is
//! being set up, then the two transport cipher states once it's running.

use thiserror::Error;

use super::aead::AeadError;
use super::handshake::{HandshakeError, HandshakeState, Pattern, Role};
use super::CipherState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Aead(#[from] AeadError),
    #[error("session is not established")]
    NotEstablished,
    #[error("session is closed")]
    Closed,
}

enum Inner {
    Handshaking(HandshakeState),
    Established {
        handshake_hash: [u8; 32],
        send: CipherState,
        recv: CipherState,
    },
    Closed,
}

/// Single state-machine wrapper around a handshake followed by a transport
/// channel: `handshaking -> established -> closed`.
pub struct Session {
    role: Role,
    inner: Inner,
}

impl Session {
    pub fn new(
        role: Role,
        pattern: Pattern,
        prologue: &[u8],
        local_static: Option<[u8; 32]>,
        remote_static: Option<[u8; 32]>,
    ) -> Result<Self, SessionError> {
        let handshake = HandshakeState::new(role, pattern, prologue, local_static, remote_static)?;
        Ok(Self {
            role,
            inner: Inner::Handshaking(handshake),
        })
    }

    pub fn is_established(&self) -> bool {
        matches!(self.inner, Inner::Established { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.inner, Inner::Closed)
    }

    pub fn write_handshake_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, SessionError> {
        let Inner::Handshaking(hs) = &mut self.inner else {
            return Err(SessionError::NotEstablished);
        };
        let out = hs.write_message(payload)?;
        if hs.is_complete() {
            self.finalize()?;
        }
        Ok(out)
    }

    pub fn read_handshake_message(&mut self, message: &[u8]) -> Result<Vec<u8>, SessionError> {
        let Inner::Handshaking(hs) = &mut self.inner else {
            return Err(SessionError::NotEstablished);
        };
        let payload = hs.read_message(message)?;
        if hs.is_complete() {
            self.finalize()?;
        }
        Ok(payload)
    }

    fn finalize(&mut self) -> Result<(), SessionError> {
        let prior = std::mem::replace(&mut self.inner, Inner::Closed);
        let Inner::Handshaking(hs) = prior else {
            unreachable!("finalize only called from the handshaking state");
        };
        let (handshake_hash, send, recv) = hs.get_transport_keys(true)?;
        self.inner = Inner::Established {
            handshake_hash,
            send,
            recv,
        };
        Ok(())
    }

    pub fn handshake_hash(&self) -> Option<[u8; 32]> {
        match &self.inner {
            Inner::Established { handshake_hash, .. } => Some(*handshake_hash),
            _ => None,
        }
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        match &mut self.inner {
            Inner::Established { send, .. } => Ok(send.encrypt(plaintext, &[])?),
            Inner::Handshaking(_) => Err(SessionError::NotEstablished),
            Inner::Closed => Err(SessionError::Closed),
        }
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        match &mut self.inner {
            Inner::Established { recv, .. } => Ok(recv.decrypt(ciphertext, &[])?),
            Inner::Handshaking(_) => Err(SessionError::NotEstablished),
            Inner::Closed => Err(SessionError::Closed),
        }
    }

    /// Zeroize all transport key material and transition to `closed`.
    /// Idempotent.
    pub fn close(&mut self) {
        if let Inner::Established { send, recv, .. } = &mut self.inner {
            send.clear();
            recv.clear();
        }
        self.inner = Inner::Closed;
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_static() -> [u8; 32] {
        let mut b = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut b);
        b
    }

    #[test]
    fn full_xx_session_lifecycle() {
        let a_static = random_static();
        let b_static = random_static();

        let mut a = Session::new(Role::Initiator, Pattern::Xx, b"", Some(a_static), None).unwrap();
        let mut b = Session::new(Role::Responder, Pattern::Xx, b"", Some(b_static), None).unwrap();

        let m1 = a.write_handshake_message(b"").unwrap();
        b.read_handshake_message(&m1).unwrap();
        let m2 = b.write_handshake_message(b"").unwrap();
        a.read_handshake_message(&m2).unwrap();
        let m3 = a.write_handshake_message(b"").unwrap();
        b.read_handshake_message(&m3).unwrap();

        assert!(a.is_established());
        assert!(b.is_established());
        assert_eq!(a.handshake_hash(), b.handshake_hash());

        let ct = a.encrypt(b"hello").unwrap();
        let pt = b.decrypt(&ct).unwrap();
        assert_eq!(pt, b"hello");

        a.close();
        assert!(a.is_closed());
        assert!(a.encrypt(b"anything").is_err());
    }

    #[test]
    fn encrypt_before_established_fails() {
        let a_static = random_static();
        let mut a = Session::new(Role::Initiator, Pattern::Xx, b"", Some(a_static), None).unwrap();
        assert!(a.encrypt(b"too early").is_err());
    }
}
