//! Handshake state machine: drives the `e`/`s`/`ee`/`es`/`se`/`ss` token
//! patterns for Noise XX, IK, and NK, on top of [`super::symmetric`].
//!
//! Ephemeral key material is represented with `x25519_dalek::StaticSecret`
//! rather than `EphemeralSecret` — patterns like XX need to run the same
//! local ephemeral through two DH operations in one message (`ee` then
//! `es`), which `EphemeralSecret`'s consume-on-use API forbids. The keys
//! are still used once per handshake and dropped at the end of it.

use std::collections::VecDeque;

use subtle::ConstantTimeEq;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use super::aead::{CipherState, NonceMode};
use super::symmetric::SymmetricState;

/// The four Curve25519 points of small order that a conforming peer must
/// never present as an ephemeral or static public key.
const LOW_ORDER_POINTS: [[u8; 32]; 4] = [
    [0u8; 32],
    {
        let mut p = [0u8; 32];
        p[0] = 1;
        p
    },
    // the canonical order-8 point
    [
        0xe0, 0xeb, 0x7a, 0x7c, 0x3b, 0x41, 0xb8, 0xae, 0x16, 0x56, 0xe3, 0xfa, 0xf1, 0x9f, 0xc4,
        0x6a, 0xda, 0x09, 0x8d, 0xeb, 0x9c, 0x32, 0xb1, 0xfd, 0x86, 0x62, 0x05, 0x16, 0x5f, 0x49,
        0xb8, 0x00,
    ],
    [0xffu8; 32],
];

fn is_low_order(point: &[u8; 32]) -> bool {
    LOW_ORDER_POINTS
        .iter()
        .any(|p| bool::from(p.ct_eq(point)))
}

fn validate_public_key(point: &[u8; 32]) -> Result<(), HandshakeError> {
    if is_low_order(point) {
        Err(HandshakeError::InvalidPublicKey)
    } else {
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("handshake already complete")]
    HandshakeComplete,
    #[error("handshake not yet complete")]
    HandshakeNotComplete,
    #[error("required key material is missing for this pattern")]
    MissingKeys,
    #[error("this pattern requires a local static key that was not provided")]
    MissingLocalStaticKey,
    #[error("handshake message is malformed or truncated")]
    InvalidMessage,
    #[error("authentication of the handshake payload failed")]
    AuthenticationFailure,
    #[error("peer presented an invalid (low-order) public key")]
    InvalidPublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Xx,
    Ik,
    Nk,
}

impl Pattern {
    fn protocol_name(self) -> &'static [u8] {
        match self {
            Pattern::Xx => b"Noise_XX_25519_ChaChaPoly_SHA256",
            Pattern::Ik => b"Noise_IK_25519_ChaChaPoly_SHA256",
            Pattern::Nk => b"Noise_NK_25519_ChaChaPoly_SHA256",
        }
    }

    fn has_pre_message(self) -> bool {
        !matches!(self, Pattern::Xx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    E,
    S,
    Ee,
    Es,
    Se,
    Ss,
}
use Token::*;

struct MessageStep {
    is_write: bool,
    tokens: Vec<Token>,
}

fn message_steps(pattern: Pattern, role: Role) -> VecDeque<MessageStep> {
    let initiator_writes = |tokens: &[Token]| (true, tokens.to_vec());
    let initiator_reads = |tokens: &[Token]| (false, tokens.to_vec());

    let raw: Vec<(bool, Vec<Token>)> = match pattern {
        Pattern::Xx => vec![
            initiator_writes(&[E]),
            initiator_reads(&[E, Ee, S, Es]),
            initiator_writes(&[S, Se]),
        ],
        Pattern::Ik => vec![
            initiator_writes(&[E, Es, S, Ss]),
            initiator_reads(&[E, Ee, Se]),
        ],
        Pattern::Nk => vec![initiator_writes(&[E, Es]), initiator_reads(&[E, Ee])],
    };

    raw.into_iter()
        .map(|(initiator_write, tokens)| {
            let is_write = match role {
                Role::Initiator => initiator_write,
                Role::Responder => !initiator_write,
            };
            MessageStep { is_write, tokens }
        })
        .collect()
}

/// Drives one handshake to completion, then is consumed by
/// [`get_transport_keys`](Self::get_transport_keys).
pub struct HandshakeState {
    role: Role,
    symmetric: SymmetricState,
    local_static_priv: Option<StaticSecret>,
    local_static_pub: Option<[u8; 32]>,
    local_ephemeral_priv: Option<StaticSecret>,
    remote_static: Option<[u8; 32]>,
    remote_ephemeral: Option<[u8; 32]>,
    steps: VecDeque<MessageStep>,
    complete: bool,
}

impl HandshakeState {
    /// `local_static` is required by every pattern except an NK initiator.
    /// `remote_static` must be supplied in advance for IK and NK initiators.
    pub fn new(
        role: Role,
        pattern: Pattern,
        prologue: &[u8],
        local_static: Option<[u8; 32]>,
        remote_static: Option<[u8; 32]>,
    ) -> Result<Self, HandshakeError> {
        let needs_local_static = match (pattern, role) {
            (Pattern::Nk, Role::Initiator) => false,
            _ => true,
        };
        if needs_local_static && local_static.is_none() {
            return Err(HandshakeError::MissingLocalStaticKey);
        }
        let needs_remote_static_upfront = matches!(
            (pattern, role),
            (Pattern::Ik, Role::Initiator) | (Pattern::Nk, Role::Initiator)
        );
        if needs_remote_static_upfront && remote_static.is_none() {
            return Err(HandshakeError::MissingKeys);
        }

        let local_static_priv = local_static.map(StaticSecret::from);
        let local_static_pub = local_static_priv
            .as_ref()
            .map(|sk| *PublicKey::from(sk).as_bytes());

        let mut symmetric = SymmetricState::new(pattern.protocol_name(), NonceMode::ExtractedNonce);
        symmetric.mix_hash(prologue);

        if pattern.has_pre_message() {
            let responder_static_pub = match role {
                Role::Initiator => remote_static.ok_or(HandshakeError::MissingKeys)?,
                Role::Responder => local_static_pub.ok_or(HandshakeError::MissingLocalStaticKey)?,
            };
            symmetric.mix_hash(&responder_static_pub);
        }

        Ok(Self {
            role,
            symmetric,
            local_static_priv,
            local_static_pub,
            local_ephemeral_priv: None,
            remote_static,
            remote_ephemeral: None,
            steps: message_steps(pattern, role),
            complete: false,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn dh_ee(&self) -> Result<[u8; 32], HandshakeError> {
        let local = self.local_ephemeral_priv.as_ref().ok_or(HandshakeError::MissingKeys)?;
        let remote = self.remote_ephemeral.ok_or(HandshakeError::MissingKeys)?;
        Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
    }

    fn dh_ss(&self) -> Result<[u8; 32], HandshakeError> {
        let local = self.local_static_priv.as_ref().ok_or(HandshakeError::MissingLocalStaticKey)?;
        let remote = self.remote_static.ok_or(HandshakeError::MissingKeys)?;
        Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
    }

    /// `es` always means DH(initiator's ephemeral, responder's static).
    fn dh_es(&self) -> Result<[u8; 32], HandshakeError> {
        match self.role {
            Role::Initiator => {
                let local = self.local_ephemeral_priv.as_ref().ok_or(HandshakeError::MissingKeys)?;
                let remote = self.remote_static.ok_or(HandshakeError::MissingKeys)?;
                Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
            }
            Role::Responder => {
                let local = self.local_static_priv.as_ref().ok_or(HandshakeError::MissingLocalStaticKey)?;
                let remote = self.remote_ephemeral.ok_or(HandshakeError::MissingKeys)?;
                Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
            }
        }
    }

    /// `se` always means DH(initiator's static, responder's ephemeral).
    fn dh_se(&self) -> Result<[u8; 32], HandshakeError> {
        match self.role {
            Role::Initiator => {
                let local = self.local_static_priv.as_ref().ok_or(HandshakeError::MissingLocalStaticKey)?;
                let remote = self.remote_ephemeral.ok_or(HandshakeError::MissingKeys)?;
                Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
            }
            Role::Responder => {
                let local = self.local_ephemeral_priv.as_ref().ok_or(HandshakeError::MissingKeys)?;
                let remote = self.remote_static.ok_or(HandshakeError::MissingKeys)?;
                Ok(*local.diffie_hellman(&PublicKey::from(remote)).as_bytes())
            }
        }
    }

    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.complete {
            return Err(HandshakeError::HandshakeComplete);
        }
        let step = self.steps.pop_front().ok_or(HandshakeError::HandshakeComplete)?;
        if !step.is_write {
            self.steps.push_front(step);
            return Err(HandshakeError::HandshakeNotComplete);
        }

        let mut out = Vec::new();
        for token in step.tokens {
            match token {
                E => {
                    let sk = StaticSecret::random_from_rng(rand::thread_rng());
                    let pk = *PublicKey::from(&sk).as_bytes();
                    self.local_ephemeral_priv = Some(sk);
                    out.extend_from_slice(&pk);
                    self.symmetric.mix_hash(&pk);
                }
                S => {
                    let pub_bytes = self.local_static_pub.ok_or(HandshakeError::MissingLocalStaticKey)?;
                    let ct = self
                        .symmetric
                        .encrypt_and_hash(&pub_bytes)
                        .map_err(|_| HandshakeError::AuthenticationFailure)?;
                    out.extend_from_slice(&ct);
                }
                Ee => self.symmetric.mix_key(&self.dh_ee()?),
                Es => self.symmetric.mix_key(&self.dh_es()?),
                Se => self.symmetric.mix_key(&self.dh_se()?),
                Ss => self.symmetric.mix_key(&self.dh_ss()?),
            }
        }

        let ct = self
            .symmetric
            .encrypt_and_hash(payload)
            .map_err(|_| HandshakeError::AuthenticationFailure)?;
        out.extend_from_slice(&ct);

        if self.steps.is_empty() {
            self.complete = true;
        }
        Ok(out)
    }

    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.complete {
            return Err(HandshakeError::HandshakeComplete);
        }
        let step = self.steps.pop_front().ok_or(HandshakeError::HandshakeComplete)?;
        if step.is_write {
            self.steps.push_front(step);
            return Err(HandshakeError::HandshakeNotComplete);
        }

        let mut cursor = 0usize;
        for token in step.tokens {
            match token {
                E => {
                    if message.len() < cursor + 32 {
                        return Err(HandshakeError::InvalidMessage);
                    }
                    let bytes: [u8; 32] = message[cursor..cursor + 32].try_into().unwrap();
                    validate_public_key(&bytes)?;
                    cursor += 32;
                    self.symmetric.mix_hash(&bytes);
                    self.remote_ephemeral = Some(bytes);
                }
                S => {
                    let len = if self.symmetric.has_key() { 48 } else { 32 };
                    if message.len() < cursor + len {
                        return Err(HandshakeError::InvalidMessage);
                    }
                    let slice = &message[cursor..cursor + len];
                    cursor += len;
                    let pt = self
                        .symmetric
                        .decrypt_and_hash(slice)
                        .map_err(|_| HandshakeError::AuthenticationFailure)?;
                    let bytes: [u8; 32] = pt
                        .as_slice()
                        .try_into()
                        .map_err(|_| HandshakeError::InvalidMessage)?;
                    validate_public_key(&bytes)?;
                    self.remote_static = Some(bytes);
                }
                Ee => self.symmetric.mix_key(&self.dh_ee()?),
                Es => self.symmetric.mix_key(&self.dh_es()?),
                Se => self.symmetric.mix_key(&self.dh_se()?),
                Ss => self.symmetric.mix_key(&self.dh_ss()?),
            }
        }

        if message.len() < cursor {
            return Err(HandshakeError::InvalidMessage);
        }
        let payload = self
            .symmetric
            .decrypt_and_hash(&message[cursor..])
            .map_err(|_| HandshakeError::AuthenticationFailure)?;

        if self.steps.is_empty() {
            self.complete = true;
        }
        Ok(payload)
    }

    /// Snapshot the handshake hash and split into transport ciphers.
    /// By convention the initiator sends on `c1`/receives on `c2`; the
    /// responder sends on `c2`/receives on `c1`.
    pub fn get_transport_keys(
        self,
        use_extracted_nonce: bool,
    ) -> Result<([u8; 32], CipherState, CipherState), HandshakeError> {
        if !self.complete {
            return Err(HandshakeError::HandshakeNotComplete);
        }
        let hash = self.symmetric.hash();
        let mode = if use_extracted_nonce {
            NonceMode::ExtractedNonce
        } else {
            NonceMode::CounterSynchronous
        };
        let (c1, c2) = self.symmetric.split(mode);
        let (send, recv) = match self.role {
            Role::Initiator => (c1, c2),
            Role::Responder => (c2, c1),
        };
        Ok((hash, send, recv))
    }
}
