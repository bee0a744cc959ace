//! NIP-17: the rumor (unsigned kind-14 event) and the seal that wraps it
//! under an ephemeral key.

use secp256k1::{Keypair, Secp256k1};

use super::event::{self, Event, EventError, KIND_RUMOR, KIND_SEAL};
use super::nip44;
use super::randomized_timestamp;

/// An unsigned kind-14 event. Never sent on the wire by itself — only
/// ever nested inside a seal.
#[derive(Debug, Clone)]
pub struct Rumor {
    pub pubkey: String,
    pub created_at: i64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl Rumor {
    pub fn new(sender_pubkey_xonly: &[u8; 32], content: String, now: i64) -> Self {
        Self {
            pubkey: hex::encode(sender_pubkey_xonly),
            created_at: now,
            tags: Vec::new(),
            content,
        }
    }

    fn to_json(&self) -> String {
        serde_json::json!({
            "pubkey": self.pubkey,
            "created_at": self.created_at,
            "kind": KIND_RUMOR,
            "tags": self.tags,
            "content": self.content,
        })
        .to_string()
    }

    fn from_json(s: &str) -> Option<Self> {
        let v: serde_json::Value = serde_json::from_str(s).ok()?;
        Some(Self {
            pubkey: v.get("pubkey")?.as_str()?.to_string(),
            created_at: v.get("created_at")?.as_i64()?,
            tags: serde_json::from_value(v.get("tags")?.clone()).ok()?,
            content: v.get("content")?.as_str()?.to_string(),
        })
    }
}

/// Build a seal: a kind-13 event, signed by a fresh ephemeral key, whose
/// content is the rumor encrypted under NIP-44 to `recipient_xonly`.
pub fn create_seal(
    rumor: &Rumor,
    recipient_xonly: &[u8; 32],
    now: i64,
) -> Result<Event, EventError> {
    let secp = Secp256k1::new();
    let ephemeral = Keypair::new(&secp, &mut rand::thread_rng());
    let ephemeral_secret = ephemeral.secret_bytes();

    let plaintext = rumor.to_json();
    let ciphertext = nip44::encrypt(&plaintext, recipient_xonly, &ephemeral_secret)
        .map_err(|_| EventError::InvalidSecretKey)?;

    event::sign_event(
        &ephemeral_secret,
        randomized_timestamp(now),
        KIND_SEAL,
        Vec::new(),
        ciphertext,
    )
}

/// Open a seal and recover the rumor inside it. `recipient_secret` is the
/// real identity's secret key; the seal's own `pubkey` is the sender's
/// attested ephemeral identity for this message.
pub fn open_seal(seal: &Event, recipient_secret: &[u8; 32]) -> Option<Rumor> {
    if seal.kind != KIND_SEAL {
        return None;
    }
    let seal_pubkey: [u8; 32] = hex::decode(&seal.pubkey).ok()?.try_into().ok()?;
    let plaintext = nip44::decrypt(&seal.content, &seal_pubkey, recipient_secret).ok()?;
    Rumor::from_json(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xonly_of(secret: &[u8; 32]) -> [u8; 32] {
        let secp = Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(secret).unwrap();
        let kp = Keypair::from_secret_key(&secp, &sk);
        kp.x_only_public_key().0.serialize()
    }

    #[test]
    fn seal_roundtrip_recovers_rumor() {
        let sender_secret = [11u8; 32];
        let sender_xonly = xonly_of(&sender_secret);
        let recipient_secret = [22u8; 32];
        let recipient_xonly = xonly_of(&recipient_secret);

        let rumor = Rumor::new(&sender_xonly, "ping".to_string(), 1_700_000_000);
        let seal = create_seal(&rumor, &recipient_xonly, 1_700_000_000).unwrap();
        assert_eq!(seal.kind, KIND_SEAL);
        // Seal must not be signed by the sender's real identity key.
        assert_ne!(seal.pubkey, hex::encode(sender_xonly));

        let recovered = open_seal(&seal, &recipient_secret).unwrap();
        assert_eq!(recovered.content, "ping");
        assert_eq!(recovered.pubkey, hex::encode(sender_xonly));
    }

    #[test]
    fn seal_timestamp_is_randomized_away_from_rumor() {
        let sender_xonly = xonly_of(&[33u8; 32]);
        let recipient_xonly = xonly_of(&[44u8; 32]);
        let rumor = Rumor::new(&sender_xonly, "x".to_string(), 1_700_000_000);
        let seal = create_seal(&rumor, &recipient_xonly, 1_700_000_000).unwrap();
        assert!((seal.created_at - 1_700_000_000).abs() <= 900);
    }
}
