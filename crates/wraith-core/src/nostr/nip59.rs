//! NIP-59 gift-wrap: the outermost onion layer. Hides the seal (and
//! therefore the sender) behind a second, independent ephemeral key.

use secp256k1::{Keypair, Secp256k1};
use thiserror::Error;

use super::event::{self, Event, EventError, KIND_GIFT_WRAP};
use super::nip17::{self, Rumor};
use super::nip44;
use super::randomized_timestamp;

#[derive(Debug, Error)]
pub enum GiftWrapError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("not a gift-wrap event")]
    NotAGiftWrap,
    #[error("failed to unwrap gift-wrap or seal")]
    UnwrapFailed,
}

/// The recovered plaintext of a private message, plus the attested sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub content: String,
    pub sender: String,
    pub timestamp: i64,
}

/// Wrap `seal` for `recipient_xonly`: a kind-1059 event, signed by a
/// second fresh ephemeral key, tagged `["p", recipient]`.
pub fn create_gift_wrap(
    seal: &Event,
    recipient_xonly: &[u8; 32],
    now: i64,
) -> Result<Event, GiftWrapError> {
    let secp = Secp256k1::new();
    let ephemeral = Keypair::new(&secp, &mut rand::thread_rng());
    let ephemeral_secret = ephemeral.secret_bytes();

    let seal_json = serde_json::to_string(seal).expect("Event serializes infallibly");
    let ciphertext = nip44::encrypt(&seal_json, recipient_xonly, &ephemeral_secret)
        .map_err(|_| GiftWrapError::UnwrapFailed)?;

    let recipient_hex = hex::encode(recipient_xonly);
    let event = event::sign_event(
        &ephemeral_secret,
        randomized_timestamp(now),
        KIND_GIFT_WRAP,
        vec![vec!["p".to_string(), recipient_hex]],
        ciphertext,
    )?;
    Ok(event)
}

/// Build and sign a complete onion: rumor -> seal -> gift-wrap.
pub fn create_private_message(
    content: &str,
    recipient_xonly: &[u8; 32],
    sender_identity_secret: &[u8; 32],
    now: i64,
) -> Result<Event, GiftWrapError> {
    let secp = Secp256k1::new();
    let sk = secp256k1::SecretKey::from_slice(sender_identity_secret)
        .map_err(|_| EventError::InvalidSecretKey)?;
    let sender_keypair = Keypair::from_secret_key(&secp, &sk);
    let (sender_xonly, _) = sender_keypair.x_only_public_key();

    let rumor = Rumor::new(&sender_xonly.serialize(), content.to_string(), now);
    let seal = nip17::create_seal(&rumor, recipient_xonly, now)?;
    create_gift_wrap(&seal, recipient_xonly, now)
}

/// Unwrap a kind-1059 event addressed to `recipient_secret`, recovering
/// the rumor's content, real sender, and real (non-randomized) timestamp.
pub fn decrypt_private_message(
    gift_wrap: &Event,
    recipient_secret: &[u8; 32],
) -> Result<DecryptedMessage, GiftWrapError> {
    if gift_wrap.kind != event::KIND_GIFT_WRAP {
        return Err(GiftWrapError::NotAGiftWrap);
    }
    let wrap_pubkey: [u8; 32] = hex::decode(&gift_wrap.pubkey)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(GiftWrapError::UnwrapFailed)?;
    let seal_json = nip44::decrypt(&gift_wrap.content, &wrap_pubkey, recipient_secret)
        .map_err(|_| GiftWrapError::UnwrapFailed)?;
    let seal: Event = serde_json::from_str(&seal_json).map_err(|_| GiftWrapError::UnwrapFailed)?;

    let rumor = nip17::open_seal(&seal, recipient_secret).ok_or(GiftWrapError::UnwrapFailed)?;

    Ok(DecryptedMessage {
        content: rumor.content,
        sender: rumor.pubkey,
        timestamp: rumor.created_at,
    })
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
    fn gift_wrap_round_trip() {
        let sender_secret = [1u8; 32];
        let sender_xonly = xonly_of(&sender_secret);
        let recipient_secret = [2u8; 32];
        let recipient_xonly = xonly_of(&recipient_secret);

        let now = 1_700_000_000;
        let wrap = create_private_message("ping", &recipient_xonly, &sender_secret, now).unwrap();
        assert_eq!(wrap.kind, event::KIND_GIFT_WRAP);

        let decrypted = decrypt_private_message(&wrap, &recipient_secret).unwrap();
        assert_eq!(decrypted.content, "ping");
        assert_eq!(decrypted.sender, hex::encode(sender_xonly));
        assert!((decrypted.timestamp - now).abs() < 60);
    }

    #[test]
    fn gift_wrap_outer_pubkey_independent_of_sender() {
        let sender_secret = [5u8; 32];
        let recipient_secret = [6u8; 32];
        let recipient_xonly = xonly_of(&recipient_secret);

        let wraps: Vec<_> = (0..20)
            .map(|_| create_private_message("same message", &recipient_xonly, &sender_secret, 1_700_000_000).unwrap())
            .collect();
        let distinct: std::collections::HashSet<_> = wraps.iter().map(|e| e.pubkey.clone()).collect();
        assert_eq!(distinct.len(), wraps.len(), "every wrap should use a fresh outer key");
    }

    #[test]
    fn non_gift_wrap_event_rejected() {
        let recipient_secret = [7u8; 32];
        let sk = [8u8; 32];
        let not_a_wrap = event::sign_event(&sk, 1_700_000_000, event::KIND_TEXT_NOTE, vec![], "hi".into()).unwrap();
        assert!(matches!(
            decrypt_private_message(&not_a_wrap, &recipient_secret),
            Err(GiftWrapError::NotAGiftWrap)
        ));
    }
}
