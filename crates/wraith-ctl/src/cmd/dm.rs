//! Private messaging: gift-wrapped direct messages (NIP-17/44/59) and
//! legacy NIP-04 encryption, built against the local identity key.

use anyhow::{Context, Result};
use std::path::Path;
use wraith_core::keystore::Keystore;
use wraith_core::nostr::{nip04, nip44, nip59};

fn parse_xonly(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).context("recipient pubkey must be hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("recipient pubkey must be exactly 32 bytes"))
}

pub async fn cmd_dm_send(keystore_path: &Path, recipient_hex: &str, content: &str) -> Result<()> {
    let recipient = parse_xonly(recipient_hex)?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;

    let wrap = nip59::create_private_message(content, &recipient, &identity.secret, super::now())
        .context("building gift-wrapped message")?;
    println!("{}", serde_json::to_string_pretty(&wrap)?);
    Ok(())
}

pub async fn cmd_dm_open(keystore_path: &Path, gift_wrap_json: &str) -> Result<()> {
    let gift_wrap: wraith_core::nostr::event::Event =
        serde_json::from_str(gift_wrap_json).context("parsing gift-wrap event JSON")?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;

    let decrypted = nip59::decrypt_private_message(&gift_wrap, &identity.secret)
        .context("opening gift-wrapped message")?;
    println!("from      : {}", decrypted.sender);
    println!("timestamp : {}", decrypted.timestamp);
    println!("content   : {}", decrypted.content);
    Ok(())
}

pub async fn cmd_nip44_encrypt(keystore_path: &Path, recipient_hex: &str, plaintext: &str) -> Result<()> {
    let recipient = parse_xonly(recipient_hex)?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;
    let payload = nip44::encrypt(plaintext, &recipient, &identity.secret).context("nip-44 encrypt")?;
    println!("{payload}");
    Ok(())
}

pub async fn cmd_nip44_decrypt(keystore_path: &Path, sender_hex: &str, payload: &str) -> Result<()> {
    let sender = parse_xonly(sender_hex)?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;
    let plaintext = nip44::decrypt(payload, &sender, &identity.secret).context("nip-44 decrypt")?;
    println!("{plaintext}");
    Ok(())
}

pub async fn cmd_nip04_encrypt(keystore_path: &Path, recipient_hex: &str, plaintext: &str) -> Result<()> {
    let recipient = parse_xonly(recipient_hex)?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;
    let payload = nip04::encrypt(plaintext, &recipient, &identity.secret).context("nip-04 encrypt")?;
    println!("{payload}");
    Ok(())
}

pub async fn cmd_nip04_decrypt(keystore_path: &Path, sender_hex: &str, payload: &str) -> Result<()> {
    let sender = parse_xonly(sender_hex)?;
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;
    let plaintext = nip04::decrypt(payload, &sender, &identity.secret).context("nip-04 decrypt")?;
    println!("{plaintext}");
    Ok(())
}
