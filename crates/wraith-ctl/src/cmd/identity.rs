//! Identity management: keystore inspection, bech32 export/import, wipe.

use anyhow::{Context, Result};
use std::path::Path;
use wraith_core::bech32;
use wraith_core::keystore::Keystore;
use wraith_core::nostr::event;

pub async fn cmd_identity_show(keystore_path: &Path) -> Result<()> {
    let ks = Keystore::new(keystore_path);
    let now = super::now();

    let noise = ks.noise_static(now).await.context("loading noise static key")?;
    let noise_kp = wraith_core::NoiseKeypair::from_private(*noise.secret);

    let nostr = ks.nostr_identity(now).await.context("loading nostr identity key")?;
    let pubkey_hex = event::pubkey_hex(&nostr.secret).context("invalid nostr secret key")?;
    let pubkey_bytes: [u8; 32] = hex::decode(&pubkey_hex)?.try_into().expect("pubkey_hex always returns 32 bytes");

    println!("═══════════════════════════════════════");
    println!("  wraith identity");
    println!("═══════════════════════════════════════");
    println!("  noise static pubkey : {}", hex::encode(noise_kp.public));
    println!("  nostr pubkey (hex)  : {}", pubkey_hex);
    println!("  nostr npub          : {}", bech32::encode_npub(&pubkey_bytes)?);
    println!("  keystore            : {}", keystore_path.display());
    Ok(())
}

pub async fn cmd_identity_export(keystore_path: &Path) -> Result<()> {
    let ks = Keystore::new(keystore_path);
    let export = ks.export_nostr_identity(super::now()).await.context("exporting nostr identity")?;
    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

pub async fn cmd_identity_import(keystore_path: &Path, nsec: &str) -> Result<()> {
    let ks = Keystore::new(keystore_path);
    ks.import_nostr_identity(nsec, super::now()).await.context("importing nostr identity")?;
    println!("Imported nostr identity into {}", keystore_path.display());
    Ok(())
}

pub async fn cmd_identity_wipe(keystore_path: &Path) -> Result<()> {
    let ks = Keystore::new(keystore_path);
    ks.wipe().await.context("wiping keystore")?;
    println!("Wiped {}", keystore_path.display());
    Ok(())
}
