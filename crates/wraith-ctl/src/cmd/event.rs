//! Sign and verify raw Nostr events against the local identity key.

use anyhow::{Context, Result};
use std::path::Path;
use wraith_core::keystore::Keystore;
use wraith_core::nostr::event;

pub async fn cmd_event_sign(keystore_path: &Path, kind: u16, content: &str) -> Result<()> {
    let ks = Keystore::new(keystore_path);
    let identity = ks.nostr_identity(super::now()).await.context("loading nostr identity key")?;
    let signed = event::sign_event(&identity.secret, super::now(), kind, Vec::new(), content.to_string())
        .context("signing event")?;
    println!("{}", serde_json::to_string_pretty(&signed)?);
    Ok(())
}

pub fn cmd_event_verify(event_json: &str) -> Result<()> {
    let parsed: event::Event = serde_json::from_str(event_json).context("parsing event JSON")?;
    if event::verify_event(&parsed) {
        println!("valid");
        Ok(())
    } else {
        println!("invalid");
        std::process::exit(1);
    }
}
