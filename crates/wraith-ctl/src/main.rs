//! wraith-ctl — command-line interface for the Noise/Nostr identity,
//! signing, and relay operations implemented by `wraith-core`.

use anyhow::{Context, Result};
use std::path::PathBuf;

mod cmd;

fn default_keystore_path() -> PathBuf {
    wraith_core::config::WraithConfig::load()
        .map(|c| c.identity.keystore_path)
        .unwrap_or_else(|_| PathBuf::from("keystore.json"))
}

fn print_usage() {
    println!("Usage: wraith-ctl [--keystore <path>] <command>");
    println!();
    println!("Identity");
    println!("  identity show                        Print noise/nostr pubkeys");
    println!("  identity export                        Export nostr identity as nsec");
    println!("  identity import <nsec>                  Import a nostr identity");
    println!("  identity wipe                           Delete the local keystore");
    println!();
    println!("Events");
    println!("  event sign <kind> <content>             Sign a kind/content pair");
    println!("  event verify <json>                     Verify a signed event");
    println!();
    println!("Private messaging");
    println!("  dm send <recipient_hex> <text>           Build a gift-wrapped DM");
    println!("  dm open <gift_wrap_json>                 Unwrap a gift-wrapped DM");
    println!("  nip44 encrypt <recipient_hex> <text>     NIP-44 v2 encrypt");
    println!("  nip44 decrypt <sender_hex> <payload>     NIP-44 v2 decrypt");
    println!("  nip04 encrypt <recipient_hex> <text>     NIP-04 legacy encrypt");
    println!("  nip04 decrypt <sender_hex> <payload>     NIP-04 legacy decrypt");
    println!();
    println!("Relays");
    println!("  relay publish <url> <event_json>         Publish a signed event");
    println!("  relay subscribe <url> [kinds...] --for <secs>   Print matching events");
    println!();
    println!(
        "Options:\n  --keystore <path>   Keystore file (default: {})",
        default_keystore_path().display()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    let mut keystore_override: Option<PathBuf> = None;
    let mut args: Vec<String> = Vec::new();
    let mut i = 0;
    while i < raw_args.len() {
        if raw_args[i] == "--keystore" {
            i += 1;
            let path = raw_args.get(i).context("--keystore requires a path")?;
            keystore_override = Some(PathBuf::from(path));
        } else {
            args.push(raw_args[i].clone());
        }
        i += 1;
    }
    let keystore_path = keystore_override.unwrap_or_else(default_keystore_path);

    let refs: Vec<&str> = args.iter().map(String::as_str).collect();

    match refs.as_slice() {
        ["identity", "show"] => cmd::identity::cmd_identity_show(&keystore_path).await,
        ["identity", "export"] => cmd::identity::cmd_identity_export(&keystore_path).await,
        ["identity", "import", nsec] => cmd::identity::cmd_identity_import(&keystore_path, nsec).await,
        ["identity", "wipe"] => cmd::identity::cmd_identity_wipe(&keystore_path).await,

        ["event", "sign", kind, content] => {
            let kind: u16 = kind.parse().context("kind must be a u16")?;
            cmd::event::cmd_event_sign(&keystore_path, kind, content).await
        }
        ["event", "verify", json] => cmd::event::cmd_event_verify(json),

        ["dm", "send", recipient, text] => cmd::dm::cmd_dm_send(&keystore_path, recipient, text).await,
        ["dm", "open", json] => cmd::dm::cmd_dm_open(&keystore_path, json).await,
        ["nip44", "encrypt", recipient, text] => {
            cmd::dm::cmd_nip44_encrypt(&keystore_path, recipient, text).await
        }
        ["nip44", "decrypt", sender, payload] => {
            cmd::dm::cmd_nip44_decrypt(&keystore_path, sender, payload).await
        }
        ["nip04", "encrypt", recipient, text] => {
            cmd::dm::cmd_nip04_encrypt(&keystore_path, recipient, text).await
        }
        ["nip04", "decrypt", sender, payload] => {
            cmd::dm::cmd_nip04_decrypt(&keystore_path, sender, payload).await
        }

        ["relay", "publish", url, json] => cmd::relay::cmd_relay_publish(url, json).await,
        ["relay", "subscribe", rest @ ..] => handle_relay_subscribe(rest).await,

        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn handle_relay_subscribe(rest: &[&str]) -> Result<()> {
    let url = rest.first().context("relay subscribe requires a url")?;
    let mut kinds = Vec::new();
    let mut window_secs: u64 = 10;
    let mut i = 1;
    while i < rest.len() {
        if rest[i] == "--for" {
            i += 1;
            window_secs = rest.get(i).context("--for requires a number of seconds")?.parse()?;
        } else {
            kinds.push(rest[i].parse().context("kinds must be integers")?);
        }
        i += 1;
    }
    cmd::relay::cmd_relay_subscribe(url, kinds, window_secs).await
}
