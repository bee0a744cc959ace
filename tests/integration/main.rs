//! End-to-end scenarios that exercise more than one `wraith-core` module
//! together. Anything provable against a single module's public surface
//! lives in that module's own `#[cfg(test)]` block instead — this file is
//! for behavior that only shows up once pieces are wired together: two
//! independent identities talking to each other, a config driving a
//! keystore and relay multiplexer, and dedup across relays that don't
//! know about each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secp256k1::{Keypair, Secp256k1};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use wraith_core::config::WraithConfig;
use wraith_core::crypto::{HandshakeState, Pattern, Role};
use wraith_core::keystore::Keystore;
use wraith_core::nostr::event;
use wraith_core::nostr::nip59;
use wraith_core::relay::Filter;
use wraith_core::{NoiseKeypair, RelayMultiplexer, Session};

fn tmp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("wraith-integration-{label}-{}", std::process::id()))
}

fn xonly_pubkey(secret: &[u8; 32]) -> [u8; 32] {
    let secp = Secp256k1::new();
    let sk = secp256k1::SecretKey::from_slice(secret).unwrap();
    let keypair = Keypair::from_secret_key(&secp, &sk);
    keypair.x_only_public_key().0.serialize()
}

/// Two devices, each with their own on-disk keystore, run a full Noise XX
/// handshake using their persisted static keys and exchange transport
/// messages both ways, then reload the same keystore and run IK against
/// a peer who already knows their static key.
#[tokio::test]
async fn xx_handshake_and_transport_between_keystore_backed_identities() {
    let alice_path = tmp_path("alice-noise");
    let bob_path = tmp_path("bob-noise");
    let _ = tokio::fs::remove_file(&alice_path).await;
    let _ = tokio::fs::remove_file(&bob_path).await;

    let alice_ks = Keystore::new(&alice_path);
    let bob_ks = Keystore::new(&bob_path);
    let alice_key = alice_ks.noise_static(1_700_000_000).await.unwrap();
    let bob_key = bob_ks.noise_static(1_700_000_000).await.unwrap();

    let mut alice = Session::new(Role::Initiator, Pattern::Xx, b"", Some(*alice_key.secret), None).unwrap();
    let mut bob = Session::new(Role::Responder, Pattern::Xx, b"", Some(*bob_key.secret), None).unwrap();

    let m1 = alice.write_handshake_message(b"").unwrap();
    bob.read_handshake_message(&m1).unwrap();
    let m2 = bob.write_handshake_message(b"").unwrap();
    alice.read_handshake_message(&m2).unwrap();
    let m3 = alice.write_handshake_message(b"").unwrap();
    bob.read_handshake_message(&m3).unwrap();

    assert!(alice.is_established());
    assert!(bob.is_established());
    assert_eq!(alice.handshake_hash(), bob.handshake_hash());

    let ct = alice.encrypt(b"hello bob").unwrap();
    assert_eq!(bob.decrypt(&ct).unwrap(), b"hello bob");

    let ct = bob.encrypt(b"hello alice").unwrap();
    assert_eq!(alice.decrypt(&ct).unwrap(), b"hello alice");

    // Reloading the keystore must reproduce the same static key, so a
    // restarted device can run IK against a peer who already knows it.
    let alice_key_again = alice_ks.noise_static(1_700_000_000).await.unwrap();
    assert_eq!(*alice_key.secret, *alice_key_again.secret);

    let bob_pub = NoiseKeypair::from_private(*bob_key.secret).public;
    let mut ik_init = HandshakeState::new(
        Role::Initiator,
        Pattern::Ik,
        b"",
        Some(*alice_key_again.secret),
        Some(bob_pub),
    )
    .unwrap();
    let mut ik_resp = HandshakeState::new(Role::Responder, Pattern::Ik, b"", Some(*bob_key.secret), None).unwrap();
    let m1 = ik_init.write_message(b"").unwrap();
    ik_resp.read_message(&m1).unwrap();
    let m2 = ik_resp.write_message(b"").unwrap();
    ik_init.read_message(&m2).unwrap();
    assert!(ik_init.is_complete() && ik_resp.is_complete());

    let _ = tokio::fs::remove_file(&alice_path).await;
    let _ = tokio::fs::remove_file(&bob_path).await;
}

/// Two independent Nostr identities, each loaded from its own keystore,
/// exchange a private message through the full rumor -> seal -> gift-wrap
/// pipeline. Recovers sender and content without ever sharing a session
/// key out of band, and rejects a third party's attempt to open it.
#[tokio::test]
async fn private_message_round_trip_between_two_keystore_identities() {
    let sender_path = tmp_path("sender-nostr");
    let recipient_path = tmp_path("recipient-nostr");
    let _ = tokio::fs::remove_file(&sender_path).await;
    let _ = tokio::fs::remove_file(&recipient_path).await;

    let sender_ks = Keystore::new(&sender_path);
    let recipient_ks = Keystore::new(&recipient_path);
    let sender_key = sender_ks.nostr_identity(1_700_000_000).await.unwrap();
    let recipient_key = recipient_ks.nostr_identity(1_700_000_000).await.unwrap();

    let sender_xonly = xonly_pubkey(&sender_key.secret);
    let recipient_xonly = xonly_pubkey(&recipient_key.secret);

    let gift_wrap = nip59::create_private_message(
        "meet at the usual place",
        &recipient_xonly,
        &sender_key.secret,
        1_700_050_000,
    )
    .unwrap();

    assert!(event::verify_event(&gift_wrap));
    // The gift-wrap is signed by a fresh ephemeral key, never the sender's.
    assert_ne!(gift_wrap.pubkey, hex::encode(sender_xonly));

    let opened = nip59::decrypt_private_message(&gift_wrap, &recipient_key.secret).unwrap();
    assert_eq!(opened.content, "meet at the usual place");
    assert_eq!(opened.sender, hex::encode(sender_xonly));
    assert_eq!(opened.timestamp, 1_700_050_000);

    let mallory_secret = [0x42u8; 32];
    assert!(nip59::decrypt_private_message(&gift_wrap, &mallory_secret).is_err());

    let _ = tokio::fs::remove_file(&sender_path).await;
    let _ = tokio::fs::remove_file(&recipient_path).await;
}

/// Two fake relays, neither aware of the other, both deliver the same
/// event to the same subscriber. The multiplexer's dedup must collapse
/// them to a single callback invocation even though they arrive over two
/// entirely independent websocket connections.
#[tokio::test]
async fn duplicate_event_across_two_independent_fake_relays_delivered_once() {
    let event = event::sign_event(&[7u8; 32], 1_700_000_000, 1, vec![], "gm".to_string()).unwrap();

    async fn spawn_fake_relay(event: wraith_core::nostr::event::Event) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                // Wait for the REQ before pushing the event, then deliver it
                // followed by EOSE, matching a real relay's subscribe flow.
                if let Some(Ok(WsMessage::Text(_))) = ws.next().await {
                    let sub_id = "11111111";
                    let frame = serde_json::json!(["EVENT", sub_id, event]).to_string();
                    let _ = ws.send(WsMessage::Text(frame.into())).await;
                    let eose = serde_json::json!(["EOSE", sub_id]).to_string();
                    let _ = ws.send(WsMessage::Text(eose.into())).await;
                }
                // Keep the connection open so the client doesn't reconnect
                // mid-test and skew the count.
                while ws.next().await.is_some() {}
            }
        });
        addr
    }

    let addr_a = spawn_fake_relay(event.clone()).await;
    let addr_b = spawn_fake_relay(event.clone()).await;

    let mux = RelayMultiplexer::new();
    mux.add_relay(format!("ws://{addr_a}")).await.unwrap();
    mux.add_relay(format!("ws://{addr_b}")).await.unwrap();

    for _ in 0..100 {
        let infos = mux.relay_infos().await;
        if infos.iter().filter(|i| i.status == wraith_core::relay::RelayStatus::Connected).count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    mux.subscribe(
        vec![Filter { kinds: Some(vec![1]), ..Default::default() }],
        move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        },
        None::<fn()>,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1, "same event from two relays must be delivered exactly once");
}

/// A config loaded from env overrides wires straight into a keystore path
/// and a set of relay URLs without any further translation.
#[tokio::test]
async fn config_drives_keystore_path_and_relay_urls() {
    let keystore_path = tmp_path("config-driven-keystore");
    let _ = tokio::fs::remove_file(&keystore_path).await;

    unsafe { std::env::set_var("WRAITH_IDENTITY__KEYSTORE_PATH", keystore_path.to_str().unwrap()) };
    unsafe { std::env::set_var("WRAITH_RELAY__URLS", "wss://relay.one.example,wss://relay.two.example") };
    unsafe { std::env::set_var("WRAITH_RELAY__DEDUP_CAPACITY", "42") };

    let config = WraithConfig::load().unwrap();

    unsafe { std::env::remove_var("WRAITH_IDENTITY__KEYSTORE_PATH") };
    unsafe { std::env::remove_var("WRAITH_RELAY__URLS") };
    unsafe { std::env::remove_var("WRAITH_RELAY__DEDUP_CAPACITY") };

    assert_eq!(config.identity.keystore_path, keystore_path);
    assert_eq!(
        config.relay.urls,
        vec!["wss://relay.one.example".to_string(), "wss://relay.two.example".to_string()]
    );
    assert_eq!(config.relay.dedup_capacity, 42);

    let ks = Keystore::new(&config.identity.keystore_path);
    let key = ks.noise_static(1_700_000_000).await.unwrap();
    assert_eq!(key.secret.len(), 32);

    let mux = RelayMultiplexer::with_dedup_capacity(config.relay.dedup_capacity);
    for url in &config.relay.urls {
        // These are unreachable hosts — add_relay only validates the
        // scheme and schedules a connect task, it never blocks here.
        mux.add_relay(url.clone()).await.unwrap();
    }
    assert_eq!(mux.relay_infos().await.len(), 2);

    let _ = tokio::fs::remove_file(&keystore_path).await;
}
