//! One-shot relay operations: publish a signed event, or subscribe and
//! print matching events for a bounded window.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wraith_core::nostr::event::Event;
use wraith_core::relay::{Filter, RelayMultiplexer};

pub async fn cmd_relay_publish(relay_url: &str, event_json: &str) -> Result<()> {
    let event: Event = serde_json::from_str(event_json).context("parsing event JSON")?;
    let mux = RelayMultiplexer::new();
    mux.add_relay(relay_url).await.context("invalid relay url")?;
    wait_until_connected(&mux).await?;

    mux.publish(&event).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("published {} to {relay_url}", event.id);
    Ok(())
}

pub async fn cmd_relay_subscribe(relay_url: &str, kinds: Vec<u16>, window_secs: u64) -> Result<()> {
    let mux = RelayMultiplexer::new();
    mux.add_relay(relay_url).await.context("invalid relay url")?;
    wait_until_connected(&mux).await?;

    let printed = Arc::new(Mutex::new(0usize));
    let printed_clone = printed.clone();
    let filter = Filter {
        kinds: if kinds.is_empty() { None } else { Some(kinds) },
        ..Default::default()
    };
    mux.subscribe(
        vec![filter],
        move |event: Event| {
            *printed_clone.lock().expect("lock poisoned") += 1;
            println!("{}", serde_json::to_string(&event).unwrap_or_default());
        },
        None::<fn()>,
    )
    .await;

    tokio::time::sleep(Duration::from_secs(window_secs)).await;
    eprintln!("received {} event(s) in {window_secs}s", *printed.lock().expect("lock poisoned"));
    Ok(())
}

async fn wait_until_connected(mux: &RelayMultiplexer) -> Result<()> {
    for _ in 0..50 {
        let infos = mux.relay_infos().await;
        if infos.iter().any(|i| i.status == wraith_core::relay::RelayStatus::Connected) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("timed out waiting for relay connection")
}
