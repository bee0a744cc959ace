//! Relay multiplexer: N websocket-style relay connections with
//! exponential-backoff reconnect, subscription fan-out, deduplication,
//! and event publish.
//!
//! A relay going offline never blocks another relay — each connection is
//! driven by its own task, and publish/subscribe simply skip relays that
//! aren't currently connected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::dedup::DedupSet;
use crate::nostr::event::Event;

const MIN_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay url {0:?} is not a valid ws:// or wss:// address: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("relay url {0:?} has scheme {1:?}, expected ws or wss")]
    UnsupportedScheme(String, String),
}

fn validate_relay_url(raw: &str) -> Result<(), RelayError> {
    let parsed = url::Url::parse(raw).map_err(|e| RelayError::InvalidUrl(raw.to_string(), e))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(RelayError::UnsupportedScheme(raw.to_string(), other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone)]
pub struct RelayInfo {
    pub url: String,
    pub status: RelayStatus,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
}

/// Subscription filter. Every field is optional; an absent field imposes
/// no constraint. Serializes to the positional NIP-01 filter object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub e: Option<Vec<String>>,
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub p: Option<Vec<String>>,
    #[serde(rename = "#g", skip_serializing_if = "Option::is_none")]
    pub g: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    /// Client-side re-implementation of the same matching semantics a
    /// relay applies server-side. Pure and local — never sent anywhere,
    /// and never consulted by the connection loop itself.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| a == &event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(values) = &self.e {
            if !tag_matches(event, "e", values) {
                return false;
            }
        }
        if let Some(values) = &self.p {
            if !tag_matches(event, "p", values) {
                return false;
            }
        }
        if let Some(values) = &self.g {
            if !tag_matches(event, "g", values) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

fn tag_matches(event: &Event, tag_name: &str, values: &[String]) -> bool {
    event
        .tags
        .iter()
        .any(|tag| tag.first().map(String::as_str) == Some(tag_name) && tag.get(1).is_some_and(|v| values.contains(v)))
}

type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;
type EoseCallback = Arc<dyn Fn() + Send + Sync>;

struct SubscriptionEntry {
    filters: Vec<Filter>,
    on_event: EventCallback,
    on_eose: Option<EoseCallback>,
}

struct RelayState {
    info: RelayInfo,
    outbox: Option<mpsc::UnboundedSender<String>>,
    generation: u64,
}

/// Owns every relay connection and every active subscription. Cheaply
/// cloneable — the shared state lives behind `Arc`s, matching the
/// process-wide lifecycle-managed component the design calls for in
/// place of a module-level singleton.
#[derive(Clone)]
pub struct RelayMultiplexer {
    relays: Arc<RwLock<HashMap<String, RelayState>>>,
    subscriptions: Arc<RwLock<HashMap<String, SubscriptionEntry>>>,
    dedup: Arc<Mutex<DedupSet>>,
    next_generation: Arc<std::sync::atomic::AtomicU64>,
}

impl RelayMultiplexer {
    pub fn new() -> Self {
        Self::with_dedup_capacity(10_000)
    }

    pub fn with_dedup_capacity(dedup_capacity: usize) -> Self {
        Self {
            relays: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            dedup: Arc::new(Mutex::new(DedupSet::with_capacity(dedup_capacity))),
            next_generation: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub async fn relay_infos(&self) -> Vec<RelayInfo> {
        self.relays.read().await.values().map(|s| s.info.clone()).collect()
    }

    /// Add a relay and immediately begin connecting it. Rejects anything
    /// that isn't a `ws://` or `wss://` URL.
    pub async fn add_relay(&self, url: impl Into<String>) -> Result<(), RelayError> {
        let url = url.into();
        validate_relay_url(&url)?;
        let generation = self.next_generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        {
            let mut relays = self.relays.write().await;
            relays.insert(
                url.clone(),
                RelayState {
                    info: RelayInfo {
                        url: url.clone(),
                        status: RelayStatus::Connecting,
                        last_error: None,
                        reconnect_attempts: 0,
                    },
                    outbox: None,
                    generation,
                },
            );
        }
        self.spawn_relay_task(url, generation);
        Ok(())
    }

    /// Remove a relay, cancelling any pending reconnect timer.
    pub async fn remove_relay(&self, url: &str) {
        self.relays.write().await.remove(url);
    }

    /// (Re)connect every configured relay in parallel.
    pub async fn connect(&self) {
        let urls: Vec<String> = self.relays.read().await.keys().cloned().collect();
        for url in urls {
            let generation = self.next_generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            {
                let mut relays = self.relays.write().await;
                if let Some(state) = relays.get_mut(&url) {
                    state.generation = generation;
                    state.info.reconnect_attempts = 0;
                    state.outbox = None;
                }
            }
            self.spawn_relay_task(url, generation);
        }
    }

    fn spawn_relay_task(&self, url: String, generation: u64) {
        let relays = self.relays.clone();
        let subscriptions = self.subscriptions.clone();
        let dedup = self.dedup.clone();
        tokio::spawn(async move {
            run_relay(url, generation, relays, subscriptions, dedup).await;
        });
    }

    /// Assign an 8-hex-character subscription id, register the callbacks,
    /// and send `REQ` to every connected relay.
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        on_event: impl Fn(Event) + Send + Sync + 'static,
        on_eose: Option<impl Fn() + Send + Sync + 'static>,
    ) -> String {
        let sub_id = random_sub_id();
        {
            let mut subs = self.subscriptions.write().await;
            subs.insert(
                sub_id.clone(),
                SubscriptionEntry {
                    filters: filters.clone(),
                    on_event: Arc::new(on_event),
                    on_eose: on_eose.map(|f| Arc::new(f) as EoseCallback),
                },
            );
        }
        let req = req_message(&sub_id, &filters);
        self.broadcast(&req).await;
        sub_id
    }

    /// Remove a subscription and send `CLOSE` to every connected relay.
    pub async fn unsubscribe(&self, sub_id: &str) {
        self.subscriptions.write().await.remove(sub_id);
        let close = serde_json::json!(["CLOSE", sub_id]).to_string();
        self.broadcast(&close).await;
    }

    /// Publish an event to every connected relay. Returns once dispatched
    /// — not once acknowledged.
    pub async fn publish(&self, event: &Event) {
        let msg = serde_json::json!(["EVENT", event]).to_string();
        self.broadcast(&msg).await;
    }

    async fn broadcast(&self, text: &str) {
        let relays = self.relays.read().await;
        for state in relays.values() {
            if state.info.status == RelayStatus::Connected {
                if let Some(tx) = &state.outbox {
                    let _ = tx.send(text.to_string());
                }
            }
        }
    }
}

impl Default for RelayMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

fn random_sub_id() -> String {
    let bytes: [u8; 4] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn req_message(sub_id: &str, filters: &[Filter]) -> String {
    let mut arr = vec![Value::String("REQ".to_string()), Value::String(sub_id.to_string())];
    for f in filters {
        arr.push(serde_json::to_value(f).expect("Filter serializes infallibly"));
    }
    Value::Array(arr).to_string()
}

async fn run_relay(
    url: String,
    generation: u64,
    relays: Arc<RwLock<HashMap<String, RelayState>>>,
    subscriptions: Arc<RwLock<HashMap<String, SubscriptionEntry>>>,
    dedup: Arc<Mutex<DedupSet>>,
) {
    let mut attempt: u32 = 0;
    loop {
        if !generation_is_current(&relays, &url, generation).await {
            return;
        }
        set_status(&relays, &url, generation, RelayStatus::Connecting, None).await;

        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _response)) => {
                attempt = 0;
                let (mut write, mut read) = stream.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                set_outbox(&relays, &url, generation, tx.clone()).await;
                set_status(&relays, &url, generation, RelayStatus::Connected, None).await;
                tracing::debug!(url, "relay connected");

                resend_subscriptions(&subscriptions, &tx).await;

                loop {
                    tokio::select! {
                        outgoing = rx.recv() => {
                            match outgoing {
                                Some(text) => {
                                    if write.send(WsMessage::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(WsMessage::Text(text))) => {
                                    handle_incoming(&text, &subscriptions, &dedup).await;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(url, error = %e, "relay read error");
                                    break;
                                }
                                None => break,
                            }
                        }
                    }
                }
                tracing::debug!(url, "relay disconnected");
                set_status(&relays, &url, generation, RelayStatus::Disconnected, None).await;
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "relay connect failed");
                set_status(&relays, &url, generation, RelayStatus::Error, Some(e.to_string())).await;
            }
        }

        if !generation_is_current(&relays, &url, generation).await {
            return;
        }

        attempt += 1;
        bump_attempts(&relays, &url, generation, attempt).await;
        let backoff_secs = (MIN_BACKOFF_SECS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16)))
            .min(MAX_BACKOFF_SECS);
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
    }
}

async fn generation_is_current(
    relays: &Arc<RwLock<HashMap<String, RelayState>>>,
    url: &str,
    generation: u64,
) -> bool {
    relays
        .read()
        .await
        .get(url)
        .is_some_and(|s| s.generation == generation)
}

async fn set_status(
    relays: &Arc<RwLock<HashMap<String, RelayState>>>,
    url: &str,
    generation: u64,
    status: RelayStatus,
    error: Option<String>,
) {
    let mut relays = relays.write().await;
    if let Some(state) = relays.get_mut(url) {
        if state.generation != generation {
            return;
        }
        state.info.status = status;
        if status == RelayStatus::Connected {
            state.info.reconnect_attempts = 0;
        }
        if error.is_some() {
            state.info.last_error = error;
        }
    }
}

async fn set_outbox(
    relays: &Arc<RwLock<HashMap<String, RelayState>>>,
    url: &str,
    generation: u64,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut relays = relays.write().await;
    if let Some(state) = relays.get_mut(url) {
        if state.generation == generation {
            state.outbox = Some(tx);
        }
    }
}

async fn bump_attempts(
    relays: &Arc<RwLock<HashMap<String, RelayState>>>,
    url: &str,
    generation: u64,
    attempt: u32,
) {
    let mut relays = relays.write().await;
    if let Some(state) = relays.get_mut(url) {
        if state.generation == generation {
            state.info.reconnect_attempts = attempt;
        }
    }
}

async fn resend_subscriptions(
    subscriptions: &Arc<RwLock<HashMap<String, SubscriptionEntry>>>,
    tx: &mpsc::UnboundedSender<String>,
) {
    let subs = subscriptions.read().await;
    for (sub_id, entry) in subs.iter() {
        let _ = tx.send(req_message(sub_id, &entry.filters));
    }
}

/// Dispatch one incoming relay text frame: `EVENT`, `EOSE`, `OK`, or `NOTICE`.
async fn handle_incoming(
    text: &str,
    subscriptions: &Arc<RwLock<HashMap<String, SubscriptionEntry>>>,
    dedup: &Arc<Mutex<DedupSet>>,
) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let Some(arr) = value.as_array() else { return };
    let Some(tag) = arr.first().and_then(Value::as_str) else {
        return;
    };

    match tag {
        "EVENT" => {
            let (Some(sub_id), Some(event_value)) = (arr.get(1).and_then(Value::as_str), arr.get(2))
            else {
                return;
            };
            let Ok(event) = serde_json::from_value::<Event>(event_value.clone()) else {
                return;
            };
            let novel = dedup.lock().await.mark(&event.id);
            if !novel {
                return;
            }
            let subs = subscriptions.read().await;
            if let Some(entry) = subs.get(sub_id) {
                (entry.on_event)(event);
            }
        }
        "EOSE" => {
            let Some(sub_id) = arr.get(1).and_then(Value::as_str) else {
                return;
            };
            let subs = subscriptions.read().await;
            if let Some(entry) = subs.get(sub_id) {
                if let Some(cb) = &entry.on_eose {
                    cb();
                }
            }
        }
        "OK" => {
            let event_id = arr.get(1).and_then(Value::as_str).unwrap_or_default();
            let accepted = arr.get(2).and_then(Value::as_bool).unwrap_or(false);
            let reason = arr.get(3).and_then(Value::as_str).unwrap_or_default();
            if !accepted {
                tracing::warn!(event_id, reason, "relay rejected event");
            }
        }
        "NOTICE" => {
            let notice = arr.get(1).and_then(Value::as_str).unwrap_or_default();
            tracing::info!(notice, "relay notice");
        }
        _ => {}
    }
}
