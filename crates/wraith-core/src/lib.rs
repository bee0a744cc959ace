//! wraith-core — Noise Protocol Framework handshakes and transport, the
//! Nostr private-messaging stack built on top of them, and the identity,
//! storage, and relay-transport plumbing every consumer needs.

pub mod bech32;
pub mod config;
pub mod crypto;
pub mod dedup;
pub mod keystore;
pub mod nostr;
pub mod relay;

pub use crypto::{NoiseKeypair, Pattern, Role, Session};
pub use dedup::DedupSet;
pub use keystore::Keystore;
pub use relay::{Filter, RelayMultiplexer};
