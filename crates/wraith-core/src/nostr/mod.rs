//! Nostr private-messaging stack: NIP-44 payload encryption, the
//! NIP-17/NIP-59 seal-and-gift-wrap onion, legacy NIP-04, and the
//! geohash presence/note events.

pub mod event;
pub mod geohash;
pub mod nip04;
pub mod nip17;
pub mod nip44;
pub mod nip59;

use rand::Rng;

/// A timestamp uniformly randomized within 15 minutes of `now`, used to
/// defeat timing correlation on seals and gift-wraps (NIP-17 §"Encrypting").
pub fn randomized_timestamp(now: i64) -> i64 {
    rand::thread_rng().gen_range(now - 900..=now + 900)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn randomized_timestamp_stays_in_window() {
        for _ in 0..200 {
            let t = randomized_timestamp(1_700_000_000);
            assert!((t - 1_700_000_000).abs() <= 900);
        }
    }
}
