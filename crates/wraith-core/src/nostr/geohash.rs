//! Ephemeral geohash events: location-scoped note (kind 20000) and
//! presence (kind 20001) beacons, both signed directly with the identity
//! key — unlike the private-messaging stack, these are not onion-wrapped.

use super::event::{self, Event, EventError, KIND_GEOHASH_NOTE, KIND_GEOHASH_PRESENCE};

/// The geohash base32 alphabet (omits `a`, `i`, `l`, `o` to avoid
/// confusion with `4`/`1`/`1`/`0`).
const GEOHASH_ALPHABET: &str = "0123456789bcdefghjkmnpqrstuvwxyz";

fn validate_geohash(geohash: &str) -> Result<(), EventError> {
    if geohash.is_empty() || !geohash.chars().all(|c| GEOHASH_ALPHABET.contains(c)) {
        return Err(EventError::InvalidGeohash(geohash.to_string()));
    }
    Ok(())
}

/// Build and sign a kind-20000 note tagged to `geohash`, optionally
/// carrying a display nickname and a `teleport` marker.
pub fn create_note(
    identity_secret: &[u8; 32],
    geohash: &str,
    content: &str,
    nickname: Option<&str>,
    teleport: bool,
    now: i64,
) -> Result<Event, EventError> {
    validate_geohash(geohash)?;
    let mut tags = vec![vec!["g".to_string(), geohash.to_string()]];
    if let Some(nick) = nickname {
        tags.push(vec!["n".to_string(), nick.to_string()]);
    }
    if teleport {
        tags.push(vec!["t".to_string(), "teleport".to_string()]);
    }
    event::sign_event(identity_secret, now, KIND_GEOHASH_NOTE, tags, content.to_string())
}

/// Build and sign a kind-20001 presence beacon: empty content, tagged
/// only with the geohash.
pub fn create_presence(
    identity_secret: &[u8; 32],
    geohash: &str,
    now: i64,
) -> Result<Event, EventError> {
    validate_geohash(geohash)?;
    let tags = vec![vec!["g".to_string(), geohash.to_string()]];
    event::sign_event(identity_secret, now, KIND_GEOHASH_PRESENCE, tags, String::new())
}

/// The `g` tag value, if present.
pub fn geohash_of(event: &Event) -> Option<&str> {
    event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("g"))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}
