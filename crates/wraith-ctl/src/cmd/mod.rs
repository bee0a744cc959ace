pub mod dm;
pub mod event;
pub mod identity;
pub mod relay;

/// Seconds since the Unix epoch, used as the `created_at` for anything
/// this CLI signs or seals.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}
