//! Worker name generation

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Build a worker name from its region, launch time and a random token
///
/// `<prefix>-<geo>-<YYYYmmdd-HHMMSS>-<uuid>`, with the region lowercased and
/// anything outside `[a-z0-9]` turned into `_` so the result is a valid
/// container name.
pub fn worker_name(prefix: &str, geo: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}-{}",
        prefix,
        geo_slug(geo),
        at.format("%Y%m%d-%H%M%S"),
        Uuid::new_v4()
    )
}

fn geo_slug(geo: &str) -> String {
    geo.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
