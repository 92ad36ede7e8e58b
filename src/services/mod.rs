//! Source adapters: per-publisher discovery and detail fetching.
//!
//! Each publisher gets one statically registered adapter behind the
//! `SourceAdapter` capability interface:
//! - HoYoLAB (`HoyolabAdapter`): REST polling of a JSON envelope API
//! - Gryphline (`GryphlineAdapter`): serialized arrays embedded in
//!   rendered pages
//! - Shadowverse (`ShadowverseAdapter`): scraped HTML with a read-only
//!   text mirror fallback

mod gryphline;
mod hoyolab;
mod shadowverse;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, de};

pub use gryphline::GryphlineAdapter;
pub use hoyolab::HoyolabAdapter;
pub use shadowverse::ShadowverseAdapter;

use crate::error::Result;
use crate::models::{Category, Config, DetailRecord, Game, Platform, RawDiscoveryRecord};
use crate::pipeline::transform::ContentRule;

/// Capability interface of one publisher.
///
/// Discover failures are isolated per (game, category) by the caller;
/// detail fetches are independent and safe to run concurrently.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform this adapter serves.
    fn platform(&self) -> Platform;

    /// Content quirk rules this platform's payloads need.
    fn content_rules(&self) -> &'static [ContentRule] {
        &[]
    }

    /// List recent items for one (game, category).
    async fn discover(&self, game: Game, category: Category) -> Result<Vec<RawDiscoveryRecord>>;

    /// Fetch full content for one discovered item.
    async fn fetch_detail(&self, game: Game, raw_id: &str) -> Result<DetailRecord>;
}

/// Build the adapter for a platform.
pub fn create_adapter(
    platform: Platform,
    client: reqwest::Client,
    config: &Config,
) -> Box<dyn SourceAdapter> {
    match platform {
        Platform::Hoyolab => Box::new(HoyolabAdapter::new(client, config)),
        Platform::Gryphline => Box::new(GryphlineAdapter::new(client, config)),
        Platform::Shadowverse => Box::new(ShadowverseAdapter::new(client, config)),
    }
}

/// Deserialize an id field that upstream emits as either string or number.
pub(crate) fn flexible_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Deserialize a timestamp field that upstream emits as number, numeric
/// string, or null. Unparsable values collapse to 0.
pub(crate) fn flexible_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0)),
        serde_json::Value::String(s) => Ok(s.trim().parse().unwrap_or(0)),
        serde_json::Value::Null => Ok(0),
        other => Err(de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}
