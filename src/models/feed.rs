//! Normalized feed item and its identity types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upstream publisher platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Hoyolab,
    Gryphline,
    Shadowverse,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Hoyolab => "hoyolab",
            Platform::Gryphline => "gryphline",
            Platform::Shadowverse => "shadowverse",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game a feed item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Genshin,
    Starrail,
    Honkai3rd,
    Zzz,
    Endfield,
    Shadowverse,
}

impl Game {
    pub fn as_str(&self) -> &'static str {
        match self {
            Game::Genshin => "genshin",
            Game::Starrail => "starrail",
            Game::Honkai3rd => "honkai3rd",
            Game::Zzz => "zzz",
            Game::Endfield => "endfield",
            Game::Shadowverse => "shadowverse",
        }
    }

    /// HoYoLAB community id, for games hosted there.
    pub fn hoyolab_gids(&self) -> Option<u32> {
        match self {
            Game::Honkai3rd => Some(1),
            Game::Genshin => Some(2),
            Game::Starrail => Some(6),
            Game::Zzz => Some(8),
            _ => None,
        }
    }

    /// Accent color for notification embeds.
    pub fn embed_color(&self) -> u32 {
        match self {
            Game::Genshin => 0x00DCDC,
            Game::Starrail => 0xDDA000,
            Game::Honkai3rd => 0x00BFFF,
            Game::Zzz => 0x00FF7F,
            Game::Endfield => 0xFF6347,
            Game::Shadowverse => 0x7E57C2,
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Game {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "genshin" => Ok(Game::Genshin),
            "starrail" => Ok(Game::Starrail),
            "honkai3rd" => Ok(Game::Honkai3rd),
            "zzz" => Ok(Game::Zzz),
            "endfield" => Ok(Game::Endfield),
            "shadowverse" => Ok(Game::Shadowverse),
            other => Err(format!("unknown game: {other}")),
        }
    }
}

/// Canonical item category across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Notices,
    Events,
    Info,
    News,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notices => "notices",
            Category::Events => "events",
            Category::Info => "info",
            Category::News => "news",
        }
    }

    /// Numeric news type used by the HoYoLAB listing endpoint.
    pub fn hoyolab_type(&self) -> Option<u8> {
        match self {
            Category::Notices => Some(1),
            Category::Events => Some(2),
            Category::Info => Some(3),
            Category::News => None,
        }
    }

    /// Map a HoYoLAB `official_type` back to a category.
    ///
    /// Unknown values fall back to `Info`, matching upstream behavior for
    /// posts without an official classification.
    pub fn from_hoyolab_type(official_type: i64) -> Self {
        match official_type {
            1 => Category::Notices,
            2 => Category::Events,
            _ => Category::Info,
        }
    }

    /// Map a Gryphline bulletin tab to a category.
    pub fn from_gryphline_tab(tab: &str) -> Option<Self> {
        match tab {
            "notices" => Some(Category::Notices),
            "news" => Some(Category::News),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of a feed item: `{platform}:{game}:{id}`.
///
/// Stable for the life of the item and unique across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub platform: Platform,
    pub game: Game,
    pub id: String,
}

impl FeedKey {
    pub fn new(platform: Platform, game: Game, id: impl Into<String>) -> Self {
        Self {
            platform,
            game,
            id: id.into(),
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.platform, self.game, self.id)
    }
}

/// One normalized article/post, ready for rendering and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    /// Platform-local identifier
    pub id: String,

    /// Publisher platform
    pub platform: Platform,

    /// Game the item belongs to
    pub game: Game,

    /// Canonical article URL
    pub url: String,

    /// Article title
    pub title: String,

    /// Author display name
    pub author: String,

    /// Canonical HTML content after quirk rewriting
    pub content: String,

    /// Canonical category
    pub category: Category,

    /// Publication timestamp
    pub published: DateTime<Utc>,

    /// Last modification timestamp, when the platform reports one
    pub updated: Option<DateTime<Utc>>,

    /// Thumbnail/cover image URL
    pub image: Option<String>,

    /// Short upstream summary, when present
    pub summary: Option<String>,

    /// Effective timestamp driving change detection (max of created and
    /// last-modified, as discovered this cycle)
    pub effective_ts: i64,

    /// Content transformation hit an unparsable quirk payload and fell
    /// back to the raw content
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_review: bool,
}

impl FeedItem {
    /// Composite identity key.
    pub fn key(&self) -> FeedKey {
        FeedKey::new(self.platform, self.game, self.id.clone())
    }

    /// Hash of the delivered representation.
    ///
    /// Stored as `last_sent_hash` so a later cycle can skip redelivery of
    /// an item whose visible fields did not change.
    pub fn content_hash(&self) -> String {
        let updated = self
            .updated
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let payload = format!("{}|{}|{}|{}", self.title, self.url, self.content, updated);

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> FeedItem {
        FeedItem {
            id: "123".to_string(),
            platform: Platform::Hoyolab,
            game: Game::Genshin,
            url: "https://www.hoyolab.com/article/123".to_string(),
            title: "Version 5.0 Notes".to_string(),
            author: "Paimon".to_string(),
            content: "<p>Hello</p>".to_string(),
            category: Category::Notices,
            published: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated: None,
            image: None,
            summary: None,
            effective_ts: 1_700_000_000,
            needs_review: false,
        }
    }

    #[test]
    fn composite_key_format() {
        let item = sample_item();
        assert_eq!(item.key().to_string(), "hoyolab:genshin:123");
    }

    #[test]
    fn content_hash_is_stable() {
        let item = sample_item();
        assert_eq!(item.content_hash(), item.content_hash());
    }

    #[test]
    fn content_hash_tracks_visible_fields() {
        let item = sample_item();
        let mut edited = item.clone();
        edited.title = "Version 5.1 Notes".to_string();
        assert_ne!(item.content_hash(), edited.content_hash());

        let mut touched = item.clone();
        touched.updated = Some(Utc.timestamp_opt(1_700_000_500, 0).unwrap());
        assert_ne!(item.content_hash(), touched.content_hash());
    }

    #[test]
    fn game_gids_cover_hoyolab_titles() {
        assert_eq!(Game::Genshin.hoyolab_gids(), Some(2));
        assert_eq!(Game::Starrail.hoyolab_gids(), Some(6));
        assert_eq!(Game::Honkai3rd.hoyolab_gids(), Some(1));
        assert_eq!(Game::Zzz.hoyolab_gids(), Some(8));
        assert_eq!(Game::Endfield.hoyolab_gids(), None);
    }

    #[test]
    fn category_mappings_round_trip() {
        assert_eq!(Category::from_hoyolab_type(1), Category::Notices);
        assert_eq!(Category::from_hoyolab_type(2), Category::Events);
        assert_eq!(Category::from_hoyolab_type(99), Category::Info);
        assert_eq!(Category::from_gryphline_tab("news"), Some(Category::News));
        assert_eq!(Category::from_gryphline_tab("linkage"), None);
    }
}
