//! Per-cycle transient records produced by source adapters.

use serde::{Deserialize, Serialize};

use crate::models::Category;

/// Lightweight listing entry, kept only long enough to classify change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiscoveryRecord {
    /// Platform-local item id
    pub id: String,

    /// Creation timestamp (epoch seconds, 0 when unknown)
    pub created: i64,

    /// Last modification timestamp (epoch seconds, 0 when unknown)
    pub last_modified: i64,
}

impl RawDiscoveryRecord {
    /// Timestamp used for change detection.
    pub fn effective(&self) -> i64 {
        self.created.max(self.last_modified)
    }
}

/// Embedded video payload on a native-video post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSource {
    pub url: String,
    pub cover: String,
}

/// Full content fetched for an item classified NEW or MODIFIED.
///
/// Consumed immediately by the content transformer; never retained
/// across cycles.
#[derive(Debug, Clone)]
pub struct DetailRecord {
    /// Platform-local item id
    pub id: String,

    /// Canonical article URL
    pub url: String,

    /// Article title
    pub title: String,

    /// Author display name
    pub author: String,

    /// Raw content as delivered by the platform
    pub content: String,

    /// Authoritative category from the detail payload
    pub category: Category,

    /// Creation timestamp (epoch seconds, 0 when unknown)
    pub created: i64,

    /// Last modification timestamp (epoch seconds, 0 when unknown)
    pub last_modified: i64,

    /// Cover image URL
    pub image: Option<String>,

    /// Short upstream summary/description
    pub summary: Option<String>,

    /// Companion structured-delta payload, for platforms that ship one
    pub structured_content: Option<String>,

    /// Video payload, present on video posts
    pub video: Option<VideoSource>,

    /// Post is flagged as a native video type upstream
    pub native_video: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timestamp_is_max_of_both() {
        let created_newer = RawDiscoveryRecord {
            id: "1".into(),
            created: 200,
            last_modified: 100,
        };
        assert_eq!(created_newer.effective(), 200);

        let modified_newer = RawDiscoveryRecord {
            id: "2".into(),
            created: 100,
            last_modified: 300,
        };
        assert_eq!(modified_newer.effective(), 300);
    }
}
