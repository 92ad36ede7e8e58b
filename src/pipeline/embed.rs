//! Notification payload construction.
//!
//! Builds one size-bounded embed from a normalized item and its rendered
//! plaintext. All limits are enforced here so the delivery sink can post
//! payloads verbatim.

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::FeedItem;

/// Hard cap on the title, ellipsis included.
const TITLE_LIMIT: usize = 256;
const TITLE_ELLIPSIS: &str = "...";

/// Soft cap on the description.
const DESCRIPTION_LIMIT: usize = 4096;

/// Absolute ceiling across all counted text fields.
const TOTAL_LIMIT: usize = 6000;

/// Structured notification payload, serialized as one embed object.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedPayload {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    pub footer: EmbedFooter,
    /// ISO-8601 publication timestamp
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl EmbedPayload {
    /// Total counted text length, the quantity bounded by the ceiling.
    fn text_len(&self) -> usize {
        self.title.graphemes(true).count()
            + self.description.graphemes(true).count()
            + self.footer.text.graphemes(true).count()
            + self
                .author
                .as_ref()
                .map_or(0, |a| a.name.graphemes(true).count())
    }
}

/// Build the notification payload for one item.
pub fn build(item: &FeedItem, rendered: &str) -> EmbedPayload {
    let title_source = if item.title.is_empty() {
        &item.url
    } else {
        &item.title
    };

    let mut payload = EmbedPayload {
        title: truncate_title(title_source),
        url: item.url.clone(),
        description: truncate_description(rendered, &item.url, DESCRIPTION_LIMIT),
        color: item.game.embed_color(),
        thumbnail: item.image.clone().map(|url| EmbedThumbnail { url }),
        author: (!item.author.is_empty()).then(|| EmbedAuthor {
            name: truncate_title(&item.author),
        }),
        footer: EmbedFooter {
            text: format!("{} \u{b7} {}", item.category, item.game),
        },
        timestamp: item.published.to_rfc3339(),
    };

    // The description is the largest variable field; shrink it first when
    // the aggregate still exceeds the ceiling.
    let total = payload.text_len();
    if total > TOTAL_LIMIT {
        let desc_len = payload.description.graphemes(true).count();
        let budget = desc_len.saturating_sub(total - TOTAL_LIMIT);
        payload.description = truncate_description(rendered, &item.url, budget);
    }

    payload
}

/// Hard-cap a title at the limit with an ellipsis suffix.
fn truncate_title(text: &str) -> String {
    let count = text.graphemes(true).count();
    if count <= TITLE_LIMIT {
        return text.to_string();
    }
    let keep = TITLE_LIMIT - TITLE_ELLIPSIS.len();
    let mut out: String = text.graphemes(true).take(keep).collect();
    out.push_str(TITLE_ELLIPSIS);
    out
}

/// Soft-cap a description near the limit.
///
/// Over-long text is cut at a word boundary and suffixed with a link back
/// to the full article.
fn truncate_description(text: &str, url: &str, limit: usize) -> String {
    if text.graphemes(true).count() <= limit {
        return text.to_string();
    }

    let suffix = format!("\n\nRead more: {url}");
    let suffix_len = suffix.graphemes(true).count();
    if limit <= suffix_len {
        // Not even room for the link; take what fits.
        return text.graphemes(true).take(limit.saturating_sub(1)).collect();
    }

    let mut cut: String = text.graphemes(true).take(limit - suffix_len).collect();
    if let Some(idx) = cut.rfind(' ') {
        cut.truncate(idx);
    }
    cut + &suffix
}
