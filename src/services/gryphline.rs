//! Gryphline source adapter.
//!
//! Gryphline ships no public API; listing and detail pages embed
//! serialized arrays through framework push calls. The adapter locates
//! the push payloads, then digs the JSON object holding the needle key
//! out of the embedded strings. Inherently more brittle than a REST
//! envelope, so every extraction step degrades to "skip this item".

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Category, Config, DetailRecord, Game, Platform, RawDiscoveryRecord};
use crate::services::{SourceAdapter, flexible_i64, flexible_string};
use crate::utils::http::{RetryPolicy, with_retry};

const SITE_BASE: &str = "https://endfield.gryphline.com";
const DEFAULT_AUTHOR: &str = "Arknights: Endfield";

/// Rendered-payload adapter for Gryphline-hosted games.
pub struct GryphlineAdapter {
    client: reqwest::Client,
    language: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct BulletinList {
    bulletins: Vec<Bulletin>,
}

#[derive(Debug, Deserialize)]
struct Bulletin {
    #[serde(deserialize_with = "flexible_string")]
    cid: String,
    #[serde(default)]
    tab: String,
    #[serde(rename = "displayTime", default, deserialize_with = "flexible_i64")]
    display_time: i64,
}

#[derive(Debug, Deserialize)]
struct BulletinDetail {
    #[serde(deserialize_with = "flexible_string")]
    cid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    /// Article HTML
    #[serde(default)]
    data: String,
    #[serde(default)]
    tab: String,
    #[serde(rename = "displayTime", default, deserialize_with = "flexible_i64")]
    display_time: i64,
    #[serde(default)]
    cover: String,
    #[serde(default)]
    brief: String,
}

fn push_payload_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"self\.__next_f\.push\((\[[^\n]+?\])\)").unwrap())
}

/// Collect the raw push payload arrays embedded in a page.
fn extract_push_payloads(html: &str) -> Vec<&str> {
    push_payload_pattern()
        .captures_iter(html)
        .map(|caps| caps.get(1).unwrap().as_str())
        .collect()
}

/// Locate the JSON object containing `needle` inside a larger string.
///
/// Walks back to the nearest opening brace before the needle, then scans
/// forward balancing braces until the object closes.
fn find_json_object<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    let needle_at = haystack.find(needle)?;
    let start = haystack[..needle_at].rfind('{')?;

    let mut depth = 0usize;
    for (offset, ch) in haystack[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&haystack[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract every parseable JSON object containing `needle` from a page.
fn extract_json_blocks(html: &str, needle: &str) -> Vec<serde_json::Value> {
    let mut blocks = Vec::new();
    for payload in extract_push_payloads(html) {
        let Ok(parts) = serde_json::from_str::<Vec<serde_json::Value>>(payload) else {
            continue;
        };
        for part in parts {
            let Some(text) = part.as_str() else { continue };
            if !text.contains(needle) {
                continue;
            }
            if let Some(object) = find_json_object(text, needle) {
                if let Ok(value) = serde_json::from_str(object) {
                    blocks.push(value);
                }
            }
        }
    }
    blocks
}

impl GryphlineAdapter {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            language: config.feeds.language.clone(),
            retry: RetryPolicy::from_runtime(&config.runtime),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        with_retry(&self.retry, url, || async move {
            let text = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(text)
        })
        .await
    }

    fn gryphline_tab(category: Category) -> &'static str {
        match category {
            Category::Notices => "notices",
            _ => "news",
        }
    }
}

#[async_trait]
impl SourceAdapter for GryphlineAdapter {
    fn platform(&self) -> Platform {
        Platform::Gryphline
    }

    async fn discover(&self, _game: Game, category: Category) -> Result<Vec<RawDiscoveryRecord>> {
        let url = format!("{SITE_BASE}/{}/news", self.language);
        let html = self.fetch_page(&url).await?;

        let listing = extract_json_blocks(&html, "\"bulletins\"")
            .into_iter()
            .find_map(|block| serde_json::from_value::<BulletinList>(block).ok())
            .ok_or_else(|| AppError::upstream_format(&url, "no bulletins payload found"))?;

        let wanted_tab = Self::gryphline_tab(category);
        Ok(listing
            .bulletins
            .into_iter()
            .filter(|bulletin| bulletin.tab == wanted_tab)
            .map(|bulletin| RawDiscoveryRecord {
                id: bulletin.cid,
                created: bulletin.display_time,
                last_modified: 0,
            })
            .collect())
    }

    async fn fetch_detail(&self, _game: Game, raw_id: &str) -> Result<DetailRecord> {
        let url = format!("{SITE_BASE}/{}/news/{raw_id}", self.language);
        let html = self.fetch_page(&url).await?;

        let detail = extract_json_blocks(&html, "\"data\"")
            .into_iter()
            .filter_map(|block| serde_json::from_value::<BulletinDetail>(block).ok())
            .find(|detail| detail.cid == raw_id && !detail.data.is_empty())
            .ok_or_else(|| {
                AppError::upstream_format(&url, format!("no detail payload for bulletin {raw_id}"))
            })?;

        let author = if detail.author.is_empty() {
            DEFAULT_AUTHOR.to_string()
        } else {
            detail.author
        };

        Ok(DetailRecord {
            id: detail.cid,
            url,
            title: detail.title,
            author,
            content: detail.data,
            category: Category::from_gryphline_tab(&detail.tab).unwrap_or(Category::News),
            created: detail.display_time,
            last_modified: 0,
            image: (!detail.cover.is_empty()).then_some(detail.cover),
            summary: (!detail.brief.is_empty()).then_some(detail.brief),
            structured_content: None,
            video: None,
            native_video: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <script>self.__next_f.push([1,"prefix {\"bulletins\":[{\"cid\":\"101\",\"tab\":\"notices\",\"displayTime\":1700000000},{\"cid\":\"102\",\"tab\":\"news\",\"displayTime\":1700000100},{\"cid\":\"103\",\"tab\":\"linkage\",\"displayTime\":1700000200}]} suffix"])</script>
    "#;

    #[test]
    fn push_payloads_are_extracted() {
        let payloads = extract_push_payloads(LISTING_PAGE);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].starts_with("[1,"));
    }

    #[test]
    fn json_object_extraction_balances_braces() {
        let text = r#"x {"outer":{"inner":1},"needle":2} y"#;
        assert_eq!(
            find_json_object(text, "\"needle\""),
            Some(r#"{"outer":{"inner":1},"needle":2}"#)
        );
    }

    #[test]
    fn json_object_extraction_handles_missing_needle() {
        assert_eq!(find_json_object("{}", "\"absent\""), None);
    }

    #[test]
    fn bulletins_parse_from_listing_page() {
        let blocks = extract_json_blocks(LISTING_PAGE, "\"bulletins\"");
        let listing: BulletinList = serde_json::from_value(blocks[0].clone()).unwrap();
        assert_eq!(listing.bulletins.len(), 3);
        assert_eq!(listing.bulletins[0].cid, "101");
        assert_eq!(listing.bulletins[0].display_time, 1_700_000_000);
    }

    #[test]
    fn tab_filter_selects_requested_category() {
        let blocks = extract_json_blocks(LISTING_PAGE, "\"bulletins\"");
        let listing: BulletinList = serde_json::from_value(blocks[0].clone()).unwrap();
        let news: Vec<_> = listing
            .bulletins
            .into_iter()
            .filter(|b| b.tab == GryphlineAdapter::gryphline_tab(Category::News))
            .collect();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].cid, "102");
    }

    #[test]
    fn detail_parses_with_defaults() {
        let detail: BulletinDetail = serde_json::from_str(
            r#"{"cid":"101","title":"Patch","data":"<p>x</p>","tab":"notices",
                "displayTime":1700000000,"cover":"","brief":""}"#,
        )
        .unwrap();
        assert_eq!(detail.cid, "101");
        assert!(detail.author.is_empty());
        assert_eq!(detail.data, "<p>x</p>");
    }
}
