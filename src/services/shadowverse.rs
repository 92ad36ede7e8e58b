//! Shadowverse source adapter.
//!
//! No API at all: discovery scrapes article permalinks off the homepage
//! and details come from the article pages themselves. The site
//! intermittently rejects direct fetches, in which case a read-only text
//! mirror serves a markdown-like rendition; extraction handles both
//! shapes. Articles expose no modification time, so records carry an
//! effective timestamp of 0 and an item is NEW exactly once.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Category, Config, DetailRecord, Game, Platform, RawDiscoveryRecord};
use crate::services::SourceAdapter;
use crate::utils::http::{RetryPolicy, with_retry};

const SITE_BASE: &str = "https://shadowverse.gg/";
const MIRROR_PREFIX: &str = "https://r.jina.ai/http://";
const DEFAULT_AUTHOR: &str = "Shadowverse.gg";

/// Character cap on the extracted article body.
const SUMMARY_LIMIT: usize = 3200;

/// First path segments that are sections or utility pages, not articles.
const NON_ARTICLE_SEGMENTS: [&str; 18] = [
    "cards",
    "decks",
    "collection",
    "builder",
    "tier-list",
    "events",
    "articles",
    "classes",
    "guides",
    "meta",
    "sets",
    "tournaments",
    "about",
    "contact",
    "privacy",
    "terms",
    "login",
    "news",
];

/// How a page was obtained, which decides the extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    /// Direct fetch; content is HTML
    Html,
    /// Mirror fetch; content is markdown-like text
    Text,
}

struct Patterns {
    html_link: Regex,
    text_link: Regex,
    article_path: Regex,
    heading: Regex,
    date: Regex,
    author: Regex,
    tag: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        html_link: Regex::new(r#"href=["'](https?://shadowverse\.gg/[^"']+)["']"#).unwrap(),
        text_link: Regex::new(r"\((https?://shadowverse\.gg/[^\s)]+)\)").unwrap(),
        article_path: Regex::new(r"^[a-z0-9-]+(?:/[a-z0-9-]+)?/?$").unwrap(),
        heading: Regex::new(r"(?m)^#\s+(.+)$").unwrap(),
        date: Regex::new(
            r"(January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4}",
        )
        .unwrap(),
        author: Regex::new(r"\bBy\s+([A-Za-z0-9_.\- ]{2,})\b").unwrap(),
        tag: Regex::new(r"<[^>]+>").unwrap(),
    })
}

/// Heuristic for article permalinks linked from the homepage.
fn is_article_url(url: &str) -> bool {
    let Some(path) = url.strip_prefix(SITE_BASE) else {
        return false;
    };
    let path = path.trim_matches('/');
    if path.is_empty() {
        return false;
    }
    if path.starts_with("page/") || path.contains("/page/") {
        return false;
    }
    let first = path.split('/').next().unwrap_or_default();
    if NON_ARTICLE_SEGMENTS.contains(&first) {
        return false;
    }
    patterns().article_path.is_match(path)
}

/// Drop query and fragment from a candidate link.
fn canonical_link(raw: &str) -> Option<String> {
    let mut url = url::Url::parse(raw).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Collect article links from a fetched page, order-preserving deduped.
fn find_article_links(content: &str, kind: PageKind) -> Vec<String> {
    let pattern = match kind {
        PageKind::Html => &patterns().html_link,
        PageKind::Text => &patterns().text_link,
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for caps in pattern.captures_iter(content) {
        let Some(url) = canonical_link(caps.get(1).unwrap().as_str()) else {
            continue;
        };
        if is_article_url(&url) && seen.insert(url.clone()) {
            links.push(url);
        }
    }
    links
}

/// Fields extracted from one article page.
#[derive(Debug, Default)]
struct Article {
    title: Option<String>,
    author: Option<String>,
    published: i64,
    body: String,
}

fn extract_article(content: &str, kind: PageKind) -> Article {
    let (title, text) = match kind {
        PageKind::Html => {
            let document = Html::parse_document(content);
            let h1 = Selector::parse("h1").expect("static selector");
            let title = document.select(&h1).next().map(|el| {
                el.text().collect::<String>().trim().to_string()
            });
            // Flatten the page to text for date/author scanning.
            let text = patterns().tag.replace_all(content, " ").into_owned();
            (title.filter(|t| !t.is_empty()), text)
        }
        PageKind::Text => {
            let title = patterns()
                .heading
                .captures(content)
                .map(|caps| caps[1].trim().to_string());
            (title, content.to_string())
        }
    };

    let published = patterns()
        .date
        .find(&text)
        .and_then(|m| parse_article_date(m.as_str()))
        .unwrap_or(0);

    let author = patterns()
        .author
        .captures(&text)
        .map(|caps| caps[1].trim().to_string());

    Article {
        title,
        author,
        published,
        body: text.trim().to_string(),
    }
}

/// Parse a "Month D, YYYY" date to epoch seconds at UTC midnight.
fn parse_article_date(text: &str) -> Option<i64> {
    let date = chrono::NaiveDate::parse_from_str(text, "%B %d, %Y").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Scraped-HTML adapter for Shadowverse.gg.
pub struct ShadowverseAdapter {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ShadowverseAdapter {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_runtime(&config.runtime),
        }
    }

    async fn direct_get(&self, url: &str) -> Result<String> {
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    async fn mirror_get(&self, url: &str) -> Result<String> {
        let target = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        let mirror_url = format!("{MIRROR_PREFIX}{target}");
        self.direct_get(&mirror_url).await
    }

    /// Fetch a page directly, degrading to the text mirror when the site
    /// rejects the request outright (403/429/503).
    async fn fetch_page(&self, url: &str) -> Result<(PageKind, String)> {
        with_retry(&self.retry, url, || async move {
            match self.direct_get(url).await {
                Ok(text) => Ok((PageKind::Html, text)),
                Err(e) if is_blocked(&e) => {
                    log::warn!("Direct fetch of {url} blocked; using text mirror");
                    let text = self.mirror_get(url).await?;
                    Ok((PageKind::Text, text))
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}

/// Status codes where the site is refusing us rather than failing.
fn is_blocked(error: &AppError) -> bool {
    let AppError::Http(e) = error else {
        return false;
    };
    matches!(
        e.status().map(|s| s.as_u16()),
        Some(403) | Some(429) | Some(503)
    )
}

#[async_trait]
impl SourceAdapter for ShadowverseAdapter {
    fn platform(&self) -> Platform {
        Platform::Shadowverse
    }

    async fn discover(&self, _game: Game, _category: Category) -> Result<Vec<RawDiscoveryRecord>> {
        let (kind, content) = self.fetch_page(SITE_BASE).await?;
        Ok(find_article_links(&content, kind)
            .into_iter()
            .map(|url| RawDiscoveryRecord {
                id: url,
                created: 0,
                last_modified: 0,
            })
            .collect())
    }

    async fn fetch_detail(&self, _game: Game, raw_id: &str) -> Result<DetailRecord> {
        let (kind, content) = self.fetch_page(raw_id).await?;
        let article = extract_article(&content, kind);

        let summary: String = article.body.chars().take(SUMMARY_LIMIT).collect();
        let summary = summary.trim().to_string();

        Ok(DetailRecord {
            id: raw_id.to_string(),
            url: raw_id.to_string(),
            title: article.title.unwrap_or_else(|| raw_id.to_string()),
            author: article.author.unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            content: summary.clone(),
            category: Category::News,
            created: article.published,
            last_modified: 0,
            image: None,
            summary: (!summary.is_empty()).then_some(summary),
            structured_content: None,
            video: None,
            native_video: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_url_heuristic() {
        assert!(is_article_url("https://shadowverse.gg/some-article"));
        assert!(is_article_url("https://shadowverse.gg/some-article/part-two/"));
        assert!(!is_article_url("https://shadowverse.gg/"));
        assert!(!is_article_url("https://shadowverse.gg/cards/rotation"));
        assert!(!is_article_url("https://shadowverse.gg/page/2"));
        assert!(!is_article_url("https://shadowverse.gg/some/page/2"));
        assert!(!is_article_url("https://shadowverse.gg/UPPER-case"));
        assert!(!is_article_url("https://example.com/some-article"));
    }

    #[test]
    fn html_links_are_deduped_in_order() {
        let html = r#"
            <a href="https://shadowverse.gg/first-post?utm=x">a</a>
            <a href="https://shadowverse.gg/cards/list">b</a>
            <a href="https://shadowverse.gg/second-post#top">c</a>
            <a href="https://shadowverse.gg/first-post">d</a>
        "#;
        let links = find_article_links(html, PageKind::Html);
        assert_eq!(
            links,
            vec![
                "https://shadowverse.gg/first-post",
                "https://shadowverse.gg/second-post"
            ]
        );
    }

    #[test]
    fn text_links_come_from_markdown_parens() {
        let text = "[First](https://shadowverse.gg/first-post) and \
                    [News](https://shadowverse.gg/news)";
        let links = find_article_links(text, PageKind::Text);
        assert_eq!(links, vec!["https://shadowverse.gg/first-post"]);
    }

    #[test]
    fn html_article_extraction() {
        let html = r#"
            <html><body>
            <h1>Big <em>Patch</em> Incoming</h1>
            <p>Posted on March 5, 2026 By WordsmithSV</p>
            <p>Body text here.</p>
            </body></html>
        "#;
        let article = extract_article(html, PageKind::Html);
        assert_eq!(article.title.as_deref(), Some("Big Patch Incoming"));
        assert_eq!(article.author.as_deref(), Some("WordsmithSV"));
        assert_eq!(article.published, parse_article_date("March 5, 2026").unwrap());
        assert!(article.body.contains("Body text here."));
    }

    #[test]
    fn text_article_extraction() {
        let text = "# Mirror Title\n\nJanuary 12, 2026\n\nBy Someone\n\nBody.";
        let article = extract_article(text, PageKind::Text);
        assert_eq!(article.title.as_deref(), Some("Mirror Title"));
        assert_eq!(article.author.as_deref(), Some("Someone"));
        assert!(article.published > 0);
    }

    #[test]
    fn article_without_metadata_defaults() {
        let article = extract_article("<p>just text</p>", PageKind::Html);
        assert!(article.title.is_none());
        assert!(article.author.is_none());
        assert_eq!(article.published, 0);
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_article_date("January 1, 1970"), Some(0));
        assert!(parse_article_date("Smarch 1, 2026").is_none());
    }
}
