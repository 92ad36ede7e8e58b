//! HoYoLAB source adapter.
//!
//! Polls the community REST API. Every response is wrapped in an
//! envelope `{retcode, message, data}`; a non-zero retcode is an upstream
//! logical failure even when the HTTP status is 200.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{
    Category, Config, DetailRecord, Game, Platform, RawDiscoveryRecord, VideoSource,
};
use crate::pipeline::transform::ContentRule;
use crate::services::{SourceAdapter, flexible_i64, flexible_string};
use crate::utils::http::{RetryPolicy, with_retry};

const API_BASE: &str = "https://bbs-api-os.hoyolab.com/community/post/wapi/";
const ORIGIN: &str = "https://www.hoyolab.com";

/// `view_type` value marking a native video post.
const VIDEO_VIEW_TYPE: i64 = 5;

/// All four cleanup rules apply to HoYoLAB content.
const RULES: [ContentRule; 4] = [
    ContentRule::StructuredFallback,
    ContentRule::VideoOverride,
    ContentRule::StripLeadingEmptyParagraph,
    ContentRule::RewritePrivateLinks,
];

/// REST-polling adapter for HoYoLAB-hosted games.
pub struct HoyolabAdapter {
    client: reqwest::Client,
    language: String,
    page_size: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    retcode: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NewsListData {
    #[serde(default)]
    list: Vec<NewsEntry>,
}

#[derive(Debug, Deserialize)]
struct NewsEntry {
    post: PostSummary,
    #[serde(default, deserialize_with = "flexible_i64")]
    last_modify_time: i64,
}

#[derive(Debug, Deserialize)]
struct PostSummary {
    #[serde(deserialize_with = "flexible_string")]
    post_id: String,
    #[serde(default, deserialize_with = "flexible_i64")]
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct PostFullData {
    post: PostFull,
}

#[derive(Debug, Deserialize)]
struct PostFull {
    post: PostBody,
    #[serde(default)]
    user: Option<PostUser>,
    #[serde(default)]
    video: Option<PostVideo>,
    #[serde(default)]
    cover_list: Vec<PostCover>,
    #[serde(default, deserialize_with = "flexible_i64")]
    last_modify_time: i64,
}

#[derive(Debug, Deserialize)]
struct PostBody {
    #[serde(deserialize_with = "flexible_string")]
    post_id: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    structured_content: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    official_type: i64,
    #[serde(default)]
    view_type: i64,
    #[serde(default, deserialize_with = "flexible_i64")]
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct PostUser {
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct PostVideo {
    #[serde(default)]
    url: String,
    #[serde(default)]
    cover: String,
}

#[derive(Debug, Deserialize)]
struct PostCover {
    #[serde(default)]
    url: String,
}

impl HoyolabAdapter {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            language: config.feeds.language.clone(),
            page_size: config.feeds.page_size,
            retry: RetryPolicy::from_runtime(&config.runtime),
        }
    }

    /// GET an endpoint and unwrap the response envelope.
    async fn get_data(&self, endpoint: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{API_BASE}{endpoint}");
        let url = &url;

        with_retry(&self.retry, endpoint, || async move {
            let envelope: Envelope = self
                .client
                .get(url)
                .query(params)
                .header("Origin", ORIGIN)
                .header("X-Rpc-Language", &self.language)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if envelope.retcode != 0 {
                return Err(AppError::upstream_status(envelope.retcode, envelope.message));
            }
            envelope
                .data
                .ok_or_else(|| AppError::upstream_format(endpoint, "envelope has no data"))
        })
        .await
    }

    fn gids_for(game: Game) -> Result<u32> {
        game.hoyolab_gids().ok_or_else(|| {
            AppError::config(format!("game {game} is not hosted on hoyolab"))
        })
    }
}

#[async_trait]
impl SourceAdapter for HoyolabAdapter {
    fn platform(&self) -> Platform {
        Platform::Hoyolab
    }

    fn content_rules(&self) -> &'static [ContentRule] {
        &RULES
    }

    async fn discover(&self, game: Game, category: Category) -> Result<Vec<RawDiscoveryRecord>> {
        let gids = Self::gids_for(game)?;
        let Some(news_type) = category.hoyolab_type() else {
            log::warn!("Category {category} has no hoyolab news type; skipping");
            return Ok(Vec::new());
        };

        let params = [
            ("gids", gids.to_string()),
            ("type", news_type.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        let data = self.get_data("getNewsList", &params).await?;
        let listing: NewsListData = serde_json::from_value(data)
            .map_err(|e| AppError::upstream_format("getNewsList", e))?;

        Ok(listing
            .list
            .into_iter()
            .map(|entry| RawDiscoveryRecord {
                id: entry.post.post_id,
                created: entry.post.created_at,
                last_modified: entry.last_modify_time,
            })
            .collect())
    }

    async fn fetch_detail(&self, game: Game, raw_id: &str) -> Result<DetailRecord> {
        let gids = Self::gids_for(game)?;
        let params = [
            ("gids", gids.to_string()),
            ("post_id", raw_id.to_string()),
        ];
        let data = self.get_data("getPostFull", &params).await?;
        let full: PostFullData = serde_json::from_value(data)
            .map_err(|e| AppError::upstream_format("getPostFull", e))?;

        let outer = full.post;
        let body = outer.post;

        let video = outer.video.filter(|v| !v.url.is_empty()).map(|v| VideoSource {
            url: v.url,
            cover: v.cover,
        });

        Ok(DetailRecord {
            url: format!("https://www.hoyolab.com/article/{}", body.post_id),
            id: body.post_id,
            title: body.subject,
            author: outer.user.map(|u| u.nickname).unwrap_or_default(),
            content: body.content,
            category: Category::from_hoyolab_type(body.official_type),
            created: body.created_at,
            last_modified: outer.last_modify_time,
            image: outer
                .cover_list
                .into_iter()
                .map(|c| c.url)
                .find(|url| !url.is_empty()),
            summary: (!body.desc.is_empty()).then_some(body.desc.clone()),
            structured_content: (!body.structured_content.is_empty())
                .then_some(body.structured_content),
            video,
            native_video: body.view_type == VIDEO_VIEW_TYPE,
        })
    }
}
