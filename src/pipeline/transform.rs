//! Ordered content-cleanup rules for quirky upstream payloads.
//!
//! Each adapter declares which rules apply to its content; an adapter
//! with no quirks gets the identity transform. Rules are pure rewrites
//! applied in a fixed order. A rule whose input cannot be parsed never
//! fails the pipeline: the item keeps its original content and is
//! flagged for manual review instead of being dropped.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::DetailRecord;

/// Known private CDN host token and its public equivalent.
const PRIVATE_CDN_HOST: &str = "hoyolab-upload-private";
const PUBLIC_CDN_HOST: &str = "upload-os-bbs";

/// Leading paragraph markers that carry no content.
const EMPTY_PARAGRAPH_MARKERS: [&str; 3] = ["<p></p>", "<p>&nbsp;</p>", "<p><br></p>"];

/// One rewrite rule an adapter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    /// Reconstruct HTML from the structured-delta payload when content is
    /// a bare locale code (a known upstream bug)
    StructuredFallback,
    /// Replace content of native video posts with a synthesized block
    VideoOverride,
    /// Drop a single leading empty paragraph
    StripLeadingEmptyParagraph,
    /// Rewrite private CDN hosts to their public equivalent
    RewritePrivateLinks,
}

/// Canonical application order; declared rules run in this sequence.
const RULE_ORDER: [ContentRule; 4] = [
    ContentRule::StructuredFallback,
    ContentRule::VideoOverride,
    ContentRule::StripLeadingEmptyParagraph,
    ContentRule::RewritePrivateLinks,
];

/// Result of running the transformer on one detail record.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// Canonical HTML content
    pub content: String,

    /// A rule input could not be parsed; original content was kept
    pub needs_review: bool,
}

fn locale_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2}-[a-z]{2}$").unwrap())
}

/// Apply the declared rules to a detail record's content.
pub fn apply(rules: &[ContentRule], detail: &DetailRecord) -> TransformOutcome {
    let mut content = detail.content.clone();
    let mut needs_review = false;

    for rule in RULE_ORDER {
        if !rules.contains(&rule) {
            continue;
        }
        match rule {
            ContentRule::StructuredFallback => {
                if locale_code_pattern().is_match(content.trim()) {
                    match reconstruct_structured(detail.structured_content.as_deref()) {
                        Some(rebuilt) => content = rebuilt,
                        None => {
                            log::warn!(
                                "Structured payload for item {} is unparsable; keeping raw content",
                                detail.id
                            );
                            needs_review = true;
                        }
                    }
                }
            }
            ContentRule::VideoOverride => {
                if detail.native_video {
                    if let Some(video) = &detail.video {
                        let desc = detail.summary.as_deref().unwrap_or_default();
                        content = format!(
                            "<video src=\"{url}\" poster=\"{cover}\" controls playsinline>\
                             Watch the video here: {url}</video><p>{desc}</p>",
                            url = video.url,
                            cover = video.cover,
                        );
                    }
                }
            }
            ContentRule::StripLeadingEmptyParagraph => {
                content = strip_leading_empty_paragraph(content);
            }
            ContentRule::RewritePrivateLinks => {
                content = content.replace(PRIVATE_CDN_HOST, PUBLIC_CDN_HOST);
            }
        }
    }

    TransformOutcome {
        content,
        needs_review,
    }
}

/// One insert operation of the structured-delta format.
#[derive(Debug, Deserialize)]
struct InsertOp {
    insert: serde_json::Value,
    #[serde(default)]
    attributes: Option<InsertAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct InsertAttributes {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
}

/// Rebuild HTML from the structured-delta payload.
///
/// Fragments concatenate in original order; no reordering or merging.
/// Returns `None` when the payload is missing or not a valid delta list.
fn reconstruct_structured(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    // Upstream embeds raw newlines (and escaped ones) inside op strings,
    // which breaks JSON parsing; fold them into break tags first.
    let prepared = raw.replace("\\n", "<br>").replace('\n', "<br>");
    let ops: Vec<InsertOp> = serde_json::from_str(&prepared).ok()?;

    let mut out = String::new();
    for op in ops {
        let attrs = op.attributes.unwrap_or_default();
        match op.insert {
            serde_json::Value::String(text) => {
                if let Some(link) = attrs.link {
                    out.push_str(&format!("<p><a href=\"{link}\">{text}</a></p>"));
                } else if attrs.bold {
                    out.push_str(&format!("<p><strong>{text}</strong></p>"));
                } else if attrs.italic {
                    out.push_str(&format!("<p><em>{text}</em></p>"));
                } else {
                    out.push_str(&format!("<p>{text}</p>"));
                }
            }
            serde_json::Value::Object(map) => {
                if let Some(src) = map.get("image").and_then(|v| v.as_str()) {
                    out.push_str(&format!("<img src=\"{src}\">"));
                }
                if let Some(src) = map.get("video").and_then(|v| v.as_str()) {
                    out.push_str(&format!("<iframe src=\"{src}\"></iframe>"));
                }
            }
            _ => {}
        }
    }
    Some(out)
}

/// Delete everything up to and including the first closing-paragraph
/// marker when content opens with an empty paragraph.
fn strip_leading_empty_paragraph(content: String) -> String {
    let opens_empty = EMPTY_PARAGRAPH_MARKERS
        .iter()
        .any(|marker| content.starts_with(marker));
    if !opens_empty {
        return content;
    }

    match content.find("</p>") {
        Some(idx) => content[idx + "</p>".len()..].to_string(),
        None => content,
    }
}
