//! Deterministic HTML-to-plaintext rendering for message bodies.
//!
//! A tolerant token-level scanner, not a DOM parser: a fixed sequence of
//! rewrites turns canonical HTML into the plaintext shipped in payload
//! descriptions. Rendering is idempotent; feeding the output back in is
//! a no-op.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Compiled rewrite patterns, built once.
struct TextRenderer {
    br: Regex,
    p_open: Regex,
    p_close: Regex,
    li_open: Regex,
    li_close: Regex,
    list_wrapper: Regex,
    anchor: Regex,
    img: Regex,
    img_src: Regex,
    img_alt: Regex,
    tag: Regex,
    excess_newlines: Regex,
    excess_spaces: Regex,
}

impl TextRenderer {
    fn new() -> Self {
        Self {
            br: Regex::new(r"(?i)<br\s*/?>").unwrap(),
            p_open: Regex::new(r"(?i)<p[^>]*>").unwrap(),
            p_close: Regex::new(r"(?i)</p>").unwrap(),
            li_open: Regex::new(r"(?i)<li[^>]*>").unwrap(),
            li_close: Regex::new(r"(?i)</li>").unwrap(),
            list_wrapper: Regex::new(r"(?i)</?(ul|ol)[^>]*>").unwrap(),
            anchor: Regex::new(r#"(?is)<a\s+[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap(),
            img: Regex::new(r"(?i)<img[^>]*>").unwrap(),
            img_src: Regex::new(r#"(?i)src=["']([^"']+)["']"#).unwrap(),
            img_alt: Regex::new(r#"(?i)alt=["']([^"']+)["']"#).unwrap(),
            tag: Regex::new(r"<[^>]+>").unwrap(),
            excess_newlines: Regex::new(r"\n{3,}").unwrap(),
            excess_spaces: Regex::new(r"[ \t]{2,}").unwrap(),
        }
    }

    fn render(&self, html: &str) -> String {
        if html.is_empty() {
            return String::new();
        }

        let text = html_escape::decode_html_entities(html).into_owned();
        let text = self.br.replace_all(&text, "\n");
        let text = self.p_close.replace_all(&text, "\n\n");
        let text = self.p_open.replace_all(&text, "");
        let text = self.li_open.replace_all(&text, "\u{2022} ");
        let text = self.li_close.replace_all(&text, "\n");
        let text = self.list_wrapper.replace_all(&text, "");

        let text = self.anchor.replace_all(&text, |caps: &Captures| {
            let href = caps[1].trim().to_string();
            let label = self.tag.replace_all(&caps[2], "").trim().to_string();
            if !href.is_empty() && !label.is_empty() {
                format!("{label} ({href})")
            } else if !href.is_empty() {
                href
            } else {
                label
            }
        });

        let text = self.img.replace_all(&text, |caps: &Captures| {
            let tag = &caps[0];
            let src = self
                .img_src
                .captures(tag)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let alt = self
                .img_alt
                .captures(tag)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            if !alt.is_empty() {
                format!("[img: {alt} \u{2014} {src}]")
            } else {
                format!("[img: {src}]")
            }
        });

        let text = self.tag.replace_all(&text, "");

        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.excess_newlines.replace_all(&text, "\n\n");
        let text = self.excess_spaces.replace_all(&text, " ");
        text.trim().to_string()
    }
}

fn renderer() -> &'static TextRenderer {
    static RENDERER: OnceLock<TextRenderer> = OnceLock::new();
    RENDERER.get_or_init(TextRenderer::new)
}

/// Render canonical HTML to plaintext.
pub fn html_to_text(html: &str) -> String {
    renderer().render(html)
}
