//! Summary and image extraction for post HTML.

use crate::models::Post;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[^>]*>").unwrap());

static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b.*?/?>").unwrap());

static SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// A post together with its plain-text summary and embedded image URLs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: Post,
    pub summary: String,
    pub images: Vec<String>,
}

impl From<Post> for EnrichedPost {
    fn from(post: Post) -> Self {
        let summary = summarize(&post.content);
        let images = extract_images(&post.content);
        Self {
            post,
            summary,
            images,
        }
    }
}

/// Strips every `<...>` tag. Entities are left encoded.
///
/// Unbalanced brackets left behind by broken markup are dropped too, so the
/// summary never carries `<` or `>`.
pub fn summarize(html: &str) -> String {
    TAG_RE
        .replace_all(html, "")
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}

/// `src` values of every `<img>` tag, in document order.
///
/// Tags without a `src` attribute are skipped; content without images yields
/// an empty list.
pub fn extract_images(html: &str) -> Vec<String> {
    IMG_RE
        .find_iter(html)
        .filter_map(|tag| image_src(tag.as_str()))
        .collect()
}

fn image_src(tag: &str) -> Option<String> {
    let caps = SRC_RE.captures(tag)?;
    if let Some(quoted) = caps.get(1).or_else(|| caps.get(2)) {
        return Some(quoted.as_str().to_string());
    }
    // unquoted values swallow the `/` of a self-closing `/>`
    caps.get(3)
        .map(|bare| bare.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(content: &str) -> Post {
        Post {
            id: 1,
            title: "t".into(),
            content: content.into(),
            like: 0,
            like_ids: vec![],
            watch: 0,
            city: None,
            city_name: None,
            account: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn summary_drops_tags() {
        assert_eq!(
            summarize("<p>Hello <b>world</b></p><br/>"),
            "Hello world"
        );
        assert_eq!(summarize("<div\nclass=\"x\">multi\nline</div>"), "multi\nline");
    }

    #[test]
    fn summary_keeps_entities() {
        assert_eq!(summarize("<p>a &amp; b</p>"), "a &amp; b");
    }

    #[test]
    fn summary_never_has_angle_brackets() {
        for html in ["1 < 2", "a > b", "<p>x <", "<<>>", "<img src='a.png'"] {
            let summary = summarize(html);
            assert!(!summary.contains('<') && !summary.contains('>'), "{:?}", summary);
        }
    }

    #[test]
    fn images_in_document_order() {
        let html = r#"<p>one</p><img src="a.jpg"><p>two</p><IMG alt='x' SRC='b.png' /><img src=c.gif>"#;
        assert_eq!(extract_images(html), vec!["a.jpg", "b.png", "c.gif"]);
    }

    #[test]
    fn unquoted_src_in_self_closing_tag() {
        assert_eq!(
            extract_images("<img src=http://cdn/x.png/>"),
            vec!["http://cdn/x.png"]
        );
    }

    #[test]
    fn no_images_is_empty() {
        assert!(extract_images("<p>plain text</p>").is_empty());
        assert!(extract_images("").is_empty());
    }

    #[test]
    fn img_without_src_is_skipped() {
        assert_eq!(
            extract_images(r#"<img alt="none"><img src="y.jpg">"#),
            vec!["y.jpg"]
        );
    }

    #[test]
    fn data_src_is_not_src() {
        assert_eq!(
            extract_images(r#"<img data-src="lazy.jpg" src="real.jpg">"#),
            vec!["real.jpg"]
        );
    }

    #[test]
    fn first_src_wins() {
        assert_eq!(
            extract_images(r#"<img src="first.jpg" data-src="lazy.jpg">"#),
            vec!["first.jpg"]
        );
    }

    #[test]
    fn enriched_post_flattens_fields() {
        let enriched = EnrichedPost::from(post(r#"<p>hi</p><img src="a.jpg">"#));
        assert_eq!(enriched.summary, "hi");
        assert_eq!(enriched.images, vec!["a.jpg"]);

        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["summary"], "hi");
        assert_eq!(value["images"][0], "a.jpg");
    }
}
