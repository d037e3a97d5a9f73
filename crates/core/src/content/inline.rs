//! Inline image extraction and placeholder rewriting.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::ContentError;

/// Prefix identifying an inline-encoded image source.
pub const INLINE_IMAGE_PREFIX: &str = "data:image";

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("static selector is valid"));

/// An image embedded in content as a base64 data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// The full `src` value; used as the placeholder to replace later.
    pub src: String,
    /// MIME type declared by the data URI (e.g. `image/png`).
    pub mime_type: String,
    /// File extension derived from the MIME subtype.
    pub extension: String,
    /// Base64 payload after the comma.
    pub data: String,
}

impl InlineImage {
    /// Parse a `data:image/<subtype>;base64,<payload>` source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a base64 image data URI.
    pub fn parse(src: &str) -> Result<Self, ContentError> {
        let rest = src
            .strip_prefix("data:")
            .ok_or_else(|| ContentError::malformed("missing data: scheme"))?;

        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| ContentError::malformed("missing payload separator"))?;

        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| ContentError::malformed("payload is not base64 encoded"))?
            .trim()
            .to_ascii_lowercase();

        let subtype = mime_type
            .strip_prefix("image/")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContentError::malformed(format!("unsupported MIME type '{mime_type}'")))?;

        if data.is_empty() {
            return Err(ContentError::malformed("empty payload"));
        }

        Ok(Self {
            src: src.to_string(),
            extension: extension_for(subtype),
            mime_type,
            data: data.to_string(),
        })
    }

    /// Size of the payload once base64-decoded, in bytes.
    #[must_use]
    pub fn decoded_len(&self) -> u64 {
        let trimmed = self.data.trim_end_matches('=');
        (trimmed.len() as u64 * 3) / 4
    }
}

/// An `<img>` source found in content, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline payload awaiting upload.
    Inline(InlineImage),
    /// Reference to an already uploaded (or external) URL.
    Remote(String),
}

/// Collect every `<img src>` in document order.
///
/// # Errors
///
/// Returns an error if an inline source is malformed.
pub fn extract_images(html: &str) -> Result<Vec<ImageSource>, ContentError> {
    let fragment = Html::parse_fragment(html);

    fragment
        .select(&IMG_SELECTOR)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| {
            if src.starts_with(INLINE_IMAGE_PREFIX) {
                InlineImage::parse(src).map(ImageSource::Inline)
            } else {
                Ok(ImageSource::Remote(src.to_string()))
            }
        })
        .collect()
}

/// Replace `placeholder` with `url` wherever it is the quoted `src` value of
/// an `<img>` tag.
///
/// Matches elsewhere (link targets, text, other attributes) are left as is.
/// Returns the rewritten content and the number of replacements made.
#[must_use]
pub fn replace_placeholder(content: &str, placeholder: &str, url: &str) -> (String, usize) {
    if placeholder.is_empty() {
        return (content.to_string(), 0);
    }

    let mut rewritten = String::with_capacity(content.len());
    let mut count = 0;
    let mut rest = content;
    while let Some(at) = rest.find(placeholder) {
        let (before, matched) = rest.split_at(at);
        let after = &matched[placeholder.len()..];
        rewritten.push_str(before);
        if is_img_src_value(&rewritten, after) {
            rewritten.push_str(url);
            count += 1;
        } else {
            rewritten.push_str(placeholder);
        }
        rest = after;
    }
    rewritten.push_str(rest);
    (rewritten, count)
}

/// Whether a match between `before` and `after` is a whole quoted `src`
/// attribute value inside an open `<img` tag.
fn is_img_src_value(before: &str, after: &str) -> bool {
    let Some(quote) = before.chars().next_back().filter(|c| matches!(c, '"' | '\'')) else {
        return false;
    };
    if !after.starts_with(quote) {
        return false;
    }

    let Some(name) = before[..before.len() - 1].trim_end().strip_suffix('=') else {
        return false;
    };
    let name = name.trim_end();
    let Some(head) = name
        .len()
        .checked_sub(3)
        .and_then(|split| name.get(..split).zip(name.get(split..)))
        .filter(|(_, attr)| attr.eq_ignore_ascii_case("src"))
        .map(|(head, _)| head)
    else {
        return false;
    };
    if !head.ends_with(|c: char| c.is_ascii_whitespace()) {
        return false;
    }

    head.rfind('<').is_some_and(|open| {
        let tag = &head[open + 1..];
        !tag.contains('>')
            && tag.get(..3).is_some_and(|n| n.eq_ignore_ascii_case("img"))
            && tag[3..].starts_with(|c: char| c.is_ascii_whitespace())
    })
}

fn extension_for(subtype: &str) -> String {
    let base = subtype.split('+').next().unwrap_or(subtype);
    match base {
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        other => other.to_string(),
    }
}
