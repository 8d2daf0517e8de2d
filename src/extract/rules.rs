//! Ordered pattern table for pulling prediction fields out of the result page.
//!
//! The page marks its sections with `<div class="result">`, `<div class="confidence">`
//! and `<div class="preview">`, carrying `Tahmin: <label>`, `Güven: %<value>` and an
//! `<img src="...">`. Each [`Rule`] names one (scope, pattern, field) triple so the
//! table can be audited and tested rule by rule.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

static RESULT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<div\s+class="result">(.*?)</div>"#).unwrap());
static CONFIDENCE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<div\s+class="confidence">(.*?)</div>"#).unwrap());
static PREVIEW_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<div\s+class="preview">(.*?)</div>"#).unwrap());

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Tahmin\s*:\s*([^<]+)").unwrap());
static LABEL_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Tahmin\s*:\s*([^<\n]+)").unwrap());
static CONFIDENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Güven\s*:\s*%?([0-9]+(?:[.,][0-9]+)?)").unwrap());
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<img[^>]*src="([^"]+)""#).unwrap());
static UPLOAD_IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<img[^>]*src="(/static/uploads/[^"]+)""#).unwrap());
static STATIC_IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<img[^>]*src="(/static/[^"]+)""#).unwrap());

/// Named section of the result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Result,
    Confidence,
    Preview,
}

impl BlockKind {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Result => &RESULT_BLOCK_RE,
            Self::Confidence => &CONFIDENCE_BLOCK_RE,
            Self::Preview => &PREVIEW_BLOCK_RE,
        }
    }
}

/// Field of a prediction a rule contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Label,
    Confidence,
    Image,
}

/// Where a rule looks: inside one block, or anywhere in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Block(BlockKind),
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// `Tahmin:` up to the next tag.
    Label,
    /// `Tahmin:` up to the next tag or line break.
    LabelLine,
    /// `Güven:` followed by an optional `%` and a `.` or `,` decimal.
    Confidence,
    /// Any `<img src>`.
    ImageSrc,
    /// `<img src>` under `/static/uploads/`.
    UploadImageSrc,
    /// `<img src>` under `/static/`.
    StaticImageSrc,
}

impl Pattern {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Label => &LABEL_RE,
            Self::LabelLine => &LABEL_LINE_RE,
            Self::Confidence => &CONFIDENCE_RE,
            Self::ImageSrc => &IMG_SRC_RE,
            Self::UploadImageSrc => &UPLOAD_IMG_SRC_RE,
            Self::StaticImageSrc => &STATIC_IMG_SRC_RE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    pub scope: Scope,
    pub field: Field,
    pub pattern: Pattern,
}

impl Rule {
    /// First capture of this rule's pattern within its scope of `text`.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let scoped = match self.scope {
            Scope::Block(kind) => find_block(text, kind)?,
            Scope::Document => text,
        };
        first_capture(self.pattern.regex(), scoped)
    }
}

/// Rules that only look inside the page's marked sections.
pub const BLOCK_RULES: &[Rule] = &[
    Rule {
        name: "result-block-label",
        scope: Scope::Block(BlockKind::Result),
        field: Field::Label,
        pattern: Pattern::Label,
    },
    Rule {
        name: "confidence-block-value",
        scope: Scope::Block(BlockKind::Confidence),
        field: Field::Confidence,
        pattern: Pattern::Confidence,
    },
    Rule {
        name: "preview-block-image",
        scope: Scope::Block(BlockKind::Preview),
        field: Field::Image,
        pattern: Pattern::ImageSrc,
    },
];

/// Page-wide rules, used to fill whatever the block rules left empty.
pub const DOCUMENT_RULES: &[Rule] = &[
    Rule {
        name: "document-label",
        scope: Scope::Document,
        field: Field::Label,
        pattern: Pattern::LabelLine,
    },
    Rule {
        name: "document-confidence",
        scope: Scope::Document,
        field: Field::Confidence,
        pattern: Pattern::Confidence,
    },
    Rule {
        name: "document-upload-image",
        scope: Scope::Document,
        field: Field::Image,
        pattern: Pattern::UploadImageSrc,
    },
    Rule {
        name: "document-static-image",
        scope: Scope::Document,
        field: Field::Image,
        pattern: Pattern::StaticImageSrc,
    },
];

/// Inner content of the first `kind` block in `text`.
pub fn find_block(text: &str, kind: BlockKind) -> Option<&str> {
    first_capture(kind.regex(), text)
}

fn first_capture<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse a confidence figure that may use `,` as its decimal separator.
/// Anything unparseable counts as 0.0.
pub fn parse_confidence(raw: &str) -> f64 {
    raw.trim().replace(',', ".").parse().unwrap_or(0.0)
}

/// Turn an `<img src>` value into an absolute URL on the server.
///
/// Values starting with `http` (any case) are kept verbatim. Anything else is
/// treated as a path on `base`, with a leading `/` added when missing.
pub fn resolve_image_url(base: &Url, src: &str) -> String {
    let is_absolute = src
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http"));
    if is_absolute {
        return src.to_string();
    }

    let (path, query) = match src.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (src, None),
    };
    let path: Cow<'_, str> = if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{}", path))
    };

    let mut url = base.clone();
    url.set_path(&path);
    url.set_query(query);
    url.set_fragment(None);
    url.to_string()
}
