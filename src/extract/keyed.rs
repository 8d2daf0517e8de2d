//! Interpretation of the `POST /` upload response.
//!
//! The form endpoint answers in whichever shape the server felt like: a JSON
//! prediction, the HTML result page (possibly reached through a redirect
//! carrying `res`/`conf` query parameters), or a loose `res=...` /
//! `"res":"..."` body.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use tracing::debug;

use super::rules::parse_confidence;
use super::{extract_prediction, ExtractError};
use crate::schema::{PredictResponse, PredictionResult};

const LABEL_KEYS: &[&str] = &["res", "label"];
const CONFIDENCE_KEYS: &[&str] = &["conf", "confidence"];

/// `key=value` and `"key":"value"` matchers for one key.
struct KeyPatterns {
    pair: Regex,
    quoted: Regex,
}

impl KeyPatterns {
    fn new(key: &str) -> Self {
        let key = regex::escape(key);
        Self {
            pair: Regex::new(&format!(r#"(?:^|[?&\s"'])(?:{key})=([^&"<\s]+)"#)).unwrap(),
            quoted: Regex::new(&format!(r#""{key}"\s*:\s*"([^"]*)""#)).unwrap(),
        }
    }

    fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        [&self.pair, &self.quoted]
            .into_iter()
            .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))
            .map(|m| m.as_str())
    }
}

static LABEL_PATTERNS: LazyLock<Vec<KeyPatterns>> =
    LazyLock::new(|| LABEL_KEYS.iter().map(|k| KeyPatterns::new(k)).collect());
static CONFIDENCE_PATTERNS: LazyLock<Vec<KeyPatterns>> =
    LazyLock::new(|| CONFIDENCE_KEYS.iter().map(|k| KeyPatterns::new(k)).collect());

/// Turn a `POST /` response into a prediction.
///
/// A JSON body with a label wins outright. Otherwise the body goes through
/// the HTML extraction, and query parameters of the final (post-redirect) URL
/// only fill the label or confidence the page left empty. When the page
/// yields nothing, the query alone, then keyed values anywhere in the body,
/// are tried.
pub fn interpret_upload_response(
    body: &str,
    final_url: &Url,
    base: &Url,
) -> Result<PredictionResult, ExtractError> {
    if let Ok(resp) = serde_json::from_str::<PredictResponse>(body) {
        if !resp.label.trim().is_empty() {
            debug!("Upload response is JSON");
            return Ok(resp.into());
        }
        debug!("Upload response is JSON without a label");
    }

    let query = from_query(final_url);
    match extract_prediction(body, base) {
        Ok(mut result) => {
            if let Some(query) = query {
                fill_gaps(&mut result, query);
            }
            Ok(result)
        }
        Err(err) => query
            .inspect(|_| debug!("Upload response redirected to {}", final_url))
            .or_else(|| from_keyed_body(body))
            .ok_or(err),
    }
}

fn fill_gaps(result: &mut PredictionResult, extra: PredictionResult) {
    if result.label.is_empty() {
        result.label = extra.label;
    }
    if result.confidence == 0.0 {
        result.confidence = extra.confidence;
    }
}

fn from_query(url: &Url) -> Option<PredictionResult> {
    let lookup = |keys: &[&str]| {
        url.query_pairs()
            .find(|(k, _)| keys.contains(&k.as_ref()))
            .map(|(_, v)| v.trim().to_string())
    };

    let label = lookup(LABEL_KEYS).filter(|l| !l.is_empty())?;
    let confidence = lookup(CONFIDENCE_KEYS)
        .map(|c| parse_confidence(&c))
        .unwrap_or(0.0);

    Some(PredictionResult {
        label,
        confidence,
        image_url: None,
    })
}

fn from_keyed_body(body: &str) -> Option<PredictionResult> {
    let label = keyed_value(body, &LABEL_PATTERNS).filter(|l| !l.is_empty())?;
    let confidence = keyed_value(body, &CONFIDENCE_PATTERNS)
        .map(|c| parse_confidence(&c))
        .unwrap_or(0.0);

    Some(PredictionResult {
        label,
        confidence,
        image_url: None,
    })
}

/// First value found for the earliest key in `patterns` that matches.
fn keyed_value(text: &str, patterns: &[KeyPatterns]) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.find(text))
        .map(|v| v.trim().to_string())
}
