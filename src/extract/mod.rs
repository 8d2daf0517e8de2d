//! Prediction extraction from the server's HTML result page.
//!
//! Pure functions, no I/O. The page is scanned by an ordered pipeline of
//! stages; each stage runs a rule set from [`rules`] against either the raw
//! body or its normalized form, and every rule only fills a field that is
//! still empty. A field found early is never overwritten by a looser rule.

mod keyed;
mod normalize;
mod rules;

pub use keyed::interpret_upload_response;
pub use normalize::normalize;

use reqwest::Url;
use tracing::debug;

use crate::schema::PredictionResult;
use rules::{parse_confidence, resolve_image_url, Field, Rule, BLOCK_RULES, DOCUMENT_RULES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Neither a label nor an image could be found anywhere in the page.
    #[error("could not parse server response")]
    Unparseable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Raw,
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Always,
    /// Only when neither label nor image has been found yet.
    NoPrimarySignal,
}

struct Stage {
    name: &'static str,
    source: Source,
    rules: &'static [Rule],
    gate: Gate,
}

const PIPELINE: &[Stage] = &[
    Stage {
        name: "raw-blocks",
        source: Source::Raw,
        rules: BLOCK_RULES,
        gate: Gate::Always,
    },
    Stage {
        name: "normalized-blocks",
        source: Source::Normalized,
        rules: BLOCK_RULES,
        gate: Gate::NoPrimarySignal,
    },
    Stage {
        name: "normalized-document",
        source: Source::Normalized,
        rules: DOCUMENT_RULES,
        gate: Gate::Always,
    },
];

/// Fields gathered during one extraction. Empty label, 0.0 confidence and a
/// missing image all count as gaps.
#[derive(Debug, Default)]
struct ExtractedFields {
    label: String,
    confidence: f64,
    image_url: Option<String>,
}

impl ExtractedFields {
    fn is_gap(&self, field: Field) -> bool {
        match field {
            Field::Label => self.label.is_empty(),
            Field::Confidence => self.confidence == 0.0,
            Field::Image => self.image_url.is_none(),
        }
    }

    fn is_complete(&self) -> bool {
        !(self.is_gap(Field::Label) || self.is_gap(Field::Confidence) || self.is_gap(Field::Image))
    }

    fn has_primary_signal(&self) -> bool {
        !self.label.is_empty() || self.image_url.is_some()
    }

    fn fill(&mut self, field: Field, raw: &str, base: &Url) {
        match field {
            Field::Label => self.label = raw.trim().to_string(),
            Field::Confidence => self.confidence = parse_confidence(raw),
            Field::Image => self.image_url = Some(resolve_image_url(base, raw)),
        }
    }

    fn into_result(self) -> Result<PredictionResult, ExtractError> {
        if !self.has_primary_signal() {
            return Err(ExtractError::Unparseable);
        }
        Ok(PredictionResult {
            label: self.label,
            confidence: self.confidence,
            image_url: self.image_url,
        })
    }
}

/// Extract label, confidence and preview image URL from an HTML result page.
///
/// Relative image paths are resolved against `base`. Fails only when neither
/// a label nor an image turns up; a missing confidence is reported as 0.0.
pub fn extract_prediction(raw: &str, base: &Url) -> Result<PredictionResult, ExtractError> {
    let (fields, stages) = run_pipeline(raw, base);
    debug!(
        "Parsed HTML response via {:?}: label={:?}, confidence={}, image={:?}",
        stages, fields.label, fields.confidence, fields.image_url
    );
    fields.into_result()
}

/// Run the stages in order; also returns the names of the stages that ran.
fn run_pipeline(raw: &str, base: &Url) -> (ExtractedFields, Vec<&'static str>) {
    let normalized = normalize(raw);
    let mut fields = ExtractedFields::default();
    let mut ran = Vec::with_capacity(PIPELINE.len());

    for stage in PIPELINE {
        if fields.is_complete() {
            break;
        }
        if stage.gate == Gate::NoPrimarySignal && fields.has_primary_signal() {
            continue;
        }

        let text = match stage.source {
            Source::Raw => raw,
            Source::Normalized => normalized.as_str(),
        };
        ran.push(stage.name);

        for rule in stage.rules {
            if !fields.is_gap(rule.field) {
                continue;
            }
            if let Some(value) = rule.capture(text) {
                fields.fill(rule.field, value, base);
                debug!("Stage {}: rule {} matched {:?}", stage.name, rule.name, value);
            }
        }
    }

    (fields, ran)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://chess.example.com").unwrap()
    }

    const WELL_FORMED: &str = r#"<html><body>
<div class="result">Tahmin: Queen</div>
<div class="confidence">Güven: %87.50</div>
<div class="preview"><img src="/static/uploads/x.jpg"></div>
</body></html>"#;

    #[test]
    fn test_well_formed_page() {
        let result = extract_prediction(WELL_FORMED, &base()).unwrap();
        assert_eq!(result.label, "Queen");
        assert_eq!(result.confidence, 87.50);
        assert_eq!(
            result.image_url.as_deref(),
            Some("https://chess.example.com/static/uploads/x.jpg")
        );
    }

    #[test]
    fn test_comma_decimal_separator() {
        let html = WELL_FORMED.replace("%87.50", "%87,50");
        let result = extract_prediction(&html, &base()).unwrap();
        assert_eq!(result.confidence, 87.50);
    }

    #[test]
    fn test_absolute_image_preserved() {
        let html = WELL_FORMED.replace(
            "/static/uploads/x.jpg",
            "http://cdn.example.org/pieces/x.jpg",
        );
        let result = extract_prediction(&html, &base()).unwrap();
        assert_eq!(
            result.image_url.as_deref(),
            Some("http://cdn.example.org/pieces/x.jpg")
        );
    }

    #[test]
    fn test_relative_image_gets_leading_slash() {
        let html = WELL_FORMED.replace("/static/uploads/x.jpg", "static/uploads/x.jpg");
        let result = extract_prediction(&html, &base()).unwrap();
        assert_eq!(
            result.image_url.as_deref(),
            Some("https://chess.example.com/static/uploads/x.jpg")
        );
    }

    #[test]
    fn test_label_found_outside_result_block() {
        let html = "<html><body><h2>Tahmin: King</h2>\n<p>Güven: %55</p></body></html>";
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(result.label, "King");
        assert_eq!(result.confidence, 55.0);
        assert_eq!(result.image_url, None);
    }

    #[test]
    fn test_no_signal_is_parse_error() {
        let html = "<html><body><h1>Satranç Taşı Tanıma</h1><form></form></body></html>";
        assert_eq!(
            extract_prediction(html, &base()),
            Err(ExtractError::Unparseable)
        );
    }

    #[test]
    fn test_confidence_alone_is_not_enough() {
        let html = r#"<div class="confidence">Güven: %40</div>"#;
        assert_eq!(
            extract_prediction(html, &base()),
            Err(ExtractError::Unparseable)
        );
    }

    #[test]
    fn test_block_label_wins_over_bare_label() {
        let html = r#"<p>Tahmin: Rook</p><div class="result">Tahmin: Pawn</div>"#;
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(result.label, "Pawn");
    }

    #[test]
    fn test_image_only_page_succeeds() {
        let html = r#"<div class="preview"><img src="/static/uploads/only.jpg"></div>"#;
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(result.label, "");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            result.image_url.as_deref(),
            Some("https://chess.example.com/static/uploads/only.jpg")
        );
    }

    #[test]
    fn test_document_image_fallbacks() {
        let html = r#"<p>Tahmin: Bishop</p><img src="/static/logo.png">"#;
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(
            result.image_url.as_deref(),
            Some("https://chess.example.com/static/logo.png")
        );

        let html = r#"<img src="/static/logo.png"><img src="/static/uploads/u.jpg">"#;
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(
            result.image_url.as_deref(),
            Some("https://chess.example.com/static/uploads/u.jpg")
        );
    }

    #[test]
    fn test_crlf_and_tab_markup() {
        let html = "<div class=\"result\">\r\n\tTahmin:\tKnight\r\n</div>\r\n<div class=\"confidence\">\r\n\tGüven: %70,25\r\n</div>";
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(result.label, "Knight");
        assert_eq!(result.confidence, 70.25);
    }

    #[test]
    fn test_result_block_without_label_falls_through() {
        let html = "<div class=\"result\">Sonuç yok</div>\n<span>Tahmin: Queen</span>";
        let result = extract_prediction(html, &base()).unwrap();
        assert_eq!(result.label, "Queen");
    }

    #[test]
    fn test_complete_raw_pass_stops_pipeline() {
        let (fields, stages) = run_pipeline(WELL_FORMED, &base());
        assert!(fields.is_complete());
        assert_eq!(stages, vec!["raw-blocks"]);
    }

    #[test]
    fn test_normalized_blocks_skipped_after_primary_signal() {
        let html = "<div class=\"result\">Tahmin: Pawn</div>\n<p>Güven: %40</p>";
        let (fields, stages) = run_pipeline(html, &base());
        assert_eq!(stages, vec!["raw-blocks", "normalized-document"]);
        assert_eq!(fields.label, "Pawn");
        assert_eq!(fields.confidence, 40.0);

        let html = r#"<div class="preview"><img src="/static/uploads/a.jpg"></div>"#;
        let (_, stages) = run_pipeline(html, &base());
        assert_eq!(stages, vec!["raw-blocks", "normalized-document"]);
    }

    #[test]
    fn test_all_stages_run_without_block_signal() {
        let html = "<h2>Tahmin: King</h2>";
        let (fields, stages) = run_pipeline(html, &base());
        assert_eq!(
            stages,
            vec!["raw-blocks", "normalized-blocks", "normalized-document"]
        );
        assert_eq!(fields.label, "King");
    }
}
