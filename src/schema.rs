//! Wire and result types for the classification service.

use serde::{Deserialize, Serialize};

/// Body of `GET /progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub current: i64,
    pub total: i64,
    pub running: bool,
    pub trained: bool,
    pub run_id: i64,
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub label: String,
    pub confidence: f64,
}

/// Final outcome of one inference call, whatever shape the server answered in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    /// Percentage; 0.0 when the server stated none.
    pub confidence: f64,
    /// Absolute URL of the image the server echoed back, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<PredictResponse> for PredictionResult {
    fn from(resp: PredictResponse) -> Self {
        Self {
            label: resp.label,
            confidence: resp.confidence,
            image_url: None,
        }
    }
}
