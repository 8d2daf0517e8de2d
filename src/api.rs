//! HTTP client for the chess-piece classification service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::charts::Chart;
use crate::error::ApiError;
use crate::extract;
use crate::schema::{PredictResponse, PredictionResult, ProgressResponse};
use crate::training::ProgressSource;

const UPLOAD_FIELD: &str = "image";
const UPLOAD_FILENAME: &str = "photo.jpg";
const UPLOAD_MIME: &str = "image/jpeg";

/// Client for the remote training and inference endpoints.
///
/// Requests carry no timeout; a hung server holds the call open.
#[derive(Clone)]
pub struct ChessApiClient {
    client: Client,
    base: Url,
}

impl ChessApiClient {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }

    /// `GET /progress`.
    pub async fn fetch_progress(&self) -> Result<ProgressResponse, ApiError> {
        let url = self.endpoint("/progress");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        let response = ensure_success(response)?;
        decode_json(response).await
    }

    /// `POST /train` with a form-encoded `epochs` field.
    pub async fn start_training(&self, epochs: u32) -> Result<(), ApiError> {
        let url = self.endpoint("/train");
        info!("Starting training: {} epochs", epochs);

        let response = self
            .client
            .post(url.clone())
            .form(&[("epochs", epochs)])
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        ensure_success(response)?;
        Ok(())
    }

    /// `POST /predict` with the photo as multipart, answered with JSON.
    pub async fn predict(&self, image: Vec<u8>) -> Result<PredictionResult, ApiError> {
        let url = self.endpoint("/predict");
        info!("Uploading {} bytes to {}", image.len(), url);

        let response = self.upload(url, image).await?;
        let response = ensure_success(response)?;
        let prediction: PredictResponse = decode_json(response).await?;
        Ok(prediction.into())
    }

    /// `POST /` with the photo as multipart; the answer may be JSON, a
    /// redirect with query parameters, or the HTML result page.
    pub async fn upload_form(&self, image: Vec<u8>) -> Result<PredictionResult, ApiError> {
        let url = self.endpoint("/");
        info!("Uploading {} bytes to {}", image.len(), url);

        let response = self.upload(url, image).await?;
        info!("Upload status: {}", response.status());
        let response = ensure_success(response)?;
        let final_url = response.url().clone();
        debug!("Upload final URL: {}", final_url);

        let body = read_text(response).await?;
        Ok(extract::interpret_upload_response(&body, &final_url, &self.base)?)
    }

    /// Submit the photo with `POST /`, then read the result page with `GET /`.
    ///
    /// The POST's status is only logged; the GET must answer exactly 200.
    pub async fn post_then_get(&self, image: Vec<u8>) -> Result<PredictionResult, ApiError> {
        let url = self.endpoint("/");
        info!("Uploading {} bytes to {} before fetching the result page", image.len(), url);

        let posted = self.upload(url.clone(), image).await?;
        info!("Upload status: {}", posted.status());

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        if response.status() != StatusCode::OK {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let html = read_text(response).await?;
        debug!("Result page snippet: {}", snippet(&html, 500));
        Ok(extract::extract_prediction(&html, &self.base)?)
    }

    /// Download one of the server's training charts.
    pub async fn fetch_chart(&self, chart: Chart) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint(chart.path());
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        let response = ensure_success(response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        debug!("Fetched {} ({} bytes)", chart.path(), bytes.len());
        Ok(bytes.to_vec())
    }

    async fn upload(&self, url: Url, image: Vec<u8>) -> Result<Response, ApiError> {
        let part = Part::bytes(image)
            .file_name(UPLOAD_FILENAME)
            .mime_str(UPLOAD_MIME)
            .map_err(|e| ApiError::transport(url.as_str(), e))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        self.client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))
    }
}

#[async_trait]
impl ProgressSource for ChessApiClient {
    async fn fetch_progress(&self) -> Result<ProgressResponse, ApiError> {
        ChessApiClient::fetch_progress(self).await
    }
}

fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            url: response.url().to_string(),
            status,
        });
    }
    Ok(response)
}

async fn read_text(response: Response) -> Result<String, ApiError> {
    let url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::transport(url.as_str(), e))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ApiError::Encoding { url })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let url = response.url().to_string();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::transport(url.as_str(), e))?;
    serde_json::from_slice(&body).map_err(|source| ApiError::Decode { url, source })
}

fn snippet(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
