//! Training diagnostic charts published by the server as static PNGs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::GenericImageView;
use tracing::info;

use crate::api::ChessApiClient;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chart {
    LearningCurve,
    ConfusionMatrix,
    RocCurve,
}

impl Chart {
    pub const ALL: [Chart; 3] = [Chart::LearningCurve, Chart::ConfusionMatrix, Chart::RocCurve];

    pub fn path(self) -> &'static str {
        match self {
            Self::LearningCurve => "/static/learning_curve.png",
            Self::ConfusionMatrix => "/static/confusion_matrix.png",
            Self::RocCurve => "/static/roc_curve.png",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::LearningCurve => "Learning Curve",
            Self::ConfusionMatrix => "Confusion Matrix",
            Self::RocCurve => "ROC Curve",
        }
    }

    pub fn file_name(self) -> &'static str {
        self.path().rsplit('/').next().unwrap_or_default()
    }
}

/// A chart written to disk.
#[derive(Debug, Clone)]
pub struct SavedChart {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Check that `bytes` decode as an image; returns its dimensions.
pub fn inspect(bytes: &[u8]) -> Result<(u32, u32), ApiError> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.dimensions())
}

/// Fetch every chart into `dir`. A chart that fails to download or decode
/// is reported and skipped; the others are still saved.
pub async fn download_all(
    client: &ChessApiClient,
    dir: &Path,
) -> Result<Vec<(Chart, Result<SavedChart, ApiError>)>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create chart directory: {:?}", dir))?;

    let mut results = Vec::with_capacity(Chart::ALL.len());
    for chart in Chart::ALL {
        let outcome = match fetch_checked(client, chart).await {
            Ok((bytes, (width, height))) => {
                let path = dir.join(chart.file_name());
                std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write chart: {:?}", path))?;
                info!("Saved {} ({}x{}) to {:?}", chart.title(), width, height, path);
                Ok(SavedChart {
                    path,
                    width,
                    height,
                })
            }
            Err(e) => Err(e),
        };
        results.push((chart, outcome));
    }
    Ok(results)
}

async fn fetch_checked(
    client: &ChessApiClient,
    chart: Chart,
) -> Result<(Vec<u8>, (u32, u32)), ApiError> {
    let bytes = client.fetch_chart(chart).await?;
    let dims = inspect(&bytes)?;
    Ok((bytes, dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 200, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_chart_paths() {
        assert_eq!(Chart::LearningCurve.file_name(), "learning_curve.png");
        assert_eq!(Chart::ConfusionMatrix.path(), "/static/confusion_matrix.png");
        assert_eq!(Chart::RocCurve.file_name(), "roc_curve.png");
    }

    #[test]
    fn test_inspect() {
        assert_eq!(inspect(&png(4, 3)).unwrap(), (4, 3));
        assert!(inspect(b"<html>not found</html>").is_err());
    }

    #[tokio::test]
    async fn test_download_all_skips_broken_chart() {
        let learning = png(8, 6);
        let roc = png(5, 5);
        let app = Router::new()
            .route(
                "/static/learning_curve.png",
                get(move || {
                    let body = learning.clone();
                    async move { body }
                }),
            )
            .route(
                "/static/confusion_matrix.png",
                get(|| async { "<html>missing</html>" }),
            )
            .route(
                "/static/roc_curve.png",
                get(move || {
                    let body = roc.clone();
                    async move { body }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = ChessApiClient::new(reqwest::Url::parse(&format!("http://{}", addr)).unwrap());

        let dir = tempfile::tempdir().unwrap();
        let results = download_all(&client, dir.path()).await.unwrap();
        assert_eq!(results.len(), 3);

        let (chart, saved) = &results[0];
        assert_eq!(*chart, Chart::LearningCurve);
        let saved = saved.as_ref().unwrap();
        assert_eq!((saved.width, saved.height), (8, 6));
        assert!(saved.path.exists());

        assert!(matches!(results[1].1, Err(ApiError::Image(_))));
        assert!(!dir.path().join("confusion_matrix.png").exists());
        assert!(results[2].1.is_ok());
    }
}
