//! Chess Piece Client - command-line front-end for a remote chess-piece
//! classification service (training, progress, inference, charts).

mod api;
mod charts;
mod config;
mod error;
mod extract;
mod photo;
mod schema;
mod training;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use api::ChessApiClient;
use clap::{Parser, Subcommand, ValueEnum};
use config::ClientConfig;
use error::{ApiError, ErrorKind};
use schema::PredictionResult;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use training::{PollOutcome, ProgressSnapshot, TrainingStatus};

#[derive(Parser)]
#[command(
    name = "chess-piece-client",
    about = "Train and query a remote chess-piece image classifier"
)]
struct Cli {
    /// JSON config file (defaults, then this file, then CHESS_* env vars)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current training progress once
    Progress,
    /// Start training and follow its progress
    Train {
        /// Number of epochs (1-50, default from config)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=50))]
        epochs: Option<u32>,
        /// Return right after the server accepts the request
        #[arg(long)]
        no_wait: bool,
    },
    /// Follow an already running training until it completes
    Watch,
    /// Upload a photo and print the predicted piece
    Predict {
        /// Photo to classify (non-JPEG input is re-encoded)
        image: PathBuf,
        /// Which endpoint to use
        #[arg(long, value_enum, default_value_t = Via::Json)]
        via: Via,
    },
    /// Download the training charts
    Charts {
        /// Output directory
        #[arg(short, long, default_value = "charts")]
        out: PathBuf,
    },
    /// Parse a saved HTML result page offline
    Extract {
        /// HTML file as returned by the server
        html: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Via {
    /// `POST /predict`, JSON answer
    Json,
    /// `POST /`, HTML or redirect answer
    Form,
    /// `POST /` then `GET /` for the result page
    PostGet,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chess_piece_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)?
            .with_env_overrides(|key| std::env::var(key).ok())?,
        None => ClientConfig::from_env()?,
    };
    if let Some(url) = cli.base_url.clone() {
        config.base_url = url;
    }
    let base = config.validate()?;
    info!("Using service at {}", base);

    let client = ChessApiClient::new(base);

    match cli.command {
        Commands::Progress => {
            let progress = explain(client.fetch_progress().await, "Could not fetch progress")?;
            let snapshot = ProgressSnapshot::from(&progress);
            print_snapshot(&snapshot, cli.json)?;
        }
        Commands::Train { epochs, no_wait } => {
            let epochs = epochs.unwrap_or(config.default_epochs);
            explain(
                client.start_training(epochs).await,
                "Training could not be started",
            )?;
            println!("Training started ({} epochs)", epochs);
            if !no_wait {
                watch(&client, &config, cli.json).await?;
            }
        }
        Commands::Watch => watch(&client, &config, cli.json).await?,
        Commands::Predict { image, via } => {
            let photo = read_photo(&image)?;
            let result = match via {
                Via::Json => client.predict(photo).await,
                Via::Form => client.upload_form(photo).await,
                Via::PostGet => client.post_then_get(photo).await,
            };
            let result = explain(result, "Prediction failed")?;
            print_prediction(&result, cli.json)?;
        }
        Commands::Charts { out } => {
            let results = charts::download_all(&client, &out).await?;
            let mut failed = 0;
            for (chart, outcome) in results {
                match outcome {
                    Ok(saved) => println!(
                        "{}: {} ({}x{})",
                        chart.title(),
                        saved.path.display(),
                        saved.width,
                        saved.height
                    ),
                    Err(e) => {
                        failed += 1;
                        error!("{} unavailable: {}", chart.title(), e);
                        println!("{}: could not load ({})", chart.title(), kind_hint(e.kind()));
                    }
                }
            }
            if failed == charts::Chart::ALL.len() {
                anyhow::bail!("No chart could be downloaded");
            }
        }
        Commands::Extract { html } => {
            let page = std::fs::read_to_string(&html)
                .with_context(|| format!("Failed to read HTML file: {:?}", html))?;
            let result = extract::extract_prediction(&page, client.base())
                .map_err(ApiError::from);
            let result = explain(result, "Could not read the page")?;
            print_prediction(&result, cli.json)?;
        }
    }

    Ok(())
}

/// Follow training progress until completion or Ctrl-C.
async fn watch(client: &ChessApiClient, config: &ClientConfig, json: bool) -> anyhow::Result<()> {
    let polling = Arc::new(AtomicBool::new(true));
    {
        let polling = polling.clone();
        tokio::spawn(async move {
            if wait_for_interrupts(&polling, tokio::signal::ctrl_c).await {
                warn!("Second Ctrl-C received, exiting");
                std::process::exit(130);
            }
        });
    }

    let mut print_error = None;
    let outcome = training::poll_until_trained(client, config.poll, &polling, |snapshot| {
        if print_error.is_none() {
            if let Err(e) = print_snapshot(snapshot, json) {
                print_error = Some(e);
            }
        }
    })
    .await;
    if let Some(e) = print_error {
        return Err(e);
    }

    match outcome {
        PollOutcome::Completed { run_id } => println!("Training completed (run {})", run_id),
        PollOutcome::Cancelled => println!("Stopped following training"),
    }
    Ok(())
}

/// The first interrupt clears `polling`; returns true once a second one
/// arrives, since a hung request would otherwise never see the flag.
async fn wait_for_interrupts<F, Fut>(polling: &AtomicBool, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    info!("Ctrl-C received, stopping after the current poll (press again to quit)");
    polling.store(false, Ordering::SeqCst);
    interrupt().await.is_ok()
}

/// Read a photo from disk and make it upload-ready.
fn read_photo(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read photo: {:?}", path))?;
    explain(photo::to_jpeg(bytes), "Unusable photo")
}

/// Attach a kind-specific, user-facing message to an API failure.
fn explain<T>(result: Result<T, ApiError>, action: &str) -> anyhow::Result<T> {
    result.map_err(|e| {
        let hint = kind_hint(e.kind());
        anyhow::Error::new(e).context(format!("{}: {}", action, hint))
    })
}

fn kind_hint(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Transport => "the server could not be reached or refused the request",
        ErrorKind::Decode => "the server sent a response in an unexpected format",
        ErrorKind::Parse => "no prediction could be read from the server's page",
        ErrorKind::Image => "the image could not be decoded",
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", render_progress(snapshot));
    }
    Ok(())
}

fn print_prediction(result: &PredictionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!("Prediction: {}", result.label);
    println!("Confidence: {:.2}%", result.confidence);
    if let Some(url) = &result.image_url {
        println!("Server image: {}", url);
    }
    Ok(())
}

/// One-line progress display: bar, epochs and status.
fn render_progress(snapshot: &ProgressSnapshot) -> String {
    const WIDTH: usize = 20;
    let filled = (snapshot.fraction * WIDTH as f64).round() as usize;
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(WIDTH - filled));

    let status = match snapshot.status {
        TrainingStatus::Running => "training in progress",
        TrainingStatus::Completed => "training complete",
        TrainingStatus::Idle => "idle",
    };

    match snapshot.epoch_line() {
        Some(epochs) => format!(
            "[{}] {:>3.0}%  {}  {}",
            bar,
            snapshot.fraction * 100.0,
            epochs,
            status
        ),
        None => format!("[{}]  {}", bar, status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn snapshot(current: i64, total: i64, running: bool, trained: bool) -> ProgressSnapshot {
        ProgressSnapshot::from(&schema::ProgressResponse {
            current,
            total,
            running,
            trained,
            run_id: 1,
        })
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_epochs_range_enforced() {
        assert!(Cli::try_parse_from(["chess-piece-client", "train", "--epochs", "51"]).is_err());
        assert!(Cli::try_parse_from(["chess-piece-client", "train", "--epochs", "0"]).is_err());
        let cli = Cli::try_parse_from(["chess-piece-client", "train", "-e", "50", "--no-wait"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Train {
                epochs: Some(50),
                no_wait: true
            }
        ));
    }

    #[test]
    fn test_predict_via() {
        let cli =
            Cli::try_parse_from(["chess-piece-client", "predict", "a.jpg", "--via", "post-get"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Predict {
                via: Via::PostGet,
                ..
            }
        ));
    }

    #[test]
    fn test_render_progress() {
        assert_eq!(
            render_progress(&snapshot(5, 10, true, false)),
            "[##########..........]  50%  5 / 10 epoch  training in progress"
        );
        assert_eq!(
            render_progress(&snapshot(0, 0, false, false)),
            "[....................]  idle"
        );
        assert_eq!(
            render_progress(&snapshot(12, 10, false, true)),
            "[####################] 100%  12 / 10 epoch  training complete"
        );
    }

    #[test]
    fn test_explain_keeps_kind_message() {
        let err = explain::<()>(
            Err(ApiError::from(extract::ExtractError::Unparseable)),
            "Prediction failed",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Prediction failed: no prediction could be read from the server's page"
        );
    }

    #[test]
    fn test_read_photo_reencodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piece.png");
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(3, 2));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();

        let out = read_photo(&path).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn test_read_photo_errors() {
        assert!(read_photo(Path::new("/nonexistent/photo.heic")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piece.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();
        let err = read_photo(&path).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unusable photo: the image could not be decoded"
        );
        assert!(matches!(
            err.downcast_ref::<ApiError>().map(ApiError::kind),
            Some(ErrorKind::Image)
        ));
    }

    #[tokio::test]
    async fn test_first_interrupt_clears_flag_second_quits() {
        let polling = AtomicBool::new(true);
        let mut presses = 0;
        let quit = wait_for_interrupts(&polling, || {
            presses += 1;
            std::future::ready(Ok(()))
        })
        .await;
        assert!(quit);
        assert_eq!(presses, 2);
        assert!(!polling.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_interrupt_only_stops_polling() {
        let polling = AtomicBool::new(true);
        let mut presses = 0;
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            wait_for_interrupts(&polling, || {
                presses += 1;
                let pending = presses > 1;
                async move {
                    if pending {
                        std::future::pending::<()>().await;
                    }
                    Ok(())
                }
            }),
        )
        .await;
        assert!(outcome.is_err());
        assert!(!polling.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_interrupt_listener_failure_leaves_flag() {
        let polling = AtomicBool::new(true);
        let quit = wait_for_interrupts(&polling, || {
            std::future::ready(Err(std::io::Error::other("no signal handler")))
        })
        .await;
        assert!(!quit);
        assert!(polling.load(Ordering::SeqCst));
    }
}
