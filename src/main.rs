use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use voicescreen::{
    AnalysisBackend, AnalysisResult, AudioFile, BackendClient, Config, MicCaptureFactory,
    SessionController, SourceKind,
};

#[derive(Parser)]
#[command(name = "voicescreen", about = "Client for the voice screening backend", version)]
struct Cli {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voicescreen")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone and submit the audio for analysis
    Record {
        /// Stop automatically after this many seconds (default: wait for Ctrl+C)
        #[arg(long)]
        duration: Option<u64>,

        /// Disable live streaming of chunks while recording
        #[arg(long)]
        no_stream: bool,

        /// Do not persist the recording server-side
        #[arg(long)]
        no_store: bool,
    },

    /// Upload an audio file for analysis
    Analyze { file: PathBuf },

    /// List stored recordings
    List,

    /// Download a stored recording
    Fetch {
        name: String,

        /// Directory to save into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Delete a stored recording
    Delete { name: String },
}

fn print_result(result: &AnalysisResult) {
    println!(
        "{} (confidence {:.0}%, features: {})",
        result.prediction,
        result.confidence * 100.0,
        if result.features_used.is_empty() {
            "-".to_string()
        } else {
            result.features_used.join(", ")
        }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            info!("No config file loaded ({}); using defaults", e);
            Config::default()
        }
    };

    info!("{} starting", config.service.name);

    let backend: Arc<dyn AnalysisBackend> = Arc::new(BackendClient::new(
        &config.backend.api_url,
        &config.backend.stream_url,
    )?);

    match cli.command {
        Command::Record {
            duration,
            no_stream,
            no_store,
        } => {
            let mut session_config = config.session_config();
            if no_stream {
                session_config.live_streaming = false;
            }
            if no_store {
                session_config.persist_recordings = false;
            }

            let capture = Box::new(MicCaptureFactory::new(session_config.capture_config()));
            let (mut controller, mut results) =
                SessionController::new(backend, capture, session_config);

            // Live results from the streaming channel arrive here as the
            // backend produces them.
            let printer = tokio::spawn(async move {
                while let Some(result) = results.recv().await {
                    print_result(&result);
                }
            });

            controller.start(SourceKind::Microphone).await?;

            match duration {
                Some(secs) => {
                    info!("Recording for {}s", secs);
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                }
                None => {
                    info!("Recording... press Ctrl+C to stop");
                    tokio::signal::ctrl_c()
                        .await
                        .context("failed to wait for Ctrl+C")?;
                }
            }

            let result = controller.stop().await?;
            println!("--- final ---");
            print_result(&result);

            drop(controller); // closes the result channel
            let _ = printer.await;
        }

        Command::Analyze { file } => {
            let session_config = config.session_config();
            let capture = Box::new(MicCaptureFactory::new(session_config.capture_config()));
            let (mut controller, mut results) =
                SessionController::new(backend, capture, session_config);

            controller.start(SourceKind::File(file)).await?;

            if let Some(result) = results.recv().await {
                print_result(&result);
            }
        }

        Command::List => {
            let names = backend.list_recordings().await?;
            if names.is_empty() {
                println!("No recordings stored");
            }
            for name in names {
                println!("{}", name);
            }
        }

        Command::Fetch { name, out_dir } => {
            let bytes = backend.fetch_recording(&name).await?;
            let path = out_dir.join(&name);
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;

            match AudioFile::open(&path) {
                Ok(audio) => println!(
                    "Saved {} ({:.1}s, {} Hz, {} channels)",
                    path.display(),
                    audio.duration_seconds,
                    audio.sample_rate,
                    audio.channels
                ),
                Err(_) => println!("Saved {} ({} bytes)", path.display(), bytes.len()),
            }
        }

        Command::Delete { name } => {
            backend.delete_recording(&name).await?;
            println!("Deleted {}", name);
        }
    }

    Ok(())
}
