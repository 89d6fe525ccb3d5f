mod analysis;
mod capture;
mod error;
mod guide;
mod models;
mod oracle;
mod settings;
mod utils;
mod verification;

pub use analysis::{parse_plan, AnalysisOrchestrator};
pub use capture::{CaptureCoordinator, FileImageSource, ImageData, ImageSource};
pub use error::{GuideError, GuideResult};
pub use guide::{
    commands::{self, Command},
    Advance, CaptureSlot, Collaborators, GuideController, GuideEvent, GuideSnapshot,
    OverrideHold, OverrideTimer, Phase, Session,
};
pub use models::{
    Material, OverlayKind, Plan, Severity, Step, TaskMode, VerificationFeedback,
    FALLBACK_SAFE_PROCEED,
};
pub use oracle::{
    AnalysisOracle, AnalysisRequest, HttpOracle, LogSpeech, SpeechRenderer, VerificationOracle,
    VerificationRequest,
};
pub use settings::GuideSettings;
pub use verification::StepVerificationController;

use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Console entry point: reads commands from stdin, prints one JSON line per
/// command and every `GuideEvent` as it happens.
pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("fieldguide starting up...");

    let settings_path = GuideSettings::default_path();
    let settings = GuideSettings::load(&settings_path)?;
    info!(
        "using oracle at {} (settings from {})",
        settings.oracle.base_url,
        settings_path.display()
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(console(settings))
}

async fn console(settings: GuideSettings) -> anyhow::Result<()> {
    let photos = Arc::new(FileImageSource::new());
    let oracle = Arc::new(HttpOracle::new(&settings.oracle));
    let controller = GuideController::new(
        Collaborators {
            image_source: photos.clone(),
            analysis_oracle: oracle.clone(),
            verification_oracle: oracle,
            speech: Arc::new(LogSpeech),
        },
        &settings,
    );

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GuideEvent::HoldProgress { active: true, percent }) if percent % 25 != 0 => {}
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{{\"event\":{line}}}"),
                    Err(err) => warn!("failed to serialise event: {err}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event printer skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{}", serde_json::json!({ "error": err.to_string() }));
                continue;
            }
        };
        let quit = command == Command::Quit;

        match commands::execute(&controller, &photos, command).await {
            Ok(output) => println!("{output}"),
            Err(err) => println!("{}", serde_json::json!({ "error": format!("{err:#}") })),
        }

        if quit {
            break;
        }
    }

    controller.release_override().await;
    info!("fieldguide shutting down");
    Ok(())
}
