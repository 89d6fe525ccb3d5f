use anyhow::{anyhow, bail, Result};
use serde_json::json;
use std::{path::PathBuf, str::FromStr};

use crate::{capture::FileImageSource, models::TaskMode};

use super::{CaptureSlot, GuideController, Phase};

/// One line typed into the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mode(TaskMode),
    Capture(PathBuf),
    Retake(CaptureSlot),
    Note(Option<String>),
    Analyze,
    Start,
    Check,
    Verify(PathBuf),
    Ack,
    Proceed,
    Hold,
    Release,
    Escalate,
    Home,
    Finish,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let path = |rest: &str| -> Result<PathBuf> {
            if rest.is_empty() {
                bail!("'{word}' needs a photo path");
            }
            Ok(PathBuf::from(rest))
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "mode" => Command::Mode(rest.parse()?),
            "capture" => Command::Capture(path(rest)?),
            "retake" => Command::Retake(match rest {
                "context" => CaptureSlot::Context,
                "detail" => CaptureSlot::Detail,
                other => bail!("retake expects 'context' or 'detail', got '{other}'"),
            }),
            "note" => Command::Note(Some(rest.to_string()).filter(|n| !n.is_empty())),
            "analyze" => Command::Analyze,
            "start" => Command::Start,
            "check" => Command::Check,
            "verify" => Command::Verify(path(rest)?),
            "ack" => Command::Ack,
            "proceed" => Command::Proceed,
            "hold" => Command::Hold,
            "release" => Command::Release,
            "escalate" => Command::Escalate,
            "home" | "back" => Command::Home,
            "finish" => Command::Finish,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            "" => bail!("empty command"),
            other => return Err(anyhow!("unknown command '{other}'")),
        };
        Ok(command)
    }
}

/// Applies a command and returns a JSON line describing the outcome.
/// `home` leaves whatever screen is showing, including escalation and completion.
pub async fn execute(
    controller: &GuideController,
    photos: &FileImageSource,
    command: Command,
) -> Result<String> {
    let outcome = match command {
        Command::Mode(mode) => json!({ "sessionId": controller.select_mode(mode).await? }),
        Command::Capture(path) => {
            photos.stage(path);
            json!({ "stored": controller.capture_setup_photo().await? })
        }
        Command::Retake(slot) => {
            controller.retake(slot).await?;
            json!({ "cleared": slot })
        }
        Command::Note(note) => {
            controller.set_note(note).await?;
            json!({ "ok": true })
        }
        Command::Analyze => json!({ "plan": controller.analyze().await? }),
        Command::Start => {
            controller.start_guidance().await?;
            json!({ "ok": true })
        }
        Command::Check => {
            controller.request_verification().await?;
            json!({ "ok": true })
        }
        Command::Verify(path) => {
            photos.stage(path);
            json!({ "feedback": controller.verify_step().await? })
        }
        Command::Ack => {
            controller.acknowledge_feedback().await?;
            json!({ "ok": true })
        }
        Command::Proceed => {
            controller.proceed().await?;
            json!({ "snapshot": controller.snapshot().await })
        }
        Command::Hold => {
            controller.press_override().await?;
            json!({ "holding": true })
        }
        Command::Release => json!({ "cancelled": controller.release_override().await }),
        Command::Escalate => {
            controller.escalate().await?;
            json!({ "ok": true })
        }
        Command::Home => {
            let phase = controller.snapshot().await.phase;
            match phase {
                Phase::Escalation => controller.leave_escalation().await?,
                Phase::Completed => controller.finish().await?,
                _ => controller.return_home().await?,
            }
            json!({ "ok": true })
        }
        Command::Finish => {
            controller.finish().await?;
            json!({ "ok": true })
        }
        Command::Status | Command::Quit => json!({ "snapshot": controller.snapshot().await }),
    };

    Ok(outcome.to_string())
}
