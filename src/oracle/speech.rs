use anyhow::Result;
use async_trait::async_trait;
use log::info;

use super::SpeechRenderer;

/// Speech stand-in for headless runs: prompts go to the log instead of a speaker.
#[derive(Debug, Clone, Default)]
pub struct LogSpeech;

#[async_trait]
impl SpeechRenderer for LogSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        info!("[speech] {}", text);
        Ok(())
    }
}
