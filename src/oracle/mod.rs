//! Seams to the remote judgment service. The core only ever sees raw reply
//! text from these traits; shape validation happens in `analysis` and
//! `verification`, so a fake oracle can return anything a real one might.

mod http;
mod speech;

pub use http::HttpOracle;
pub use speech::LogSpeech;

use anyhow::Result;
use async_trait::async_trait;

use crate::{capture::ImageData, models::TaskMode};

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub mode: TaskMode,
    pub context_image: ImageData,
    pub detail_image: ImageData,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub instruction: String,
    pub image: ImageData,
}

#[async_trait]
pub trait AnalysisOracle: Send + Sync {
    /// Returns the reply body, expected to hold a JSON plan.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String>;
}

#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Returns the reply body, expected to hold `{ "success", "feedback" }`.
    async fn verify(&self, request: &VerificationRequest) -> Result<String>;
}

#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}
