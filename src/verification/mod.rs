use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

use crate::{
    analysis::strip_code_fence,
    capture::ImageData,
    error::GuideError,
    models::VerificationFeedback,
    oracle::{VerificationOracle, VerificationRequest},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Deserialize)]
struct VerificationReply {
    success: bool,
    #[serde(alias = "message")]
    feedback: String,
}

/// Judges one step photo. Always produces a decision: anything short of a
/// well-formed reply fails open so a user is never stranded mid-task.
#[derive(Clone)]
pub struct StepVerificationController {
    oracle: Arc<dyn VerificationOracle>,
    timeout: Duration,
}

impl StepVerificationController {
    pub fn new(oracle: Arc<dyn VerificationOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub async fn verify(&self, instruction: &str, image: ImageData) -> VerificationFeedback {
        match self.try_verify(instruction, image).await {
            Ok(feedback) => {
                log_info!("step verification returned success={}", feedback.success);
                feedback
            }
            Err(err) => {
                log_warn!("{err}; proceeding with fallback feedback");
                VerificationFeedback::fallback()
            }
        }
    }

    async fn try_verify(
        &self,
        instruction: &str,
        image: ImageData,
    ) -> Result<VerificationFeedback, GuideError> {
        let request = VerificationRequest {
            instruction: instruction.to_string(),
            image,
        };

        let reply = tokio::time::timeout(self.timeout, self.oracle.verify(&request))
            .await
            .map_err(|_| {
                GuideError::VerificationFailed(format!(
                    "no reply within {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|err| GuideError::VerificationFailed(format!("{err:#}")))?;

        parse_reply(&reply).map_err(|err| GuideError::VerificationFailed(format!("{err:#}")))
    }
}

fn parse_reply(text: &str) -> Result<VerificationFeedback> {
    let reply: VerificationReply = serde_json::from_str(strip_code_fence(text))
        .context("verification reply is not valid JSON")?;
    if reply.feedback.trim().is_empty() {
        return Err(anyhow!("verification reply has blank feedback"));
    }
    Ok(VerificationFeedback::new(reply.success, reply.feedback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum Behaviour {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct FakeOracle(Behaviour);

    #[async_trait]
    impl VerificationOracle for FakeOracle {
        async fn verify(&self, request: &VerificationRequest) -> Result<String> {
            assert_eq!(request.instruction, "tighten the bolt");
            match self.0 {
                Behaviour::Reply(text) => Ok(text.to_string()),
                Behaviour::Fail => Err(anyhow!("connection reset")),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    async fn run(behaviour: Behaviour) -> VerificationFeedback {
        StepVerificationController::new(Arc::new(FakeOracle(behaviour)), Duration::from_secs(30))
            .verify("tighten the bolt", Arc::new(vec![1, 2, 3]))
            .await
    }

    #[tokio::test]
    async fn passes_through_oracle_judgment() {
        let feedback = run(Behaviour::Reply(r#"{"success": false, "feedback": "loose wire"}"#)).await;
        assert_eq!(feedback, VerificationFeedback::new(false, "loose wire"));
        assert!(!feedback.is_fallback());
    }

    #[tokio::test]
    async fn fenced_reply_keeps_a_negative_judgment() {
        let feedback = run(Behaviour::Reply(
            "```json\n{\"success\": false, \"feedback\": \"bandage too loose\"}\n```",
        ))
        .await;
        assert_eq!(feedback, VerificationFeedback::new(false, "bandage too loose"));
        assert!(!feedback.is_fallback());
    }

    #[tokio::test]
    async fn transport_failure_fails_open() {
        assert!(run(Behaviour::Fail).await.is_fallback());
    }

    #[tokio::test]
    async fn malformed_reply_fails_open() {
        assert!(run(Behaviour::Reply("{\"success\": \"maybe\"}")).await.is_fallback());
        assert!(run(Behaviour::Reply(r#"{"success": false, "feedback": "  "}"#)).await.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_open() {
        let feedback = run(Behaviour::Hang).await;
        assert_eq!(feedback, VerificationFeedback::fallback());
    }
}
