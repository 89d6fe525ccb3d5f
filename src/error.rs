use thiserror::Error;

use crate::guide::Phase;

#[derive(Debug, Error)]
pub enum GuideError {
    /// Image source failed; the phase is left untouched so the capture can be retried.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// Oracle transport, timeout or malformed reply. The session returns to Home.
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// Never surfaced to callers of the session; converted into fail-open feedback.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// Never surfaced to callers of the session; logged and dropped.
    #[error("speech failed: {0}")]
    SpeechFailed(String),

    #[error("cannot {action} while in {phase:?}")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error("a request is already in flight")]
    Busy,

    #[error("another advance path is already active")]
    AdvanceLocked,

    #[error("a successful verification is required before proceeding")]
    FeedbackRequired,
}

impl GuideError {
    pub(crate) fn invalid(phase: Phase, action: &'static str) -> Self {
        GuideError::InvalidTransition { phase, action }
    }
}

pub type GuideResult<T> = Result<T, GuideError>;
