use serde::{Deserialize, Serialize};

/// Message shown when the verification oracle could not produce a judgment.
pub const FALLBACK_SAFE_PROCEED: &str = "fallback-safe-proceed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFeedback {
    pub success: bool,
    pub message: String,
}

impl VerificationFeedback {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(true, FALLBACK_SAFE_PROCEED)
    }

    pub fn is_fallback(&self) -> bool {
        self.success && self.message == FALLBACK_SAFE_PROCEED
    }
}
