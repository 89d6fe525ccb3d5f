use serde::Serialize;

use crate::models::VerificationFeedback;

use super::{OverrideHold, Phase};

/// Notifications for whatever renders the session. Delivery is best effort:
/// with no subscriber the event is dropped.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GuideEvent {
    PhaseChanged {
        phase: Phase,
        active_step_index: Option<usize>,
    },
    FeedbackReady {
        feedback: VerificationFeedback,
    },
    HoldProgress {
        active: bool,
        percent: u8,
    },
    AnalysisFailed {
        message: String,
    },
}

impl From<OverrideHold> for GuideEvent {
    fn from(hold: OverrideHold) -> Self {
        GuideEvent::HoldProgress {
            active: hold.active,
            percent: hold.percent(),
        }
    }
}
