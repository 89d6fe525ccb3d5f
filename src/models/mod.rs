pub mod feedback;
pub mod mode;
pub mod plan;

pub use feedback::{VerificationFeedback, FALLBACK_SAFE_PROCEED};
pub use mode::TaskMode;
pub use plan::{Material, OverlayKind, Plan, Severity, Step};
