pub mod commands;
pub mod controller;
pub mod events;
pub mod override_hold;
pub mod state;

pub use controller::{Collaborators, GuideController, GuideSnapshot};
pub use events::GuideEvent;
pub use override_hold::{OverrideHold, OverrideTimer, SampleSink};
pub use state::{Advance, CaptureSlot, Phase, Session};
