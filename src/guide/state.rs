use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    capture::ImageData,
    error::{GuideError, GuideResult},
    models::{Plan, Step, TaskMode, VerificationFeedback},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Home,
    InitialCapture,
    CaptureComplete,
    Analyzing,
    AnalysisComplete,
    PreparingInstructions,
    Guidance,
    StepValidation,
    Escalation,
    Completed,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Home
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureSlot {
    Context,
    Detail,
}

/// The single gate shared by every path that can move the session forward.
/// At most one of these exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Analysis,
    Verification,
    OverrideHold(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Step(usize),
    Completed,
}

/// Inputs for one analysis call, copied out so the lock is not held across the request.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub session_id: Uuid,
    pub mode: TaskMode,
    pub context_image: ImageData,
    pub detail_image: ImageData,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    phase: Phase,
    mode: Option<TaskMode>,
    context_image: Option<ImageData>,
    detail_image: Option<ImageData>,
    note: Option<String>,
    plan: Option<Plan>,
    active_step_index: usize,
    pending_feedback: Option<VerificationFeedback>,
    pending: Option<Pending>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Option<TaskMode> {
        self.mode
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn has_image(&self, slot: CaptureSlot) -> bool {
        match slot {
            CaptureSlot::Context => self.context_image.is_some(),
            CaptureSlot::Detail => self.detail_image.is_some(),
        }
    }

    pub fn active_step_index(&self) -> usize {
        self.active_step_index
    }

    /// The step being worked on; only defined while guiding or validating.
    pub fn active_step(&self) -> Option<&Step> {
        match self.phase {
            Phase::Guidance | Phase::StepValidation => {
                self.plan.as_ref()?.step(self.active_step_index)
            }
            _ => None,
        }
    }

    pub fn pending_feedback(&self) -> Option<&VerificationFeedback> {
        self.pending_feedback.as_ref()
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    /// True exactly while an analysis or verification request is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.pending,
            Some(Pending::Analysis) | Some(Pending::Verification)
        )
    }

    pub fn hold_id(&self) -> Option<Uuid> {
        match self.pending {
            Some(Pending::OverrideHold(id)) => Some(id),
            _ => None,
        }
    }

    fn expect_phase(&self, phase: Phase, action: &'static str) -> GuideResult<()> {
        if self.phase != phase {
            return Err(GuideError::invalid(self.phase, action));
        }
        Ok(())
    }

    fn ensure_idle(&self) -> GuideResult<()> {
        match self.pending {
            None => Ok(()),
            Some(Pending::OverrideHold(_)) => Err(GuideError::AdvanceLocked),
            Some(_) => Err(GuideError::Busy),
        }
    }

    pub fn select_mode(&mut self, mode: TaskMode) -> GuideResult<Uuid> {
        self.expect_phase(Phase::Home, "select a mode")?;
        let id = Uuid::new_v4();
        *self = Self {
            id: Some(id),
            started_at: Some(Utc::now()),
            phase: Phase::InitialCapture,
            mode: Some(mode),
            ..Self::default()
        };
        Ok(id)
    }

    /// Slot the next setup capture will fill: context first, then detail.
    pub fn next_capture_slot(&self) -> GuideResult<CaptureSlot> {
        self.expect_phase(Phase::InitialCapture, "capture a setup photo")?;
        if self.context_image.is_none() {
            Ok(CaptureSlot::Context)
        } else {
            Ok(CaptureSlot::Detail)
        }
    }

    pub fn store_capture(&mut self, image: ImageData) -> GuideResult<CaptureSlot> {
        let slot = self.next_capture_slot()?;
        match slot {
            CaptureSlot::Context => self.context_image = Some(image),
            CaptureSlot::Detail => self.detail_image = Some(image),
        }

        if self.context_image.is_some() && self.detail_image.is_some() {
            self.phase = Phase::CaptureComplete;
        }
        Ok(slot)
    }

    /// Clears only the retaken slot.
    pub fn retake(&mut self, slot: CaptureSlot) -> GuideResult<()> {
        self.expect_phase(Phase::CaptureComplete, "retake a photo")?;
        match slot {
            CaptureSlot::Context => self.context_image = None,
            CaptureSlot::Detail => self.detail_image = None,
        }
        self.phase = Phase::InitialCapture;
        Ok(())
    }

    pub fn set_note(&mut self, note: Option<String>) -> GuideResult<()> {
        if !matches!(self.phase, Phase::InitialCapture | Phase::CaptureComplete) {
            return Err(GuideError::invalid(self.phase, "edit the note"));
        }
        self.note = note
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        Ok(())
    }

    pub fn begin_analysis(&mut self) -> GuideResult<AnalysisInput> {
        self.expect_phase(Phase::CaptureComplete, "start analysis")?;
        self.ensure_idle()?;

        let (Some(session_id), Some(mode), Some(context_image), Some(detail_image)) = (
            self.id,
            self.mode,
            self.context_image.clone(),
            self.detail_image.clone(),
        ) else {
            return Err(GuideError::invalid(self.phase, "start analysis without both photos"));
        };

        self.phase = Phase::Analyzing;
        self.pending = Some(Pending::Analysis);

        Ok(AnalysisInput {
            session_id,
            mode,
            context_image,
            detail_image,
            note: self.note.clone(),
        })
    }

    pub fn finish_analysis(&mut self, plan: Plan) -> GuideResult<()> {
        self.expect_phase(Phase::Analyzing, "install a plan")?;
        self.pending = None;
        self.plan = Some(plan);
        self.phase = Phase::AnalysisComplete;
        Ok(())
    }

    /// No partial plan survives; images and note are dropped with the rest.
    pub fn fail_analysis(&mut self) {
        self.reset();
    }

    pub fn start_guidance(&mut self) -> GuideResult<()> {
        self.expect_phase(Phase::AnalysisComplete, "start guidance")?;
        self.phase = Phase::PreparingInstructions;
        Ok(())
    }

    pub fn enter_guidance(&mut self) -> GuideResult<&Step> {
        self.expect_phase(Phase::PreparingInstructions, "enter guidance")?;
        if self.plan.is_none() {
            return Err(GuideError::invalid(self.phase, "enter guidance without a plan"));
        }
        self.active_step_index = 0;
        self.phase = Phase::Guidance;
        self.plan
            .as_ref()
            .and_then(|plan| plan.step(0))
            .ok_or_else(|| GuideError::invalid(Phase::Guidance, "enter guidance without steps"))
    }

    pub fn request_verification(&mut self) -> GuideResult<()> {
        self.expect_phase(Phase::Guidance, "request verification")?;
        self.phase = Phase::StepValidation;
        Ok(())
    }

    /// Claims the advance gate and returns the instruction to verify against.
    pub fn begin_verification(&mut self) -> GuideResult<String> {
        self.expect_phase(Phase::StepValidation, "verify a step")?;
        self.ensure_idle()?;
        let instruction = self
            .active_step()
            .map(|step| step.instruction.clone())
            .ok_or_else(|| GuideError::invalid(self.phase, "verify without an active step"))?;

        self.pending_feedback = None;
        self.pending = Some(Pending::Verification);
        Ok(instruction)
    }

    /// Releases the gate without feedback, e.g. when the capture itself failed.
    pub fn abort_verification(&mut self) {
        if self.pending == Some(Pending::Verification) {
            self.pending = None;
        }
    }

    pub fn finish_verification(&mut self, feedback: VerificationFeedback) -> GuideResult<()> {
        if self.pending != Some(Pending::Verification) {
            return Err(GuideError::invalid(self.phase, "record feedback"));
        }
        self.pending = None;
        self.pending_feedback = Some(feedback);
        Ok(())
    }

    pub fn acknowledge_feedback(&mut self) -> GuideResult<()> {
        self.expect_phase(Phase::StepValidation, "acknowledge feedback")?;
        self.ensure_idle()?;
        self.pending_feedback = None;
        Ok(())
    }

    pub fn proceed(&mut self) -> GuideResult<Advance> {
        self.expect_phase(Phase::StepValidation, "proceed")?;
        self.ensure_idle()?;
        match &self.pending_feedback {
            Some(feedback) if feedback.success => self.advance(),
            _ => Err(GuideError::FeedbackRequired),
        }
    }

    pub fn begin_override(&mut self, hold_id: Uuid) -> GuideResult<()> {
        self.expect_phase(Phase::StepValidation, "hold to override")?;
        self.ensure_idle()?;
        self.pending = Some(Pending::OverrideHold(hold_id));
        Ok(())
    }

    /// Returns false when `hold_id` no longer owns the gate.
    pub fn cancel_override(&mut self, hold_id: Uuid) -> bool {
        if self.pending == Some(Pending::OverrideHold(hold_id)) {
            self.pending = None;
            return true;
        }
        false
    }

    pub fn complete_override(&mut self, hold_id: Uuid) -> GuideResult<Advance> {
        if self.phase != Phase::StepValidation || !self.cancel_override(hold_id) {
            return Err(GuideError::invalid(self.phase, "complete an override hold"));
        }
        self.advance()
    }

    /// Shared by the verified and the override path.
    fn advance(&mut self) -> GuideResult<Advance> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| GuideError::invalid(self.phase, "advance without a plan"))?;

        self.pending_feedback = None;
        if plan.is_last(self.active_step_index) {
            self.phase = Phase::Completed;
            return Ok(Advance::Completed);
        }

        self.active_step_index += 1;
        self.phase = Phase::Guidance;
        Ok(Advance::Step(self.active_step_index))
    }

    pub fn return_home(&mut self) -> GuideResult<()> {
        match self.phase {
            Phase::InitialCapture
            | Phase::CaptureComplete
            | Phase::AnalysisComplete
            | Phase::Guidance
            | Phase::StepValidation => {
                if self.is_busy() {
                    return Err(GuideError::Busy);
                }
                self.reset();
                Ok(())
            }
            phase => Err(GuideError::invalid(phase, "return home")),
        }
    }

    pub fn finish(&mut self) -> GuideResult<()> {
        self.expect_phase(Phase::Completed, "finish")?;
        self.reset();
        Ok(())
    }

    pub fn escalate(&mut self) -> GuideResult<()> {
        if matches!(self.phase, Phase::Home | Phase::Escalation) {
            return Err(GuideError::invalid(self.phase, "escalate"));
        }
        if self.is_busy() {
            return Err(GuideError::Busy);
        }
        self.pending = None;
        self.pending_feedback = None;
        self.phase = Phase::Escalation;
        Ok(())
    }

    pub fn leave_escalation(&mut self) -> GuideResult<()> {
        self.expect_phase(Phase::Escalation, "leave escalation")?;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OverlayKind, Severity};
    use std::sync::Arc;

    fn plan_with_steps(count: usize) -> Plan {
        let steps = (0..count)
            .map(|index| Step {
                index,
                title: format!("step {index}"),
                instruction: format!("instruction {index}"),
                duration: None,
                materials: None,
                warnings: None,
                checkpoints: None,
                spoken_prompt: format!("prompt {index}"),
                overlay_kind: OverlayKind::Arrow,
            })
            .collect();
        Plan::new("test".into(), Severity::Medium, "because".into(), steps).unwrap()
    }

    fn image(byte: u8) -> ImageData {
        Arc::new(vec![byte; 4])
    }

    fn session_in_validation(steps: usize) -> Session {
        let mut session = Session::new();
        session.select_mode(TaskMode::Repair).unwrap();
        session.store_capture(image(1)).unwrap();
        session.store_capture(image(2)).unwrap();
        session.begin_analysis().unwrap();
        session.finish_analysis(plan_with_steps(steps)).unwrap();
        session.start_guidance().unwrap();
        session.enter_guidance().unwrap();
        session.request_verification().unwrap();
        session
    }

    fn assert_index_in_bounds(session: &Session) {
        if matches!(session.phase(), Phase::Guidance | Phase::StepValidation) {
            let len = session.plan().unwrap().len();
            assert!(session.active_step_index() < len);
        }
    }

    #[test]
    fn setup_captures_fill_context_then_detail() {
        let mut session = Session::new();
        session.select_mode(TaskMode::FirstAid).unwrap();

        assert_eq!(session.store_capture(image(1)).unwrap(), CaptureSlot::Context);
        assert_eq!(session.phase(), Phase::InitialCapture);
        assert_eq!(session.store_capture(image(2)).unwrap(), CaptureSlot::Detail);
        assert_eq!(session.phase(), Phase::CaptureComplete);
    }

    #[test]
    fn retake_clears_only_the_retaken_slot() {
        let mut session = Session::new();
        session.select_mode(TaskMode::FirstAid).unwrap();
        session.store_capture(image(1)).unwrap();
        session.store_capture(image(2)).unwrap();

        session.retake(CaptureSlot::Context).unwrap();
        assert_eq!(session.phase(), Phase::InitialCapture);
        assert!(!session.has_image(CaptureSlot::Context));
        assert!(session.has_image(CaptureSlot::Detail));

        assert_eq!(session.store_capture(image(3)).unwrap(), CaptureSlot::Context);
        assert_eq!(session.phase(), Phase::CaptureComplete);

        session.retake(CaptureSlot::Detail).unwrap();
        assert!(session.has_image(CaptureSlot::Context));
        assert!(!session.has_image(CaptureSlot::Detail));
    }

    #[test]
    fn analysis_sets_busy_and_blocks_a_second_start() {
        let mut session = Session::new();
        session.select_mode(TaskMode::Assembly).unwrap();
        session.store_capture(image(1)).unwrap();
        session.store_capture(image(2)).unwrap();

        let input = session.begin_analysis().unwrap();
        assert_eq!(input.mode, TaskMode::Assembly);
        assert!(session.is_busy());
        assert!(session.begin_analysis().is_err());
        assert!(matches!(session.return_home(), Err(GuideError::InvalidTransition { .. })));

        session.finish_analysis(plan_with_steps(2)).unwrap();
        assert!(!session.is_busy());
        assert_eq!(session.phase(), Phase::AnalysisComplete);
    }

    #[test]
    fn failed_analysis_drops_everything() {
        let mut session = Session::new();
        session.select_mode(TaskMode::Assembly).unwrap();
        session.set_note(Some("left hinge".into())).unwrap();
        session.store_capture(image(1)).unwrap();
        session.store_capture(image(2)).unwrap();
        session.begin_analysis().unwrap();

        session.fail_analysis();
        assert_eq!(session.phase(), Phase::Home);
        assert!(!session.is_busy());
        assert!(!session.has_image(CaptureSlot::Context));
        assert!(!session.has_image(CaptureSlot::Detail));
        assert!(session.note().is_none());
        assert!(session.plan().is_none());
    }

    #[test]
    fn proceed_requires_successful_feedback() {
        let mut session = session_in_validation(3);
        assert!(matches!(session.proceed(), Err(GuideError::FeedbackRequired)));

        session.begin_verification().unwrap();
        session
            .finish_verification(VerificationFeedback::new(false, "loose wire"))
            .unwrap();
        assert!(matches!(session.proceed(), Err(GuideError::FeedbackRequired)));

        session.acknowledge_feedback().unwrap();
        assert!(session.pending_feedback().is_none());

        session.begin_verification().unwrap();
        session
            .finish_verification(VerificationFeedback::new(true, "looks good"))
            .unwrap();
        assert_eq!(session.proceed().unwrap(), Advance::Step(1));
        assert_eq!(session.phase(), Phase::Guidance);
        assert!(session.pending_feedback().is_none());
        assert_index_in_bounds(&session);
    }

    #[test]
    fn advancing_from_last_step_completes() {
        let mut session = session_in_validation(2);
        for expected in [Advance::Step(1), Advance::Completed] {
            if session.phase() == Phase::Guidance {
                session.request_verification().unwrap();
            }
            session.begin_verification().unwrap();
            session.finish_verification(VerificationFeedback::new(true, "ok")).unwrap();
            assert_eq!(session.proceed().unwrap(), expected);
            assert_index_in_bounds(&session);
        }
        assert_eq!(session.phase(), Phase::Completed);
        assert_eq!(session.active_step_index(), 1);

        session.finish().unwrap();
        assert_eq!(session.phase(), Phase::Home);
        assert!(session.id().is_none());
    }

    #[test]
    fn override_and_verification_share_one_gate() {
        let mut session = session_in_validation(1);
        let hold = Uuid::new_v4();

        session.begin_override(hold).unwrap();
        assert!(!session.is_busy());
        assert!(matches!(session.begin_verification(), Err(GuideError::AdvanceLocked)));

        assert!(session.cancel_override(hold));
        session.begin_verification().unwrap();
        assert!(matches!(session.begin_override(Uuid::new_v4()), Err(GuideError::Busy)));
    }

    #[test]
    fn override_completion_uses_the_same_advance() {
        let mut session = session_in_validation(1);
        let hold = Uuid::new_v4();
        session.begin_override(hold).unwrap();

        assert!(session.complete_override(Uuid::new_v4()).is_err());
        assert_eq!(session.complete_override(hold).unwrap(), Advance::Completed);
        assert_eq!(session.phase(), Phase::Completed);
        assert!(session.complete_override(hold).is_err());
    }

    #[test]
    fn cancelled_override_leaves_session_untouched() {
        let mut session = session_in_validation(2);
        let hold = Uuid::new_v4();
        session.begin_override(hold).unwrap();
        assert!(session.cancel_override(hold));

        assert_eq!(session.phase(), Phase::StepValidation);
        assert_eq!(session.active_step_index(), 0);
        assert!(session.complete_override(hold).is_err());
        assert_eq!(session.active_step_index(), 0);
    }

    #[test]
    fn escalation_is_manual_and_returns_home() {
        let mut session = Session::new();
        assert!(session.escalate().is_err());

        session.select_mode(TaskMode::FirstAid).unwrap();
        session.escalate().unwrap();
        assert_eq!(session.phase(), Phase::Escalation);
        assert!(session.escalate().is_err());
        session.leave_escalation().unwrap();
        assert_eq!(session.phase(), Phase::Home);
    }

    #[test]
    fn transitions_outside_their_phase_are_rejected() {
        let mut session = Session::new();
        assert!(session.next_capture_slot().is_err());
        assert!(session.start_guidance().is_err());
        assert!(session.request_verification().is_err());
        assert!(session.finish().is_err());
        assert!(session.return_home().is_err());

        session.select_mode(TaskMode::Repair).unwrap();
        assert!(session.select_mode(TaskMode::Repair).is_err());
        assert!(session.retake(CaptureSlot::Context).is_err());
        assert!(session.begin_analysis().is_err());
    }

    #[test]
    fn blank_note_clears() {
        let mut session = Session::new();
        session.select_mode(TaskMode::Repair).unwrap();
        session.set_note(Some("  squeaky hinge ".into())).unwrap();
        assert_eq!(session.note(), Some("squeaky hinge"));
        session.set_note(Some("   ".into())).unwrap();
        assert!(session.note().is_none());
    }
}
