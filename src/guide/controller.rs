use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};
use uuid::Uuid;

use crate::{
    analysis::AnalysisOrchestrator,
    capture::{CaptureCoordinator, ImageSource},
    error::{GuideError, GuideResult},
    models::{Plan, TaskMode, VerificationFeedback},
    oracle::{AnalysisOracle, SpeechRenderer, VerificationOracle},
    settings::GuideSettings,
    verification::StepVerificationController,
};

use super::{
    Advance, CaptureSlot, GuideEvent, OverrideHold, OverrideTimer, Phase, SampleSink, Session,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideSnapshot {
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub mode: Option<TaskMode>,
    pub has_context_image: bool,
    pub has_detail_image: bool,
    pub note: Option<String>,
    pub plan: Option<Plan>,
    pub active_step_index: Option<usize>,
    pub pending_feedback: Option<VerificationFeedback>,
    pub busy: bool,
    pub escalation_advised: bool,
    pub hold: OverrideHold,
}

impl GuideSnapshot {
    fn build(session: &Session, hold: OverrideHold) -> Self {
        Self {
            session_id: session.id(),
            started_at: session.started_at(),
            phase: session.phase(),
            mode: session.mode(),
            has_context_image: session.has_image(CaptureSlot::Context),
            has_detail_image: session.has_image(CaptureSlot::Detail),
            note: session.note().map(str::to_string),
            plan: session.plan().cloned(),
            active_step_index: session.active_step().map(|step| step.index),
            pending_feedback: session.pending_feedback().cloned(),
            busy: session.is_busy(),
            escalation_advised: session
                .plan()
                .map(Plan::recommends_escalation)
                .unwrap_or(false),
            hold,
        }
    }
}

/// External services the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub image_source: Arc<dyn ImageSource>,
    pub analysis_oracle: Arc<dyn AnalysisOracle>,
    pub verification_oracle: Arc<dyn VerificationOracle>,
    pub speech: Arc<dyn SpeechRenderer>,
}

/// Owns the one live session and sequences every mutation through it.
/// Locks are always taken session first, then hold timer.
#[derive(Clone)]
pub struct GuideController {
    session: Arc<Mutex<Session>>,
    hold: Arc<Mutex<OverrideTimer>>,
    preparation: Arc<Mutex<Option<JoinHandle<()>>>>,
    preparation_delay: Duration,
    capture: CaptureCoordinator,
    analysis: AnalysisOrchestrator,
    verification: StepVerificationController,
    speech: Arc<dyn SpeechRenderer>,
    events: broadcast::Sender<GuideEvent>,
}

impl GuideController {
    pub fn new(collaborators: Collaborators, settings: &GuideSettings) -> Self {
        let timing = &settings.timing;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            session: Arc::new(Mutex::new(Session::new())),
            hold: Arc::new(Mutex::new(OverrideTimer::new(
                timing.hold_duration(),
                timing.hold_sample_interval(),
            ))),
            preparation: Arc::new(Mutex::new(None)),
            preparation_delay: timing.preparation_delay(),
            capture: CaptureCoordinator::new(
                collaborators.image_source,
                settings.capture.max_dimension,
            ),
            analysis: AnalysisOrchestrator::new(
                collaborators.analysis_oracle,
                timing.analysis_timeout(),
            ),
            verification: StepVerificationController::new(
                collaborators.verification_oracle,
                timing.verification_timeout(),
            ),
            speech: collaborators.speech,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuideEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> GuideSnapshot {
        let session = self.session.lock().await;
        let hold = self.hold.lock().await.current();
        GuideSnapshot::build(&session, hold)
    }

    pub async fn select_mode(&self, mode: TaskMode) -> GuideResult<Uuid> {
        let mut session = self.session.lock().await;
        let id = session.select_mode(mode)?;
        log_info!("session {} started in {} mode", id, mode);
        self.announce(&session);
        Ok(id)
    }

    /// Captures the next setup photo: context first, then detail. A failed
    /// capture leaves the session exactly as it was.
    pub async fn capture_setup_photo(&self) -> GuideResult<CaptureSlot> {
        let (session_id, slot) = {
            let session = self.session.lock().await;
            (session.id(), session.next_capture_slot()?)
        };

        let image = self.capture.request_capture().await?;

        let mut session = self.session.lock().await;
        if session.id() != session_id || session.next_capture_slot().ok() != Some(slot) {
            return Err(GuideError::invalid(session.phase(), "store a stale capture"));
        }
        session.store_capture(image)?;
        log_info!("stored {:?} photo", slot);
        if session.phase() == Phase::CaptureComplete {
            self.announce(&session);
        }
        Ok(slot)
    }

    pub async fn retake(&self, slot: CaptureSlot) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        session.retake(slot)?;
        self.announce(&session);
        Ok(())
    }

    pub async fn set_note(&self, note: Option<String>) -> GuideResult<()> {
        self.session.lock().await.set_note(note)
    }

    /// Runs the one analysis request for this session. On any failure the
    /// session is discarded and the user is back at Home.
    pub async fn analyze(&self) -> GuideResult<Plan> {
        let input = {
            let mut session = self.session.lock().await;
            let input = session.begin_analysis()?;
            self.announce(&session);
            input
        };

        let result = self
            .analysis
            .analyze(
                input.mode,
                input.context_image,
                input.detail_image,
                input.note,
            )
            .await;

        let mut session = self.session.lock().await;
        if session.id() != Some(input.session_id) {
            return Err(GuideError::invalid(session.phase(), "apply a stale analysis"));
        }

        match result {
            Ok(plan) => {
                session.finish_analysis(plan.clone())?;
                self.announce(&session);
                Ok(plan)
            }
            Err(err) => {
                log_error!("session {} analysis failed: {}", input.session_id, err);
                session.fail_analysis();
                self.emit(GuideEvent::AnalysisFailed {
                    message: err.to_string(),
                });
                self.announce(&session);
                Err(err)
            }
        }
    }

    /// Enters PreparingInstructions; Guidance follows after the preparation delay.
    pub async fn start_guidance(&self) -> GuideResult<()> {
        let session_id = {
            let mut session = self.session.lock().await;
            session.start_guidance()?;
            self.announce(&session);
            session.id()
        };

        let controller = self.clone();
        let delay = self.preparation_delay;
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            controller.finish_preparation(session_id).await;
        });

        if let Some(previous) = self.preparation.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn finish_preparation(&self, session_id: Option<Uuid>) {
        let mut session = self.session.lock().await;
        if session.id() != session_id || session.phase() != Phase::PreparingInstructions {
            log_debug!("preparation finished for an abandoned session");
            return;
        }
        let entered = session.enter_guidance().map(|step| step.index);
        match entered {
            Ok(_) => self.announce(&session),
            Err(err) => log_warn!("could not enter guidance: {}", err),
        }
    }

    pub async fn request_verification(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        session.request_verification()?;
        self.announce(&session);
        Ok(())
    }

    /// Captures a photo of the active step and asks the oracle to judge it.
    /// A capture failure is returned as-is; oracle trouble becomes fail-open feedback.
    pub async fn verify_step(&self) -> GuideResult<VerificationFeedback> {
        let instruction = self.session.lock().await.begin_verification()?;

        let image = match self.capture.request_capture().await {
            Ok(image) => image,
            Err(err) => {
                self.session.lock().await.abort_verification();
                return Err(err);
            }
        };

        let feedback = self.verification.verify(&instruction, image).await;

        self.session
            .lock()
            .await
            .finish_verification(feedback.clone())?;
        self.emit(GuideEvent::FeedbackReady {
            feedback: feedback.clone(),
        });
        Ok(feedback)
    }

    pub async fn acknowledge_feedback(&self) -> GuideResult<()> {
        self.session.lock().await.acknowledge_feedback()
    }

    pub async fn proceed(&self) -> GuideResult<Advance> {
        let mut session = self.session.lock().await;
        let advance = session.proceed()?;
        self.after_advance(&session, advance);
        Ok(advance)
    }

    /// Finger down on the override control.
    pub async fn press_override(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        let hold_id = Uuid::new_v4();
        session.begin_override(hold_id)?;

        let events = self.events.clone();
        let sink: SampleSink = Arc::new(move |hold: OverrideHold| {
            let _ = events.send(GuideEvent::from(hold));
        });

        let done = match self.hold.lock().await.start(sink) {
            Ok(done) => done,
            Err(err) => {
                log_warn!("override hold refused: {err}");
                session.cancel_override(hold_id);
                return Err(GuideError::AdvanceLocked);
            }
        };

        log_info!("override hold {} started", hold_id);
        let controller = self.clone();
        tokio::spawn(async move {
            if done.await.is_ok() {
                controller.complete_override(hold_id).await;
            }
        });
        Ok(())
    }

    /// Finger up. Returns true when a hold in progress was cancelled. A hold
    /// whose timer already reached full duration keeps the gate, so its
    /// pending completion still advances.
    pub async fn release_override(&self) -> bool {
        let mut session = self.session.lock().await;
        let cancelled = self.hold.lock().await.cancel();
        if let Some(hold_id) = session.hold_id() {
            if cancelled {
                session.cancel_override(hold_id);
                log_info!("override hold {} released early", hold_id);
            } else {
                log_debug!("override hold {} already complete, release ignored", hold_id);
            }
        }
        cancelled
    }

    async fn complete_override(&self, hold_id: Uuid) {
        let mut session = self.session.lock().await;
        match session.complete_override(hold_id) {
            Ok(advance) => {
                log_info!("override hold {} completed", hold_id);
                self.after_advance(&session, advance);
            }
            Err(err) => log_debug!("ignoring completion of hold {}: {}", hold_id, err),
        }
    }

    pub async fn return_home(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        session.return_home()?;
        self.hold.lock().await.cancel();
        self.abort_preparation().await;
        self.announce(&session);
        Ok(())
    }

    pub async fn finish(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        session.finish()?;
        self.announce(&session);
        Ok(())
    }

    pub async fn escalate(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        let session_id = session.id();
        session.escalate()?;
        self.hold.lock().await.cancel();
        self.abort_preparation().await;
        log_warn!("session {:?} escalated by user", session_id);
        self.announce(&session);
        Ok(())
    }

    pub async fn leave_escalation(&self) -> GuideResult<()> {
        let mut session = self.session.lock().await;
        session.leave_escalation()?;
        self.announce(&session);
        Ok(())
    }

    async fn abort_preparation(&self) {
        if let Some(handle) = self.preparation.lock().await.take() {
            handle.abort();
        }
    }

    fn after_advance(&self, session: &Session, advance: Advance) {
        match advance {
            Advance::Step(index) => log_info!("advanced to step {}", index),
            Advance::Completed => log_info!("session {:?} completed", session.id()),
        }
        self.announce(session);
    }

    /// Broadcasts the current phase and, on entering a step, speaks its prompt.
    fn announce(&self, session: &Session) {
        let active_step = session.active_step();
        log_info!("session {:?} is now in {:?}", session.id(), session.phase());
        self.emit(GuideEvent::PhaseChanged {
            phase: session.phase(),
            active_step_index: active_step.map(|step| step.index),
        });

        if session.phase() == Phase::Guidance {
            if let Some(step) = active_step {
                self.speak(step.spoken_prompt.clone());
            }
        }
    }

    fn speak(&self, text: String) {
        let speech = self.speech.clone();
        tokio::spawn(async move {
            if let Err(err) = speech.speak(&text).await {
                let err = GuideError::SpeechFailed(format!("{err:#}"));
                log_warn!("{}", err);
            }
        });
    }

    fn emit(&self, event: GuideEvent) {
        let _ = self.events.send(event);
    }
}
