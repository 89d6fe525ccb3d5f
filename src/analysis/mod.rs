mod schema;

pub use schema::parse_plan;
pub(crate) use schema::strip_code_fence;

use std::{sync::Arc, time::Duration};

use crate::{
    capture::ImageData,
    error::{GuideError, GuideResult},
    models::{Plan, TaskMode},
    oracle::{AnalysisOracle, AnalysisRequest},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Turns the two setup photos into a validated plan. One attempt per call;
/// retrying is a user decision made from Home.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    oracle: Arc<dyn AnalysisOracle>,
    timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(oracle: Arc<dyn AnalysisOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub async fn analyze(
        &self,
        mode: TaskMode,
        context_image: ImageData,
        detail_image: ImageData,
        note: Option<String>,
    ) -> GuideResult<Plan> {
        if context_image.is_empty() || detail_image.is_empty() {
            return Err(GuideError::AnalysisFailed(
                "both setup photos are required".into(),
            ));
        }

        let request = AnalysisRequest {
            mode,
            context_image,
            detail_image,
            note,
        };

        let reply = match tokio::time::timeout(self.timeout, self.oracle.analyze(&request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Err(GuideError::AnalysisFailed(format!("{err:#}"))),
            Err(_) => {
                return Err(GuideError::AnalysisFailed(format!(
                    "no reply within {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let plan = parse_plan(&reply).map_err(|err| GuideError::AnalysisFailed(format!("{err:#}")))?;

        log_info!(
            "analysis for {} produced {} steps (category '{}', severity {})",
            mode,
            plan.len(),
            plan.category,
            plan.severity.as_str()
        );
        if plan.recommends_escalation() {
            log_warn!("high severity plan; escalation is advised but left to the user");
        }

        Ok(plan)
    }
}
