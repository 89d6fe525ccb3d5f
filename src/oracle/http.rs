use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::Serialize;

use crate::settings::OracleSettings;

use super::{AnalysisOracle, AnalysisRequest, VerificationOracle, VerificationRequest};

const ANALYZE_PATH: &str = "/analyze";
const VERIFY_PATH: &str = "/verify";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody<'a> {
    domain: &'a str,
    context_image: String,
    detail_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    instruction: &'a str,
    image: String,
}

/// JSON-over-HTTP client for the analysis and verification service.
/// Timeouts are applied by the callers, not here.
#[derive(Clone)]
pub struct HttpOracle {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(settings: &OracleSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key(),
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                anyhow!("connection to {url} failed: {e}")
            } else {
                anyhow!("request to {url} failed: {e}")
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read reply body from {url}"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "{url} returned {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl AnalysisOracle for HttpOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
        let body = AnalyzeBody {
            domain: request.mode.as_str(),
            context_image: BASE64.encode(request.context_image.as_slice()),
            detail_image: BASE64.encode(request.detail_image.as_slice()),
            note: request.note.as_deref(),
        };
        self.post(ANALYZE_PATH, &body).await
    }
}

#[async_trait]
impl VerificationOracle for HttpOracle {
    async fn verify(&self, request: &VerificationRequest) -> Result<String> {
        let body = VerifyBody {
            instruction: &request.instruction,
            image: BASE64.encode(request.image.as_slice()),
        };
        self.post(VERIFY_PATH, &body).await
    }
}
