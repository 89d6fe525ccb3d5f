use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const SETTINGS_PATH_ENV: &str = "FIELDGUIDE_SETTINGS";
pub const DEBUG_ENV: &str = "FIELDGUIDE_DEBUG";
const DEFAULT_SETTINGS_FILE: &str = "fieldguide.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token, if any.
    pub api_key_env: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".into(),
            api_key_env: "FIELDGUIDE_API_KEY".into(),
        }
    }
}

impl OracleSettings {
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub hold_duration_ms: u64,
    pub hold_sample_interval_ms: u64,
    pub preparation_delay_ms: u64,
    pub analysis_timeout_ms: u64,
    pub verification_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            hold_duration_ms: 1500,
            hold_sample_interval_ms: 16,
            preparation_delay_ms: 1200,
            analysis_timeout_ms: 60_000,
            verification_timeout_ms: 30_000,
        }
    }
}

impl TimingSettings {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms.max(1))
    }

    pub fn hold_sample_interval(&self) -> Duration {
        Duration::from_millis(self.hold_sample_interval_ms.max(1))
    }

    pub fn preparation_delay(&self) -> Duration {
        Duration::from_millis(self.preparation_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    /// Shortens the user-facing delays; timeouts and sampling keep their configured values.
    fn apply_debug(&mut self) {
        self.hold_duration_ms = 300;
        self.preparation_delay_ms = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Longest edge, in pixels, of a still sent to the oracle.
    pub max_dimension: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { max_dimension: 1600 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideSettings {
    pub oracle: OracleSettings,
    pub timing: TimingSettings,
    pub capture: CaptureSettings,
}

impl GuideSettings {
    /// Path from `FIELDGUIDE_SETTINGS`, falling back to `fieldguide.json` in the working directory.
    pub fn default_path() -> PathBuf {
        env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    /// A missing file yields defaults; a file that is not valid JSON is an error.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_debug(path, debug_mode())
    }

    fn load_with_debug(path: &Path, debug: bool) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            GuideSettings::default()
        };

        if debug {
            settings.timing.apply_debug();
        }

        Ok(settings)
    }
}

fn debug_mode() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
