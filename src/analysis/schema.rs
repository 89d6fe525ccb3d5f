use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::models::{Material, OverlayKind, Plan, Severity, Step};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    category: Option<String>,
    severity: Option<String>,
    reasoning: Option<String>,
    steps: Option<Vec<RawStep>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    title: Option<String>,
    instruction: Option<String>,
    duration: Option<String>,
    materials: Option<Vec<RawMaterial>>,
    warnings: Option<Vec<String>>,
    checkpoints: Option<Vec<String>>,
    #[serde(alias = "spoken_prompt", alias = "voicePrompt")]
    spoken_prompt: Option<String>,
    #[serde(alias = "overlayKind", alias = "overlay_kind")]
    overlay: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMaterial {
    name: Option<String>,
    alternative: Option<String>,
}

/// Parses and validates an analysis reply. Any structural mismatch is an error;
/// nothing is defaulted except the optional containers.
pub fn parse_plan(text: &str) -> Result<Plan> {
    let body = strip_code_fence(text);
    let raw: RawPlan = serde_json::from_str(body).context("analysis reply is not valid JSON")?;

    let category = required(raw.category, "category")?;
    let severity = parse_severity(&required(raw.severity, "severity")?)?;
    let reasoning = raw
        .reasoning
        .ok_or_else(|| anyhow!("analysis reply is missing 'reasoning'"))?;

    let raw_steps = raw
        .steps
        .ok_or_else(|| anyhow!("analysis reply is missing 'steps'"))?;
    if raw_steps.is_empty() {
        bail!("analysis reply contains no steps");
    }

    let steps = raw_steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            convert_step(index, step).with_context(|| format!("invalid step {index}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Plan::new(category, severity, reasoning, steps)
        .ok_or_else(|| anyhow!("analysis reply contains no steps"))
}

fn convert_step(index: usize, raw: RawStep) -> Result<Step> {
    let materials = raw
        .materials
        .map(|items| {
            items
                .into_iter()
                .map(|item| {
                    Ok(Material {
                        name: required(item.name, "materials.name")?,
                        alternative: item.alternative.filter(|alt| !alt.trim().is_empty()),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    Ok(Step {
        index,
        title: required(raw.title, "title")?,
        instruction: required(raw.instruction, "instruction")?,
        duration: raw.duration.filter(|d| !d.trim().is_empty()),
        materials,
        warnings: raw.warnings,
        checkpoints: raw.checkpoints,
        spoken_prompt: required(raw.spoken_prompt, "spokenPrompt")?,
        overlay_kind: parse_overlay(&required(raw.overlay, "overlay")?)?,
    })
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(anyhow!("'{field}' is blank")),
        None => Err(anyhow!("'{field}' is missing")),
    }
}

fn parse_severity(value: &str) -> Result<Severity> {
    match value.trim().to_ascii_uppercase().as_str() {
        "LOW" => Ok(Severity::Low),
        "MEDIUM" => Ok(Severity::Medium),
        "HIGH" => Ok(Severity::High),
        other => Err(anyhow!("unknown severity '{other}'")),
    }
}

fn parse_overlay(value: &str) -> Result<OverlayKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(OverlayKind::None),
        "arrow" => Ok(OverlayKind::Arrow),
        "circle" => Ok(OverlayKind::Circle),
        "outline" => Ok(OverlayKind::Outline),
        "pulse" => Ok(OverlayKind::Pulse),
        "label" => Ok(OverlayKind::Label),
        other => Err(anyhow!("unknown overlay '{other}'")),
    }
}

/// Models often wrap JSON in a Markdown fence; accept that and nothing else.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
