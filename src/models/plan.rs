use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

/// Visual hint the presentation layer draws over the live camera view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    None,
    Arrow,
    Circle,
    Outline,
    Pulse,
    Label,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: String,
    pub alternative: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub index: usize,
    pub title: String,
    pub instruction: String,
    pub duration: Option<String>,
    /// `None` when the oracle omitted the field, `Some(vec![])` when it sent an empty list.
    pub materials: Option<Vec<Material>>,
    pub warnings: Option<Vec<String>>,
    pub checkpoints: Option<Vec<String>>,
    pub spoken_prompt: String,
    pub overlay_kind: OverlayKind,
}

/// Ordered instructions produced by one analysis call. Never mutated after
/// construction; `steps` is non-empty and indexed `0..len` without gaps.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub category: String,
    pub severity: Severity,
    pub reasoning: String,
    steps: Vec<Step>,
}

impl Plan {
    /// Returns `None` for an empty step list. Step indices are reassigned from
    /// their position so the contiguity invariant cannot be broken by callers.
    pub fn new(
        category: String,
        severity: Severity,
        reasoning: String,
        steps: Vec<Step>,
    ) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| Step { index, ..step })
            .collect();

        Some(Self {
            category,
            severity,
            reasoning,
            steps,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }

    /// Advisory only; escalation is always a user decision.
    pub fn recommends_escalation(&self) -> bool {
        self.severity == Severity::High
    }
}
