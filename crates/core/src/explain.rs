//! Explanation trail: the step-by-step justification of a composition.
//!
//! Steps are appended by each stage at the moment a decision is made and are
//! never reconstructed from the finished recipe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The composition phase a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parse,
    PolicyPre,
    Resolve,
    Merge,
    Select,
    PolicyPost,
    Assemble,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::PolicyPre => "policy_pre",
            Self::Resolve => "resolve",
            Self::Merge => "merge",
            Self::Select => "select",
            Self::PolicyPost => "policy_post",
            Self::Assemble => "assemble",
        };
        f.write_str(s)
    }
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStep {
    pub phase: Phase,
    /// Short machine-friendly verb ("accept", "drop_conflict", "truncate").
    pub action: String,
    pub detail: String,
    /// Category or template the decision originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The finished, read-only explanation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExplanationBlock {
    pub steps: Vec<DecisionStep>,
}

impl ExplanationBlock {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps recorded during one phase, in order.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &DecisionStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Steps with the given action, in order.
    pub fn with_action<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a DecisionStep> {
        self.steps.iter().filter(move |s| s.action == action)
    }
}

impl fmt::Display for ExplanationBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "{:>3}. [{}] {}: {}", i + 1, step.phase, step.action, step.detail)?;
            if let Some(source) = &step.source {
                write!(f, " ({source})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Append-only builder threaded through every composition stage.
#[derive(Debug, Default)]
pub struct ExplanationBuilder {
    steps: Vec<DecisionStep>,
}

impl ExplanationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision.
    pub fn record(
        &mut self,
        phase: Phase,
        action: impl Into<String>,
        detail: impl Into<String>,
        source: Option<&str>,
    ) {
        let step = DecisionStep {
            phase,
            action: action.into(),
            detail: detail.into(),
            source: source.map(str::to_string),
        };
        tracing::debug!(phase = %step.phase, action = %step.action, detail = %step.detail, "decision");
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn finish(self) -> ExplanationBlock {
        ExplanationBlock { steps: self.steps }
    }
}
