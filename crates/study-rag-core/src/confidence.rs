//! Confidence gate: decides whether retrieved context can support an answer.
//!
//! Two policies are provided:
//!
//! | Policy | Insufficient when |
//! |--------|-------------------|
//! | [`ThresholdPolicy`] | no hits, or `top < threshold` |
//! | [`GapPolicy`] | as threshold, or `top < strong_score` and `top - second > max_drop` |
//!
//! The gap rule catches a single moderately similar chunk standing alone
//! well above everything else, which tends to be a lexical coincidence
//! rather than real support. A top score at or above `strong_score` is
//! always accepted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ConfidenceDecision, GateReason, RetrievalResult};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_DROP: f32 = 0.35;
pub const DEFAULT_STRONG_SCORE: f32 = 0.75;

/// A pluggable sufficiency rule.
pub trait ConfidencePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn assess(&self, result: &RetrievalResult) -> ConfidenceDecision;
}

/// Selects a policy implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Threshold,
    #[default]
    Gap,
}

/// Gate tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateParams {
    pub policy: PolicyKind,
    pub threshold: f32,
    pub max_drop: f32,
    pub strong_score: f32,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Gap,
            threshold: DEFAULT_THRESHOLD,
            max_drop: DEFAULT_MAX_DROP,
            strong_score: DEFAULT_STRONG_SCORE,
        }
    }
}

impl GateParams {
    pub fn build(&self) -> Box<dyn ConfidencePolicy> {
        match self.policy {
            PolicyKind::Threshold => Box::new(ThresholdPolicy::new(self.threshold)),
            PolicyKind::Gap => Box::new(GapPolicy {
                threshold: self.threshold,
                max_drop: self.max_drop,
                strong_score: self.strong_score,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    pub threshold: f32,
}

impl ThresholdPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl ConfidencePolicy for ThresholdPolicy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn assess(&self, result: &RetrievalResult) -> ConfidenceDecision {
        let decision = threshold_decision(result, self.threshold);
        log_decision(self.name(), &decision);
        decision
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapPolicy {
    pub threshold: f32,
    pub max_drop: f32,
    pub strong_score: f32,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_drop: DEFAULT_MAX_DROP,
            strong_score: DEFAULT_STRONG_SCORE,
        }
    }
}

impl ConfidencePolicy for GapPolicy {
    fn name(&self) -> &'static str {
        "gap"
    }

    fn assess(&self, result: &RetrievalResult) -> ConfidenceDecision {
        let mut decision = threshold_decision(result, self.threshold);
        if decision.sufficient && decision.top_score < self.strong_score {
            if let Some(gap) = decision.gap {
                if gap > self.max_drop {
                    decision.sufficient = false;
                    decision.reason = GateReason::IsolatedMatch;
                }
            }
        }
        log_decision(self.name(), &decision);
        decision
    }
}

fn threshold_decision(result: &RetrievalResult, threshold: f32) -> ConfidenceDecision {
    let Some(top) = result.top_score() else {
        return ConfidenceDecision {
            sufficient: false,
            top_score: 0.0,
            gap: None,
            reason: GateReason::NoResults,
        };
    };
    let gap = result.second_score().map(|second| top - second);
    let sufficient = top >= threshold;
    ConfidenceDecision {
        sufficient,
        top_score: top,
        gap,
        reason: if sufficient {
            GateReason::Supported
        } else {
            GateReason::BelowThreshold
        },
    }
}

fn log_decision(policy: &str, d: &ConfidenceDecision) {
    debug!(
        policy,
        sufficient = d.sufficient,
        top = d.top_score,
        gap = d.gap,
        reason = ?d.reason,
        "confidence gate"
    );
}
