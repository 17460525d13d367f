//! Weighted risk score and the three-tier approval decision.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{CreditReport, IdentityVerification};

pub const CREDIT_SCORE_CEILING: f64 = 850.0;
pub const CREDIT_WEIGHT: f64 = 0.4;
pub const IDENTITY_WEIGHT: f64 = 0.3;
pub const AI_WEIGHT: f64 = 0.3;

pub const LOW_RISK_THRESHOLD: f64 = 0.8;
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.6;

/// Used when the identity report carries no model confidence.
pub const DEFAULT_AI_CONFIDENCE: f64 = 0.8;
/// Used when the credit report carries no predictive score.
pub const DEFAULT_PREDICTIVE_SCORE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four externally supplied signals the score is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    /// Nominally in [0, 1]; 0 means no identity risk.
    pub identity_risk: f64,
    /// Nominally on the 300-850 bureau scale.
    pub credit_score: i64,
    pub ai_confidence: f64,
    pub predictive_score: f64,
}

impl RiskInputs {
    pub fn from_reports(identity: &IdentityVerification, credit: &CreditReport) -> Self {
        Self {
            identity_risk: identity.risk_score,
            credit_score: credit.credit_score,
            ai_confidence: identity.ai_confidence.unwrap_or(DEFAULT_AI_CONFIDENCE),
            predictive_score: credit.predictive_score.unwrap_or(DEFAULT_PREDICTIVE_SCORE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub identity_risk: f64,
    pub credit_score: i64,
    pub ai_confidence: f64,
    pub predictive_score: f64,
    pub combined_assessment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Not clamped: out-of-range inputs can push it below 0 or above 1.
    pub final_score: f64,
    pub risk_level: RiskLevel,
    pub approved: bool,
    pub decision_reason: String,
    pub factors: RiskFactors,
    /// `min(0.99, final_score + 0.1)`.
    pub decision_confidence: f64,
    #[serde(default)]
    pub decision_model: String,
    #[serde(default)]
    pub decision_analysis: String,
}

/// Weighted sum of credit, identity and AI signals.
pub fn final_score(inputs: &RiskInputs) -> f64 {
    let base = (inputs.credit_score as f64 / CREDIT_SCORE_CEILING) * CREDIT_WEIGHT;
    let identity_factor = (1.0 - inputs.identity_risk) * IDENTITY_WEIGHT;
    let ai_factor = ((inputs.ai_confidence + inputs.predictive_score) / 2.0) * AI_WEIGHT;

    base + identity_factor + ai_factor
}

/// Maps a score onto a risk tier and approval flag. First matching tier wins.
pub fn classify(final_score: f64) -> (RiskLevel, bool) {
    if final_score >= LOW_RISK_THRESHOLD {
        (RiskLevel::Low, true)
    } else if final_score >= MEDIUM_RISK_THRESHOLD {
        (RiskLevel::Medium, true)
    } else {
        (RiskLevel::High, false)
    }
}

fn decision_reason(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Excellent profile, automatic approval",
        RiskLevel::Medium => "Acceptable profile, approved with monitoring",
        RiskLevel::High => "Elevated risk detected, manual review required",
    }
}

/// Scores the inputs and builds the assessment, without the decision narrative.
pub fn assess(inputs: &RiskInputs) -> RiskAssessment {
    let score = final_score(inputs);
    let (risk_level, approved) = classify(score);

    RiskAssessment {
        final_score: score,
        risk_level,
        approved,
        decision_reason: decision_reason(risk_level).to_string(),
        factors: RiskFactors {
            identity_risk: inputs.identity_risk,
            credit_score: inputs.credit_score,
            ai_confidence: inputs.ai_confidence,
            predictive_score: inputs.predictive_score,
            combined_assessment: score,
        },
        decision_confidence: (score + 0.1).min(0.99),
        decision_model: String::new(),
        decision_analysis: String::new(),
    }
}
