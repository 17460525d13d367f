//! Regulatory compliance check for a finished KYC process.
//!
//! Four process facts earn a fixed share of the compliance score; the
//! provider's regulatory-guidance confidence makes up the rest.
use serde::{Deserialize, Serialize};

use crate::models::AiAnalysis;

pub const IDENTITY_SHARE: f64 = 0.3;
pub const CREDIT_SHARE: f64 = 0.3;
pub const SANCTIONS_SHARE: f64 = 0.2;
pub const DOCUMENTS_SHARE: f64 = 0.2;

pub const MIN_COMPLIANT_CREDIT_SCORE: i64 = 600;

pub const KYC_WEIGHT: f64 = 0.7;
pub const GUIDANCE_WEIGHT: f64 = 0.3;

/// A process is compliant only when its score is strictly above this.
pub const COMPLIANCE_THRESHOLD: f64 = 0.6;

pub const REGULATORY_FRAMEWORK: &str = "México (CNBV, CONDUSEF, BANXICO, UIF, SHCP)";

/// Facts about a KYC process submitted for compliance review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRequest {
    #[serde(default)]
    pub identity_verified: bool,
    #[serde(default)]
    pub credit_score: i64,
    #[serde(default)]
    pub sanctions_clear: bool,
    /// Names of the documents that passed validation.
    #[serde(default)]
    pub documents_validated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatorySource {
    pub source: String,
    pub title: String,
    pub similarity: f64,
}

/// What the provider found in the regulatory corpus for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryGuidance {
    pub sources: Vec<RegulatorySource>,
    /// Nominally in [0, 1].
    pub confidence: f64,
    pub analysis: AiAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub is_compliant: bool,
    pub compliance_score: f64,
    pub kyc_score: f64,
    pub regulatory_confidence: f64,
    pub regulatory_analysis: String,
    pub regulatory_sources: Vec<RegulatorySource>,
    pub recommendations: Vec<String>,
    pub model_used: String,
}

pub fn kyc_score(request: &ComplianceRequest) -> f64 {
    let mut score = 0.0;
    if request.identity_verified {
        score += IDENTITY_SHARE;
    }
    if request.credit_score >= MIN_COMPLIANT_CREDIT_SCORE {
        score += CREDIT_SHARE;
    }
    if request.sanctions_clear {
        score += SANCTIONS_SHARE;
    }
    if !request.documents_validated.is_empty() {
        score += DOCUMENTS_SHARE;
    }
    score
}

pub fn compliance_score(kyc_score: f64, guidance_confidence: f64) -> f64 {
    kyc_score * KYC_WEIGHT + guidance_confidence * GUIDANCE_WEIGHT
}

/// Follow-up actions for each failed check, or a single all-clear line.
///
/// Missing documents lower the score but carry no recommendation of their own.
pub fn recommendations(request: &ComplianceRequest) -> Vec<String> {
    let mut recommendations = Vec::new();
    if !request.identity_verified {
        recommendations.push("Complete identity verification as required by CNBV".to_string());
    }
    if !request.sanctions_clear {
        recommendations.push("Screen sanctions lists as required by UIF".to_string());
    }
    if request.credit_score < MIN_COMPLIANT_CREDIT_SCORE {
        recommendations.push("Assess additional credit risk as required by BANXICO".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("KYC process complies with Mexican regulation".to_string());
    }
    recommendations
}

pub fn assess_compliance(
    request: &ComplianceRequest,
    guidance: RegulatoryGuidance,
) -> ComplianceAssessment {
    let kyc_score = kyc_score(request);
    let compliance_score = compliance_score(kyc_score, guidance.confidence);

    ComplianceAssessment {
        is_compliant: compliance_score > COMPLIANCE_THRESHOLD,
        compliance_score,
        kyc_score,
        regulatory_confidence: guidance.confidence,
        regulatory_analysis: guidance.analysis.excerpt,
        regulatory_sources: guidance.sources,
        recommendations: recommendations(request),
        model_used: guidance.analysis.model_used,
    }
}
