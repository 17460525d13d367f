use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::compliance::ComplianceAssessment;
use crate::scoring::{RiskAssessment, RiskLevel};
use crate::validation::{DocumentQuality, ValidationReport};

// ============ Applicant Input ============

/// Personal data supplied by the applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: String,
    pub id_number: String,
    /// Birth date as `YYYY-MM-DD`.
    pub birth_date: String,
    pub address: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Population-registry key, validated when supplied.
    #[serde(default)]
    pub curp: Option<String>,
    /// Tax identifier, validated when supplied.
    #[serde(default)]
    pub rfc: Option<String>,
}

impl PersonalInfo {
    /// Fields that carry a registered format rule, in check order.
    pub fn pattern_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = Vec::with_capacity(4);
        if let Some(curp) = self.curp.as_deref() {
            fields.push(("curp", curp));
        }
        if let Some(rfc) = self.rfc.as_deref() {
            fields.push(("rfc", rfc));
        }
        fields.push(("phone", self.phone.as_str()));
        if let Some(email) = self.email.as_deref() {
            fields.push(("email", email));
        }
        fields
    }
}

/// An uploaded identity document.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub content: Vec<u8>,
    pub document_type: String,
    pub filename: Option<String>,
}

impl DocumentUpload {
    /// Builds an upload, deriving the document type from the filename extension.
    pub fn new(content: Vec<u8>, filename: Option<String>) -> Self {
        let document_type = filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            content,
            document_type,
            filename,
        }
    }

    /// Hex-encoded SHA-256 of the raw document bytes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        hex::encode(hasher.finalize())
    }
}

/// Body of the JSON-only application endpoint and of the `request` multipart part.
#[derive(Debug, Clone, Deserialize)]
pub struct KycRequest {
    pub customer_id: String,
    pub personal_info: PersonalInfo,
}

// ============ Provider Results ============

/// Fields read off a document by the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocumentFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
}

/// Trace of the AI call behind a provider result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub model_used: String,
    /// Whether the content came from the remote API rather than the simulation.
    pub live_call: bool,
    /// Truncated completion text.
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_type: String,
    pub extracted_fields: ExtractedDocumentFields,
    pub confidence_score: f64,
    pub processing_time: f64,
    pub analysis: AiAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreeningStatus {
    Clear,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityVerification {
    pub identity_verified: bool,
    pub sanctions_check: ScreeningStatus,
    pub pep_check: ScreeningStatus,
    pub adverse_media: ScreeningStatus,
    /// 0 means no identity risk.
    pub risk_score: f64,
    pub validation_time: f64,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
    pub analysis: AiAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReport {
    pub credit_score: i64,
    pub payment_history: String,
    pub debt_ratio: f64,
    pub active_accounts: u32,
    pub bureau_response_time: f64,
    #[serde(default)]
    pub predictive_score: Option<f64>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub recommendation: String,
    pub analysis: AiAnalysis,
}

/// Who the identity check runs against.
#[derive(Debug, Clone, Copy)]
pub enum IdentitySubject<'a> {
    Document(&'a ExtractedDocumentFields),
    Applicant(&'a PersonalInfo),
}

impl<'a> IdentitySubject<'a> {
    pub fn name(&self) -> Option<&'a str> {
        match self {
            IdentitySubject::Document(fields) => fields.name.as_deref(),
            IdentitySubject::Applicant(info) => Some(info.name.as_str()),
        }
    }

    pub fn id_number(&self) -> Option<&'a str> {
        match self {
            IdentitySubject::Document(fields) => fields.id_number.as_deref(),
            IdentitySubject::Applicant(info) => Some(info.id_number.as_str()),
        }
    }
}

// ============ Stored Records ============

/// Per-document entry kept on the KYC record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub filename: Option<String>,
    pub size_bytes: usize,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    pub extraction: DocumentExtraction,
    pub quality: DocumentQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Completed,
    Error,
    ManualReview,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Completed => "completed",
            KycStatus::Error => "error",
            KycStatus::ManualReview => "manual_review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycRecord {
    pub customer_id: String,
    pub application_id: Uuid,
    pub status: KycStatus,
    pub approved: bool,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub validation: Option<ValidationReport>,
    #[serde(default)]
    pub documents: Vec<DocumentResult>,
    #[serde(default)]
    pub identity_verification: Option<IdentityVerification>,
    #[serde(default)]
    pub credit_check: Option<CreditReport>,
    pub processing_time: f64,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Free-form details merged in by status updates.
    #[serde(default)]
    pub details: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KycRecord {
    /// Minimal record written when a workflow run fails.
    pub fn error(customer_id: &str, application_id: Uuid, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            customer_id: customer_id.to_string(),
            application_id,
            status: KycStatus::Error,
            approved: false,
            risk_assessment: None,
            validation: None,
            documents: Vec::new(),
            identity_verification: None,
            credit_check: None,
            processing_time: 0.0,
            error_message: Some(message.into()),
            details: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.risk_assessment.as_ref().map(|r| r.risk_level)
    }
}

// ============ API Responses ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycOutcomeDetails {
    pub documents_processed: usize,
    pub identity_verified: bool,
    pub credit_score: i64,
    pub sanctions_clear: bool,
}

/// Summary returned to the caller after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycOutcome {
    pub status: KycStatus,
    pub customer_id: String,
    pub application_id: Uuid,
    #[serde(rename = "verification_score")]
    pub final_score: f64,
    pub risk_level: RiskLevel,
    pub approved: bool,
    pub processing_time: f64,
    pub details: KycOutcomeDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycStatusResponse {
    pub status: KycStatus,
    pub customer_id: String,
    pub approved: bool,
    /// `"unknown"` when the record carries no assessment.
    pub risk_level: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResponse {
    pub compliance_validation: ComplianceAssessment,
    pub regulatory_framework: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: KycStatus,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycStatistics {
    pub total_applications: usize,
    pub approved: usize,
    pub rejected: usize,
    pub errors: usize,
    /// Percentage of all applications that were approved.
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub status: Option<String>,
    pub approved: Option<bool>,
    pub risk_level: Option<String>,
}

impl SearchParams {
    /// Converts the query into store filters; absent parameters impose no constraint.
    pub fn into_filters(self) -> Map<String, Value> {
        let mut filters = Map::new();
        if let Some(status) = self.status.filter(|s| !s.is_empty()) {
            filters.insert("status".to_string(), Value::String(status));
        }
        if let Some(approved) = self.approved {
            filters.insert("approved".to_string(), Value::Bool(approved));
        }
        if let Some(level) = self.risk_level.filter(|s| !s.is_empty()) {
            filters.insert("risk_level".to_string(), Value::String(level));
        }
        filters
    }
}
