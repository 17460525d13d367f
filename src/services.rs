use crate::ai_client::{excerpt, simulated_completion, AiServiceClient, Completion};
use crate::compliance::{ComplianceRequest, RegulatoryGuidance, RegulatorySource};
use crate::config::{Config, ProviderMode};
use crate::errors::AppError;
use crate::models::*;
use crate::scoring::RiskInputs;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const EXTRACTION_MODEL: &str = "Saptiva OCR";
pub const IDENTITY_MODEL: &str = "Saptiva Guard";
pub const CREDIT_MODEL: &str = "Saptiva Ops";
pub const DECISION_MODEL: &str = "Saptiva KAL";
pub const COMPLIANCE_MODEL: &str = "Saptiva Cortex";

const EXTRACTION_MAX_TOKENS: u32 = 200;
const IDENTITY_MAX_TOKENS: u32 = 150;
const CREDIT_MAX_TOKENS: u32 = 200;
const DECISION_MAX_TOKENS: u32 = 150;
const COMPLIANCE_MAX_TOKENS: u32 = 500;

const EXTRACTION_EXCERPT_CHARS: usize = 100;
const ANALYSIS_EXCERPT_CHARS: usize = 200;

/// The external capabilities the KYC workflow depends on.
///
/// Any of these may fail; the orchestrator records the failure and
/// propagates it to the caller.
#[async_trait]
pub trait KycProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract_document(
        &self,
        document: &DocumentUpload,
    ) -> Result<DocumentExtraction, AppError>;

    async fn verify_identity(
        &self,
        subject: IdentitySubject<'_>,
    ) -> Result<IdentityVerification, AppError>;

    async fn check_credit(&self, id_number: &str) -> Result<CreditReport, AppError>;

    /// Produces the narrative that accompanies a scored decision.
    async fn decide(&self, inputs: &RiskInputs, final_score: f64) -> Result<AiAnalysis, AppError>;

    /// Looks up the regulations that apply to a KYC process.
    async fn regulatory_guidance(
        &self,
        request: &ComplianceRequest,
    ) -> Result<RegulatoryGuidance, AppError>;
}

// ============ Canned Provider Data ============

fn canned_extracted_fields() -> ExtractedDocumentFields {
    ExtractedDocumentFields {
        name: Some("Juan Pérez García".to_string()),
        id_number: Some("CURP123456789ABCDEF".to_string()),
        birth_date: Some("1990-01-01".to_string()),
        address: Some("Calle Principal 123, Col. Centro".to_string()),
        phone: Some("+52 55 1234 5678".to_string()),
        nationality: Some("MEXICANA".to_string()),
    }
}

fn canned_extraction(document_type: &str, analysis: AiAnalysis) -> DocumentExtraction {
    DocumentExtraction {
        document_type: document_type.to_string(),
        extracted_fields: canned_extracted_fields(),
        confidence_score: 0.95,
        processing_time: 0.5,
        analysis,
    }
}

fn canned_identity(analysis: AiAnalysis) -> IdentityVerification {
    IdentityVerification {
        identity_verified: true,
        sanctions_check: ScreeningStatus::Clear,
        pep_check: ScreeningStatus::Clear,
        adverse_media: ScreeningStatus::Clear,
        risk_score: 0.15,
        validation_time: 0.8,
        ai_confidence: Some(0.94),
        fraud_indicators: Vec::new(),
        analysis,
    }
}

fn canned_credit(analysis: AiAnalysis) -> CreditReport {
    CreditReport {
        credit_score: 720,
        payment_history: "good".to_string(),
        debt_ratio: 0.3,
        active_accounts: 3,
        bureau_response_time: 1.5,
        predictive_score: Some(0.82),
        risk_factors: vec![
            "stable_income".to_string(),
            "good_payment_pattern".to_string(),
        ],
        recommendation: "approve_with_standard_terms".to_string(),
        analysis,
    }
}

fn canned_guidance(analysis: AiAnalysis) -> RegulatoryGuidance {
    let sources: Vec<RegulatorySource> = [
        ("CNBV", "General KYC provisions", 0.91),
        ("UIF", "Suspicious operations reporting", 0.86),
        ("BANXICO", "Anti money laundering controls", 0.78),
    ]
    .into_iter()
    .map(|(source, title, similarity)| RegulatorySource {
        source: source.to_string(),
        title: title.to_string(),
        similarity,
    })
    .collect();

    let confidence = sources.iter().map(|s| s.similarity).sum::<f64>() / sources.len() as f64;
    RegulatoryGuidance {
        sources,
        confidence,
        analysis,
    }
}

fn analysis(model: &str, completion: Completion, max_chars: usize) -> AiAnalysis {
    AiAnalysis {
        model_used: model.to_string(),
        live_call: completion.live,
        excerpt: excerpt(&completion.content, max_chars),
    }
}

/// Reads a JSON object embedded in completion text into document fields.
///
/// Returns `None` unless the object names at least a holder or an id.
pub fn parse_extracted_fields(content: &str) -> Option<ExtractedDocumentFields> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    let fields: ExtractedDocumentFields = serde_json::from_str(&content[start..=end]).ok()?;
    if fields.name.is_none() && fields.id_number.is_none() {
        return None;
    }
    Some(fields)
}

// ============ Simulated Provider ============

/// Provider that never leaves the process. Used for demos, tests and when
/// no API key is configured.
#[derive(Debug, Clone, Default)]
pub struct SimulatedKycProvider;

impl SimulatedKycProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KycProvider for SimulatedKycProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn extract_document(
        &self,
        document: &DocumentUpload,
    ) -> Result<DocumentExtraction, AppError> {
        tracing::debug!(
            "Simulating extraction for {} document ({} bytes)",
            document.document_type,
            document.content.len()
        );
        let completion = simulated_completion(EXTRACTION_MODEL);
        Ok(canned_extraction(
            &document.document_type,
            analysis(EXTRACTION_MODEL, completion, EXTRACTION_EXCERPT_CHARS),
        ))
    }

    async fn verify_identity(
        &self,
        _subject: IdentitySubject<'_>,
    ) -> Result<IdentityVerification, AppError> {
        let completion = simulated_completion(IDENTITY_MODEL);
        Ok(canned_identity(analysis(
            IDENTITY_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }

    async fn check_credit(&self, _id_number: &str) -> Result<CreditReport, AppError> {
        let completion = simulated_completion(CREDIT_MODEL);
        Ok(canned_credit(analysis(
            CREDIT_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }

    async fn decide(&self, _inputs: &RiskInputs, _final_score: f64) -> Result<AiAnalysis, AppError> {
        let completion = simulated_completion(DECISION_MODEL);
        Ok(analysis(DECISION_MODEL, completion, ANALYSIS_EXCERPT_CHARS))
    }

    async fn regulatory_guidance(
        &self,
        _request: &ComplianceRequest,
    ) -> Result<RegulatoryGuidance, AppError> {
        let completion = simulated_completion(COMPLIANCE_MODEL);
        Ok(canned_guidance(analysis(
            COMPLIANCE_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }
}

// ============ Live Provider ============

/// Provider backed by the chat-completions API. Scores stay on the canned
/// baseline; the model contributes extracted fields and narrative.
#[derive(Clone)]
pub struct LiveKycProvider {
    client: AiServiceClient,
}

impl LiveKycProvider {
    pub fn new(client: AiServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KycProvider for LiveKycProvider {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn extract_document(
        &self,
        document: &DocumentUpload,
    ) -> Result<DocumentExtraction, AppError> {
        let prompt = format!(
            "Extract the holder's data from this {} identity document ({} bytes, sha256 {}). \
             Reply with a JSON object with the keys name, id_number, birth_date (YYYY-MM-DD), \
             address, phone and nationality.",
            document.document_type,
            document.content.len(),
            document.digest()
        );

        let completion = self
            .client
            .complete_or_simulate(EXTRACTION_MODEL, &prompt, EXTRACTION_MAX_TOKENS)
            .await;

        let parsed = if completion.live {
            parse_extracted_fields(&completion.content)
        } else {
            None
        };

        let mut extraction = canned_extraction(&document.document_type, AiAnalysis::default());
        if let Some(fields) = parsed {
            tracing::info!("Using model-extracted fields for {} document", document.document_type);
            extraction.extracted_fields = fields;
        }
        extraction.analysis = analysis(EXTRACTION_MODEL, completion, EXTRACTION_EXCERPT_CHARS);

        Ok(extraction)
    }

    async fn verify_identity(
        &self,
        subject: IdentitySubject<'_>,
    ) -> Result<IdentityVerification, AppError> {
        let prompt = format!(
            "Assess identity fraud risk and screen against sanctions, PEP and adverse media \
             lists for: name={}, id={}",
            subject.name().unwrap_or("unknown"),
            subject.id_number().unwrap_or("unknown")
        );

        let completion = self
            .client
            .complete_or_simulate(IDENTITY_MODEL, &prompt, IDENTITY_MAX_TOKENS)
            .await;

        Ok(canned_identity(analysis(
            IDENTITY_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }

    async fn check_credit(&self, id_number: &str) -> Result<CreditReport, AppError> {
        let prompt = format!(
            "Analyze the credit profile and payment behaviour for customer id {} and give a \
             lending recommendation.",
            id_number
        );

        let completion = self
            .client
            .complete_or_simulate(CREDIT_MODEL, &prompt, CREDIT_MAX_TOKENS)
            .await;

        Ok(canned_credit(analysis(
            CREDIT_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }

    async fn decide(&self, inputs: &RiskInputs, final_score: f64) -> Result<AiAnalysis, AppError> {
        let prompt = format!(
            "Explain a KYC onboarding decision. Final score {:.3}; credit score {}; identity risk \
             {:.2}; AI confidence {:.2}; predictive score {:.2}.",
            final_score,
            inputs.credit_score,
            inputs.identity_risk,
            inputs.ai_confidence,
            inputs.predictive_score
        );

        let completion = self
            .client
            .complete_or_simulate(DECISION_MODEL, &prompt, DECISION_MAX_TOKENS)
            .await;

        Ok(analysis(DECISION_MODEL, completion, ANALYSIS_EXCERPT_CHARS))
    }

    async fn regulatory_guidance(
        &self,
        request: &ComplianceRequest,
    ) -> Result<RegulatoryGuidance, AppError> {
        let documents = if request.documents_validated.is_empty() {
            "none".to_string()
        } else {
            request.documents_validated.join(", ")
        };
        let prompt = format!(
            "As an expert in Mexican banking regulation (CNBV, CONDUSEF, BANXICO, UIF, SHCP), \
             does this KYC process comply? Identity verified: {}; credit score: {}; sanctions \
             clear: {}; validated documents: {}.",
            request.identity_verified, request.credit_score, request.sanctions_clear, documents
        );

        let completion = self
            .client
            .complete_or_simulate(COMPLIANCE_MODEL, &prompt, COMPLIANCE_MAX_TOKENS)
            .await;

        Ok(canned_guidance(analysis(
            COMPLIANCE_MODEL,
            completion,
            ANALYSIS_EXCERPT_CHARS,
        )))
    }
}

/// Builds the provider selected by configuration.
pub fn build_provider(config: &Config) -> Result<Arc<dyn KycProvider>, AppError> {
    match config.provider_mode {
        ProviderMode::Simulated => {
            tracing::info!("Using simulated KYC provider");
            Ok(Arc::new(SimulatedKycProvider::new()))
        }
        ProviderMode::Live => {
            let api_key = config.ai_api_key.clone().ok_or_else(|| {
                AppError::InternalError("Live provider requires an AI API key".to_string())
            })?;
            let client = AiServiceClient::new(
                config.ai_base_url.clone(),
                api_key,
                Duration::from_secs(config.ai_timeout_secs),
            )?;
            tracing::info!("Using live KYC provider at {}", config.ai_base_url);
            Ok(Arc::new(LiveKycProvider::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_extraction_keeps_document_type() {
        let provider = SimulatedKycProvider::new();
        let doc = DocumentUpload::new(b"img".to_vec(), Some("ine.png".to_string()));

        let extraction = provider.extract_document(&doc).await.unwrap();

        assert_eq!(extraction.document_type, "png");
        assert_eq!(extraction.confidence_score, 0.95);
        assert_eq!(
            extraction.extracted_fields.id_number.as_deref(),
            Some("CURP123456789ABCDEF")
        );
        assert_eq!(extraction.analysis.model_used, EXTRACTION_MODEL);
        assert!(!extraction.analysis.live_call);
    }

    #[tokio::test]
    async fn simulated_reports_match_reference_profile() {
        let provider = SimulatedKycProvider::new();
        let identity = provider
            .verify_identity(IdentitySubject::Document(&canned_extracted_fields()))
            .await
            .unwrap();
        let credit = provider.check_credit("CURP123456789ABCDEF").await.unwrap();

        assert!(identity.identity_verified);
        assert_eq!(identity.sanctions_check, ScreeningStatus::Clear);
        assert_eq!(identity.ai_confidence, Some(0.94));
        assert_eq!(credit.credit_score, 720);
        assert_eq!(credit.predictive_score, Some(0.82));
        assert_eq!(credit.analysis.excerpt, "Processed successfully with Saptiva Ops");
    }

    #[tokio::test]
    async fn simulated_guidance_confidence_is_mean_similarity() {
        let provider = SimulatedKycProvider::new();
        let guidance = provider
            .regulatory_guidance(&ComplianceRequest::default())
            .await
            .unwrap();

        assert_eq!(guidance.sources.len(), 3);
        assert_eq!(guidance.sources[0].source, "CNBV");
        assert!((guidance.confidence - 0.85).abs() < 1e-9);
        assert_eq!(guidance.analysis.model_used, COMPLIANCE_MODEL);
        assert!(!guidance.analysis.live_call);
    }

    #[test]
    fn parses_fields_from_wrapped_json() {
        let content = "Here you go:\n{\"name\": \"ANA LOPEZ\", \"id_number\": \"LOPA800101\"}\nDone.";
        let fields = parse_extracted_fields(content).unwrap();
        assert_eq!(fields.name.as_deref(), Some("ANA LOPEZ"));
        assert_eq!(fields.id_number.as_deref(), Some("LOPA800101"));
        assert!(fields.address.is_none());
    }

    #[test]
    fn rejects_content_without_usable_fields() {
        assert!(parse_extracted_fields("Processed successfully with Saptiva OCR").is_none());
        assert!(parse_extracted_fields("{\"nationality\": \"MEXICANA\"}").is_none());
        assert!(parse_extracted_fields("} nope {").is_none());
    }
}
