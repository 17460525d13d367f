/// Workflow tests for the KYC orchestrator
/// Uses the simulated provider and a scripted provider that fails on demand
use async_trait::async_trait;
use kyc_onboard_api::compliance::{ComplianceRequest, RegulatoryGuidance};
use kyc_onboard_api::errors::AppError;
use kyc_onboard_api::models::*;
use kyc_onboard_api::orchestrator::KycOrchestrator;
use kyc_onboard_api::scoring::{RiskInputs, RiskLevel};
use kyc_onboard_api::services::{KycProvider, SimulatedKycProvider, DECISION_MODEL};
use kyc_onboard_api::store::KycStore;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FailAt {
    Nothing,
    Extraction,
    Identity,
    Credit,
    Decision,
    Guidance,
}

/// Delegates to the simulated provider, records credit lookups and fails
/// at the configured stage.
struct ScriptedProvider {
    inner: SimulatedKycProvider,
    fail_at: FailAt,
    credit_lookups: Mutex<Vec<String>>,
    identity_subjects: Mutex<Vec<Option<String>>>,
}

impl ScriptedProvider {
    fn new(fail_at: FailAt) -> Self {
        Self {
            inner: SimulatedKycProvider::new(),
            fail_at,
            credit_lookups: Mutex::new(Vec::new()),
            identity_subjects: Mutex::new(Vec::new()),
        }
    }

    fn fail_if(&self, stage: FailAt, message: &str) -> Result<(), AppError> {
        if self.fail_at == stage {
            Err(AppError::ExternalApiError(message.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KycProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract_document(
        &self,
        document: &DocumentUpload,
    ) -> Result<DocumentExtraction, AppError> {
        self.fail_if(FailAt::Extraction, "OCR unavailable")?;
        self.inner.extract_document(document).await
    }

    async fn verify_identity(
        &self,
        subject: IdentitySubject<'_>,
    ) -> Result<IdentityVerification, AppError> {
        self.fail_if(FailAt::Identity, "watchlist service down")?;
        self.identity_subjects
            .lock()
            .unwrap()
            .push(subject.name().map(str::to_string));
        self.inner.verify_identity(subject).await
    }

    async fn check_credit(&self, id_number: &str) -> Result<CreditReport, AppError> {
        self.fail_if(FailAt::Credit, "bureau down")?;
        self.credit_lookups.lock().unwrap().push(id_number.to_string());
        self.inner.check_credit(id_number).await
    }

    async fn decide(&self, inputs: &RiskInputs, final_score: f64) -> Result<AiAnalysis, AppError> {
        self.fail_if(FailAt::Decision, "narrative model down")?;
        self.inner.decide(inputs, final_score).await
    }

    async fn regulatory_guidance(
        &self,
        request: &ComplianceRequest,
    ) -> Result<RegulatoryGuidance, AppError> {
        self.fail_if(FailAt::Guidance, "regulatory corpus offline")?;
        self.inner.regulatory_guidance(request).await
    }
}

fn applicant() -> PersonalInfo {
    PersonalInfo {
        name: "Roberto Carlos Díaz".to_string(),
        id_number: "DIAR880215HNLZBB07".to_string(),
        birth_date: "1988-02-15".to_string(),
        address: "Av. Constitución 400, Monterrey".to_string(),
        phone: "8181234567".to_string(),
        email: None,
        curp: None,
        rfc: None,
    }
}

fn upload() -> DocumentUpload {
    DocumentUpload::new(b"scan".to_vec(), Some("ine.jpg".to_string()))
}

fn setup(fail_at: FailAt) -> (Arc<ScriptedProvider>, Arc<KycStore>, KycOrchestrator) {
    let provider = Arc::new(ScriptedProvider::new(fail_at));
    let store = Arc::new(KycStore::new());
    let orchestrator = KycOrchestrator::new(provider.clone(), store.clone());
    (provider, store, orchestrator)
}

#[tokio::test]
async fn test_reference_application_is_approved() {
    let (_, store, orchestrator) = setup(FailAt::Nothing);

    let outcome = orchestrator
        .process_application("C-001", vec![], &applicant())
        .await
        .unwrap();

    assert_eq!(outcome.status, KycStatus::Completed);
    assert_eq!(outcome.risk_level, RiskLevel::Low);
    assert!(outcome.approved);
    assert!((outcome.final_score - 0.858).abs() < 1e-3);
    // 0.8 identity + 1.5 bureau, no documents
    assert!((outcome.processing_time - 2.3).abs() < 1e-9);
    assert_eq!(outcome.details.credit_score, 720);
    assert_eq!(outcome.details.documents_processed, 0);

    let record = store.get("C-001").await.unwrap();
    assert_eq!(record.status, KycStatus::Completed);
    assert_eq!(record.application_id, outcome.application_id);
    assert!(record.approved);
    assert!(record.validation.as_ref().unwrap().valid);
    let assessment = record.risk_assessment.unwrap();
    assert_eq!(assessment.decision_model, DECISION_MODEL);
    assert_eq!(
        assessment.decision_analysis,
        "Processed successfully with Saptiva KAL"
    );
}

#[tokio::test]
async fn test_outcome_serializes_verification_score() {
    let (_, _, orchestrator) = setup(FailAt::Nothing);
    let outcome = orchestrator
        .process_application("C-002", vec![], &applicant())
        .await
        .unwrap();

    let value = serde_json::to_value(&outcome).unwrap();
    assert!(value.get("verification_score").is_some());
    assert_eq!(value["risk_level"], "low");
    assert_eq!(value["status"], "completed");
}

#[tokio::test]
async fn test_identity_subject_and_credit_id_follow_documents() {
    let (provider, _, orchestrator) = setup(FailAt::Nothing);

    orchestrator
        .process_application("C-003", vec![], &applicant())
        .await
        .unwrap();
    orchestrator
        .process_application("C-004", vec![upload(), upload()], &applicant())
        .await
        .unwrap();

    let lookups = provider.credit_lookups.lock().unwrap().clone();
    assert_eq!(
        lookups,
        vec![
            "DIAR880215HNLZBB07".to_string(),
            "CURP123456789ABCDEF".to_string()
        ]
    );

    let subjects = provider.identity_subjects.lock().unwrap().clone();
    assert_eq!(subjects[0].as_deref(), Some("Roberto Carlos Díaz"));
    assert_eq!(subjects[1].as_deref(), Some("Juan Pérez García"));
}

#[tokio::test]
async fn test_document_mismatch_is_recorded_but_not_fatal() {
    let (_, store, orchestrator) = setup(FailAt::Nothing);

    let outcome = orchestrator
        .process_application("C-005", vec![upload()], &applicant())
        .await
        .unwrap();
    assert_eq!(outcome.details.documents_processed, 1);

    let record = store.get("C-005").await.unwrap();
    let validation = record.validation.unwrap();
    assert!(!validation.valid);
    assert!(validation
        .errors
        .contains(&"ID number does not match document".to_string()));
    assert_eq!(record.documents.len(), 1);
    assert_eq!(record.documents[0].filename.as_deref(), Some("ine.jpg"));
    assert_eq!(record.documents[0].sha256.len(), 64);
}

#[tokio::test]
async fn test_invalid_application_rejected_when_gated() {
    let provider = Arc::new(ScriptedProvider::new(FailAt::Nothing));
    let store = Arc::new(KycStore::new());
    let orchestrator = KycOrchestrator::new(provider.clone(), store.clone())
        .reject_invalid_applications(true);

    let info = PersonalInfo {
        phone: "12345".to_string(),
        ..applicant()
    };
    let err = orchestrator
        .process_application("C-006", vec![], &info)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(provider.credit_lookups.lock().unwrap().is_empty());

    let record = store.get("C-006").await.unwrap();
    assert_eq!(record.status, KycStatus::Error);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Validation failed: Invalid format for phone: 12345")
    );
}

#[tokio::test]
async fn test_failure_persists_error_record_and_propagates() {
    for (fail_at, expected) in [
        (FailAt::Extraction, "OCR unavailable"),
        (FailAt::Identity, "watchlist service down"),
        (FailAt::Credit, "bureau down"),
        (FailAt::Decision, "narrative model down"),
    ] {
        let (_, store, orchestrator) = setup(fail_at);

        let err = orchestrator
            .process_application("C-007", vec![upload()], &applicant())
            .await
            .unwrap_err();
        assert!(err.to_string().contains(expected), "{}", err);
        assert!(matches!(err, AppError::WithContext { .. }), "{:?}", err);

        let record = store.get("C-007").await.unwrap();
        assert_eq!(record.status, KycStatus::Error);
        assert!(!record.approved);
        assert!(record.risk_assessment.is_none());
        assert!(record.error_message.unwrap().contains(expected));

        let status = orchestrator.get_status("C-007").await.unwrap();
        assert_eq!(status.risk_level, "unknown");
    }
}

#[tokio::test]
async fn test_failed_rerun_replaces_completed_record() {
    let (_, store, orchestrator) = setup(FailAt::Nothing);
    orchestrator
        .process_application("C-008", vec![], &applicant())
        .await
        .unwrap();

    let failing = KycOrchestrator::new(Arc::new(ScriptedProvider::new(FailAt::Credit)), store.clone());
    assert!(failing
        .process_application("C-008", vec![], &applicant())
        .await
        .is_err());

    let stats = store.statistics().await;
    assert_eq!(stats.total_applications, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.approved, 0);
}

#[tokio::test]
async fn test_decision_failure_reports_stage() {
    let (_, store, orchestrator) = setup(FailAt::Decision);

    let err = orchestrator
        .process_application("C-009", vec![], &applicant())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "decision analysis: External API error: narrative model down"
    );
    assert_eq!(
        store.get("C-009").await.unwrap().error_message.as_deref(),
        Some("decision analysis: External API error: narrative model down")
    );
}

#[tokio::test]
async fn test_compliance_uses_provider_guidance() {
    let (_, store, orchestrator) = setup(FailAt::Nothing);
    let request = ComplianceRequest {
        identity_verified: true,
        credit_score: 720,
        sanctions_clear: true,
        documents_validated: vec!["ine".to_string(), "proof_of_address".to_string()],
    };

    let assessment = orchestrator.validate_compliance(&request).await.unwrap();

    assert!(assessment.is_compliant);
    assert!((assessment.regulatory_confidence - 0.85).abs() < 1e-9);
    // 1.0 * 0.7 + 0.85 * 0.3
    assert!((assessment.compliance_score - 0.955).abs() < 1e-9);
    assert_eq!(assessment.regulatory_sources.len(), 3);
    assert_eq!(
        assessment.regulatory_analysis,
        "Processed successfully with Saptiva Cortex"
    );
    // compliance checks leave no KYC record behind
    assert_eq!(store.statistics().await.total_applications, 0);
}

#[tokio::test]
async fn test_compliance_guidance_failure_propagates() {
    let (_, _, orchestrator) = setup(FailAt::Guidance);

    let err = orchestrator
        .validate_compliance(&ComplianceRequest::default())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("regulatory guidance: "), "{}", err);
    assert!(err.to_string().contains("regulatory corpus offline"));
}
