//! KYC onboarding workflow
//!
//! Runs one application through a fixed sequence of stages:
//! 1. Extract fields from every uploaded document
//! 2. Validate the applicant's personal info against the first document
//! 3. Verify identity and screen sanctions/PEP/adverse media
//! 4. Query the credit bureau
//! 5. Score risk and decide
//! 6. Persist the record
//!
//! Any failure persists an error record and is returned to the caller.
use crate::compliance::{assess_compliance, ComplianceAssessment, ComplianceRequest};
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::scoring::{self, RiskInputs};
use crate::services::KycProvider;
use crate::store::KycStore;
use crate::validation::{assess_document_quality, validate_personal_info};
use chrono::Utc;
use serde_json::Map;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Started,
    DocumentsExtracted,
    Validated,
    IdentityChecked,
    CreditChecked,
    RiskAssessed,
    Persisted,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStage::Started => "started",
            WorkflowStage::DocumentsExtracted => "documents_extracted",
            WorkflowStage::Validated => "validated",
            WorkflowStage::IdentityChecked => "identity_checked",
            WorkflowStage::CreditChecked => "credit_checked",
            WorkflowStage::RiskAssessed => "risk_assessed",
            WorkflowStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

pub struct KycOrchestrator {
    provider: Arc<dyn KycProvider>,
    store: Arc<KycStore>,
    reject_invalid: bool,
}

impl KycOrchestrator {
    pub fn new(provider: Arc<dyn KycProvider>, store: Arc<KycStore>) -> Self {
        Self {
            provider,
            store,
            reject_invalid: false,
        }
    }

    /// Fail applications whose personal info does not validate.
    pub fn reject_invalid_applications(mut self, reject: bool) -> Self {
        self.reject_invalid = reject;
        self
    }

    pub fn store(&self) -> &Arc<KycStore> {
        &self.store
    }

    /// Runs the full workflow for one application.
    ///
    /// On failure an error record replaces whatever the store held for the
    /// customer, and the failure is returned.
    pub async fn process_application(
        &self,
        customer_id: &str,
        documents: Vec<DocumentUpload>,
        personal_info: &PersonalInfo,
    ) -> Result<KycOutcome, AppError> {
        let application_id = Uuid::new_v4();
        tracing::info!(
            "Starting KYC for customer {} (application {}, provider {}, {} documents)",
            customer_id,
            application_id,
            self.provider.name(),
            documents.len()
        );

        match self
            .run(customer_id, application_id, &documents, personal_info)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("KYC failed for {}: {}", customer_id, e);
                self.store
                    .save(KycRecord::error(customer_id, application_id, e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        customer_id: &str,
        application_id: Uuid,
        documents: &[DocumentUpload],
        personal_info: &PersonalInfo,
    ) -> Result<KycOutcome, AppError> {
        stage(customer_id, WorkflowStage::Started);

        let mut document_results = Vec::with_capacity(documents.len());
        for document in documents {
            tracing::debug!("Extracting {} document", document.document_type);
            let extraction = self
                .provider
                .extract_document(document)
                .await
                .with_context(|| format!("extracting {} document", document.document_type))?;

            let quality = assess_document_quality(&extraction);
            if !quality.valid {
                tracing::warn!("Document quality issues: {:?}", quality.issues);
            }

            document_results.push(DocumentResult {
                filename: document.filename.clone(),
                size_bytes: document.content.len(),
                sha256: document.digest(),
                extraction,
                quality,
            });
        }
        stage(customer_id, WorkflowStage::DocumentsExtracted);

        let extractions: Vec<DocumentExtraction> = document_results
            .iter()
            .map(|d| d.extraction.clone())
            .collect();
        let validation = validate_personal_info(personal_info, &extractions);
        if !validation.valid {
            tracing::warn!("Validation errors for {}: {:?}", customer_id, validation.errors);
            if self.reject_invalid {
                return Err(AppError::Validation(validation.errors.join("; ")));
            }
        }
        stage(customer_id, WorkflowStage::Validated);

        let (subject, lookup_id) = match extractions.first() {
            Some(first) => {
                let fields = &first.extracted_fields;
                let id = fields
                    .id_number
                    .as_deref()
                    .unwrap_or(personal_info.id_number.as_str());
                (IdentitySubject::Document(fields), id)
            }
            None => (
                IdentitySubject::Applicant(personal_info),
                personal_info.id_number.as_str(),
            ),
        };

        tracing::info!("Verifying identity for ID: {}", lookup_id);
        let identity = self
            .provider
            .verify_identity(subject)
            .await
            .context("identity verification")?;
        stage(customer_id, WorkflowStage::IdentityChecked);

        let credit = self
            .provider
            .check_credit(lookup_id)
            .await
            .context("credit bureau check")?;
        stage(customer_id, WorkflowStage::CreditChecked);

        let inputs = RiskInputs::from_reports(&identity, &credit);
        let mut assessment = scoring::assess(&inputs);
        let narrative = self
            .provider
            .decide(&inputs, assessment.final_score)
            .await
            .context("decision analysis")?;
        assessment.decision_model = narrative.model_used;
        assessment.decision_analysis = narrative.excerpt;
        stage(customer_id, WorkflowStage::RiskAssessed);

        let processing_time = extractions.iter().map(|d| d.processing_time).sum::<f64>()
            + identity.validation_time
            + credit.bureau_response_time;

        let outcome = KycOutcome {
            status: KycStatus::Completed,
            customer_id: customer_id.to_string(),
            application_id,
            final_score: assessment.final_score,
            risk_level: assessment.risk_level,
            approved: assessment.approved,
            processing_time,
            details: KycOutcomeDetails {
                documents_processed: document_results.len(),
                identity_verified: identity.identity_verified,
                credit_score: credit.credit_score,
                sanctions_clear: identity.sanctions_check == ScreeningStatus::Clear,
            },
        };

        let now = Utc::now();
        self.store
            .save(KycRecord {
                customer_id: customer_id.to_string(),
                application_id,
                status: KycStatus::Completed,
                approved: assessment.approved,
                risk_assessment: Some(assessment),
                validation: Some(validation),
                documents: document_results,
                identity_verification: Some(identity),
                credit_check: Some(credit),
                processing_time,
                error_message: None,
                details: Map::new(),
                created_at: now,
                updated_at: now,
            })
            .await;
        stage(customer_id, WorkflowStage::Persisted);

        tracing::info!(
            "✓ KYC completed for {}: score {:.3}, risk {}, approved {}",
            customer_id,
            outcome.final_score,
            outcome.risk_level,
            outcome.approved
        );
        Ok(outcome)
    }

    /// Current status summary for a customer.
    pub async fn get_status(&self, customer_id: &str) -> Result<KycStatusResponse, AppError> {
        let record = self.store.get(customer_id).await.ok_or_else(|| {
            AppError::NotFound(format!("No KYC record for customer {}", customer_id))
        })?;

        Ok(KycStatusResponse {
            status: record.status,
            customer_id: record.customer_id.clone(),
            approved: record.approved,
            risk_level: record
                .risk_level()
                .map(|level| level.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            last_updated: record.updated_at,
        })
    }

    /// Scores a KYC process against the applicable regulations.
    pub async fn validate_compliance(
        &self,
        request: &ComplianceRequest,
    ) -> Result<ComplianceAssessment, AppError> {
        let guidance = self
            .provider
            .regulatory_guidance(request)
            .await
            .context("regulatory guidance")?;
        tracing::debug!(
            "Regulatory guidance from {} sources (confidence {:.2})",
            guidance.sources.len(),
            guidance.confidence
        );

        let assessment = assess_compliance(request, guidance);
        tracing::info!(
            "Compliance score {:.3} (kyc {:.2}), compliant {}",
            assessment.compliance_score,
            assessment.kyc_score,
            assessment.is_compliant
        );
        Ok(assessment)
    }
}

fn stage(customer_id: &str, stage: WorkflowStage) {
    tracing::debug!(customer_id = customer_id, stage = %stage, "KYC stage reached");
}
