use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::compliance::{ComplianceRequest, REGULATORY_FRAMEWORK};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::orchestrator::KycOrchestrator;
use crate::store::KycStore;

/// Shared state for all handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    pub orchestrator: KycOrchestrator,
    pub store: Arc<KycStore>,
    /// Customers with an application currently in flight, keyed by customer id.
    /// Value is the unix timestamp the run started.
    pub processing_customers: Cache<String, i64>,
}

/// Routes exempt from rate limiting.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

/// KYC workflow and record routes.
pub fn kyc_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/kyc/process", post(process_kyc))
        .route("/kyc/process-simple", post(process_kyc_simple))
        .route(
            "/kyc/status/:customer_id",
            get(get_kyc_status).put(update_kyc_status),
        )
        .route("/kyc/stats", get(get_kyc_statistics))
        .route("/kyc/search", get(search_kyc_records))
        .route("/kyc/validate-compliance", post(validate_compliance))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "KYC Onboard API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "process_kyc": "/kyc/process",
            "process_kyc_simple": "/kyc/process-simple",
            "kyc_status": "/kyc/status/{customer_id}",
            "statistics": "/kyc/stats",
            "search": "/kyc/search",
            "validate_compliance": "/kyc/validate-compliance"
        }
    }))
}

/// Health check endpoint.
///
/// Returns the service status, version and whether the AI API is configured.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "kyc-onboard-api",
            "version": env!("CARGO_PKG_VERSION"),
            "ai_api_configured": state.config.ai_api_key.is_some(),
            "provider_mode": format!("{:?}", state.config.provider_mode).to_lowercase()
        })),
    )
}

/// POST /kyc/process
///
/// Multipart body: a `request` part holding the JSON application and any
/// number of file parts. Plain form fields are ignored.
pub async fn process_kyc(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<KycOutcome>, AppError> {
    let mut request: Option<KycRequest> = None;
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);

        if name == "request" {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Unreadable request part: {}", e)))?;
            request = Some(serde_json::from_str(&text)?);
        } else if filename.is_some() || name == "documents" {
            let content = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Unreadable document part: {}", e)))?;
            documents.push(DocumentUpload::new(content.to_vec(), filename));
        } else {
            tracing::debug!("Ignoring non-file form field '{}'", name);
        }
    }

    let request =
        request.ok_or_else(|| AppError::BadRequest("Missing 'request' part".to_string()))?;
    tracing::info!(
        "POST /kyc/process - customer_id: {}, documents: {}",
        request.customer_id,
        documents.len()
    );

    run_application(state, request, documents).await.map(Json)
}

/// POST /kyc/process-simple
///
/// Same workflow without documents; identity checks run on the stated data.
pub async fn process_kyc_simple(
    State(state): State<Arc<AppState>>,
    Json(request): Json<KycRequest>,
) -> Result<Json<KycOutcome>, AppError> {
    tracing::info!("POST /kyc/process-simple - customer_id: {}", request.customer_id);
    run_application(state, request, Vec::new()).await.map(Json)
}

/// Runs one application with the in-flight marker held for its duration.
///
/// The workflow runs on its own task, so a dropped connection neither
/// aborts it nor leaves the customer marked as in flight.
async fn run_application(
    state: Arc<AppState>,
    request: KycRequest,
    documents: Vec<DocumentUpload>,
) -> Result<KycOutcome, AppError> {
    let customer_id = request.customer_id.trim().to_string();
    if customer_id.is_empty() {
        return Err(AppError::BadRequest("customer_id is required".to_string()));
    }

    // First writer wins; the entry is only fresh for the request that inserted it.
    let now = chrono::Utc::now().timestamp();
    let entry = state
        .processing_customers
        .entry(customer_id.clone())
        .or_insert(now)
        .await;
    if !entry.is_fresh() {
        let seconds_ago = now - entry.into_value();
        tracing::warn!(
            "Duplicate application blocked for {} (in flight for {}s)",
            customer_id,
            seconds_ago
        );
        return Err(AppError::Conflict(format!(
            "Application for customer {} already in progress",
            customer_id
        )));
    }

    let task_state = state.clone();
    let task_customer_id = customer_id.clone();
    let run = tokio::spawn(async move {
        let result = task_state
            .orchestrator
            .process_application(&task_customer_id, documents, &request.personal_info)
            .await;
        task_state
            .processing_customers
            .invalidate(&task_customer_id)
            .await;
        result
    });

    match run.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("KYC task for {} did not complete: {}", customer_id, e);
            state.processing_customers.invalidate(&customer_id).await;
            Err(AppError::InternalError(format!(
                "KYC task for {} did not complete",
                customer_id
            )))
        }
    }
}

/// GET /kyc/status/:customer_id
pub async fn get_kyc_status(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<Json<KycStatusResponse>, AppError> {
    tracing::info!("GET /kyc/status/{}", customer_id);
    let status = state.orchestrator.get_status(&customer_id).await?;
    Ok(Json(status))
}

/// PUT /kyc/status/:customer_id
pub async fn update_kyc_status(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Json(update): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    tracing::info!(
        "PUT /kyc/status/{} - status: {}",
        customer_id,
        update.status.as_str()
    );

    if !state
        .store
        .update_status(&customer_id, update.status, update.details)
        .await
    {
        return Err(AppError::NotFound(format!(
            "No KYC record for customer {}",
            customer_id
        )));
    }

    Ok(Json(json!({
        "message": "Status updated",
        "customer_id": customer_id,
        "status": update.status
    })))
}

/// GET /kyc/stats
pub async fn get_kyc_statistics(State(state): State<Arc<AppState>>) -> Json<KycStatistics> {
    Json(state.store.statistics().await)
}

/// GET /kyc/search?status=&approved=&risk_level=
pub async fn search_kyc_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<Value> {
    let filters = params.into_filters();
    tracing::info!("GET /kyc/search - filters: {:?}", filters);

    let results = state.store.search(&filters).await;
    Json(json!({
        "count": results.len(),
        "results": results
    }))
}

/// POST /kyc/validate-compliance
pub async fn validate_compliance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComplianceRequest>,
) -> Result<Json<ComplianceResponse>, AppError> {
    tracing::info!(
        "POST /kyc/validate-compliance - identity_verified: {}, documents: {}",
        request.identity_verified,
        request.documents_validated.len()
    );

    let assessment = state.orchestrator.validate_compliance(&request).await?;
    Ok(Json(ComplianceResponse {
        compliance_validation: assessment,
        regulatory_framework: REGULATORY_FRAMEWORK.to_string(),
    }))
}
