//! Conversion job endpoints: inspection, cancellation and operator retries.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use bookbinder_core::{
    bus::{publish_event, Channel, RetryConversion},
    ConversionJob, JobFilter, JobStatus, RetryAdmission, StoreError,
};

use super::handlers::{error_response, page, ErrorResponse};
use crate::state::AppState;

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<ConversionJob>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

/// Optional body for a retry request.
#[derive(Debug, Default, Deserialize)]
pub struct RetryJobBody {
    #[serde(default)]
    pub force: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RetryAcceptedResponse {
    pub book_name: String,
    pub admission: RetryAdmission,
}

/// List jobs, most recently updated first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut filter = JobFilter::new();
    if let Some(ref status) = params.status {
        match status.parse::<JobStatus>() {
            Ok(status) => filter = filter.with_status(status),
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        }
    }

    let count_filter = JobFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = match state.jobs().list(&count_filter) {
        Ok(jobs) => jobs.len(),
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let jobs = match state.jobs().list(&JobFilter {
        limit,
        offset,
        ..filter
    }) {
        Ok(jobs) => jobs,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    Ok(Json(ListJobsResponse {
        jobs,
        total,
        limit,
        offset,
    }))
}

/// Get one book's job row.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
) -> Result<Json<ConversionJob>, impl IntoResponse> {
    match state.jobs().get(&book_name) {
        Ok(Some(job)) => Ok(Json(job)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", book_name),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Mark a job cancelled. A conversion already running is not interrupted.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
) -> Result<Json<ConversionJob>, impl IntoResponse> {
    match state.jobs().cancel(&book_name) {
        Ok(job) => {
            info!("Cancelled conversion job for {}", book_name);
            Ok(Json(job))
        }
        Err(StoreError::NotFound(_)) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", book_name),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Ask the orchestrator to convert a book again from its backup.
///
/// Admission runs here first so an exhausted budget is answered with 409
/// instead of a silently dropped event. The orchestrator checks again when
/// it consumes the event.
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
    body: Option<Json<RetryJobBody>>,
) -> Result<(StatusCode, Json<RetryAcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    let force = body.and_then(|b| b.force).unwrap_or(false);

    let admission = match state.orchestrator().admit_retry(&book_name, force) {
        Ok(admission) => admission,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    if let RetryAdmission::Rejected {
        attempts,
        max_attempts,
    } = admission
    {
        warn!(
            "Rejected retry for {}: attempts {}/{}",
            book_name, attempts, max_attempts
        );
        return Err(error_response(
            StatusCode::CONFLICT,
            format!(
                "Retry budget exhausted for {}: attempts {}/{} (use force to override)",
                book_name, attempts, max_attempts
            ),
        ));
    }

    let catalog_item_id = match state.jobs().get(&book_name) {
        Ok(job) => job.and_then(|j| j.catalog_item_id),
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };
    let conversion_tracking_id = match state.tracking().get(&book_name) {
        Ok(row) => row.map(|t| t.id),
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let event = RetryConversion {
        book_name: book_name.clone(),
        catalog_item_id,
        conversion_tracking_id,
        force,
    };
    if let Err(e) = publish_event(state.bus(), Channel::RetryConversion, &event).await {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Failed to publish retry: {}", e),
        ));
    }

    info!("Queued retry for {} ({})", book_name, admission.label());
    Ok((
        StatusCode::ACCEPTED,
        Json(RetryAcceptedResponse {
            book_name,
            admission,
        }),
    ))
}
