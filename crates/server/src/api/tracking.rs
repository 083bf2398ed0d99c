use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bookbinder_core::{ConversionTracking, TrackingFilter, TrackingStatus};

use super::handlers::{error_response, page};
use crate::state::AppState;

/// Query parameters for listing tracking rows.
///
/// `status` takes a comma-separated list, e.g. `pending,converting`.
#[derive(Debug, Deserialize)]
pub struct ListTrackingParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListTrackingResponse {
    pub tracking: Vec<ConversionTracking>,
    pub limit: i64,
    pub offset: i64,
}

/// List per-book conversion progress, most recently updated first.
pub async fn list_tracking(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTrackingParams>,
) -> Result<Json<ListTrackingResponse>, impl IntoResponse> {
    let (limit, offset) = page(params.limit, params.offset);

    let statuses = match params.status.as_deref() {
        Some(raw) => match parse_statuses(raw) {
            Ok(statuses) => statuses,
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        },
        None => Vec::new(),
    };

    let mut filter = TrackingFilter::new()
        .with_statuses(&statuses)
        .with_limit(limit);
    filter.offset = offset;

    match state.tracking().list(&filter) {
        Ok(tracking) => Ok(Json(ListTrackingResponse {
            tracking,
            limit,
            offset,
        })),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

fn parse_statuses(raw: &str) -> Result<Vec<TrackingStatus>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
