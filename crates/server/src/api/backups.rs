//! Backup snapshot endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use bookbinder_core::{BackupError, BackupInfo, ReleaseOutcome};

use super::handlers::error_response;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListBackupsResponse {
    pub backups: Vec<BackupInfo>,
    pub retention: u32,
}

#[derive(Debug, Serialize)]
pub struct DeleteBackupResponse {
    pub deleted: String,
}

/// Optional body for a release callback.
#[derive(Debug, Default, Deserialize)]
pub struct ReleaseBackupBody {
    #[serde(default, alias = "rss_item_id")]
    pub catalog_item_id: Option<i64>,
}

/// List all snapshots, newest first.
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListBackupsResponse>, impl IntoResponse> {
    match state.backups().list() {
        Ok(backups) => Ok(Json(ListBackupsResponse {
            backups,
            retention: state.backups().retention(),
        })),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Delete one snapshot by directory name.
pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteBackupResponse>, impl IntoResponse> {
    match state.backups().delete_by_name(&name).await {
        Ok(true) => Ok(Json(DeleteBackupResponse { deleted: name })),
        Ok(false) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Backup not found: {}", name),
        )),
        Err(e @ BackupError::OutsideBackupRoot { .. }) => {
            Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Downstream-success callback: the tagging stage finished with this book,
/// so its snapshot, catalog pointer and converted output can go.
pub async fn release_backup(
    State(state): State<Arc<AppState>>,
    Path(book_name): Path<String>,
    body: Option<Json<ReleaseBackupBody>>,
) -> Result<Json<ReleaseOutcome>, impl IntoResponse> {
    let catalog_item_id = body.and_then(|b| b.catalog_item_id);

    match state
        .backups()
        .release_on_downstream_success(&book_name, catalog_item_id)
        .await
    {
        Ok(outcome) => {
            bookbinder_core::metrics::BACKUP_OPERATIONS
                .with_label_values(&["release", "success"])
                .inc();
            info!(
                "Released backup for {} (snapshot removed: {})",
                book_name,
                outcome.snapshot_removed.is_some()
            );
            Ok(Json(outcome))
        }
        Err(e) => {
            bookbinder_core::metrics::BACKUP_OPERATIONS
                .with_label_values(&["release", "failure"])
                .inc();
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
