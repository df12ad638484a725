//! Upload handlers.

use crate::auth::{get_trace_id, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::upload::{self, PartUpload};
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::CONTENT_LENGTH;
use ferry_core::{UploadId, UploadOut, UploadPartOut, UploadQuery, UploadStats};
use futures::TryStreamExt;
use serde::Deserialize;
use std::io;

const DEFAULT_STATS_DAYS: u32 = 7;
const MAX_STATS_DAYS: u32 = 365;

/// POST /api/uploads/{upload_id} - Upload one part.
///
/// The raw request body is the part and `Content-Length` its declared size.
pub async fn upload_part(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Query(query): Query<UploadQuery>,
    req: Request,
) -> ApiResult<Json<UploadPartOut>> {
    let user = require_auth(&req)?.clone();
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let upload_id = UploadId::parse(&upload_id)?;
    let part_no = query.validate()?;
    let size = declared_length(&req)?;

    tracing::debug!(
        trace_id = %trace_id,
        upload_id = %upload_id,
        part_no = part_no.get(),
        size,
        "received part upload"
    );

    let body = req
        .into_body()
        .into_data_stream()
        .map_err(io::Error::other);

    let request = PartUpload {
        upload_id,
        part_no,
        part_name: query.part_name.trim().to_string(),
        file_name: query.file_name,
        channel_id: query.channel_id,
        encrypted: query.encrypted,
        size,
    };

    let part = upload::upload_part(&state, &user, request, body).await?;
    Ok(Json(part))
}

fn declared_length(req: &Request) -> ApiResult<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .ok_or_else(|| ApiError::BadRequest("Content-Length header is required".to_string()))?
        .to_str()
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("invalid Content-Length header".to_string()))
}

/// GET /api/uploads/{upload_id} - List live parts ordered by part number.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<Json<UploadOut>> {
    require_auth(&req)?;
    let upload_id = UploadId::parse(&upload_id)?;
    let parts = upload::list_parts(&state, &upload_id).await?;
    Ok(Json(UploadOut { parts }))
}

/// DELETE /api/uploads/{upload_id} - Remove the upload's ledger rows.
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<Json<serde_json::Value>> {
    require_auth(&req)?;
    let upload_id = UploadId::parse(&upload_id)?;
    upload::delete_upload(&state, &upload_id).await?;
    Ok(Json(serde_json::json!({ "message": "upload deleted" })))
}

/// Query parameters for upload stats.
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<u32>,
}

/// GET /api/uploads/stats - Per-day upload totals for the caller.
pub async fn get_upload_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
    req: Request,
) -> ApiResult<Json<Vec<UploadStats>>> {
    let user = require_auth(&req)?;
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    if !(1..=MAX_STATS_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_STATS_DAYS}"
        )));
    }
    let stats = upload::upload_stats(&state, user, days).await?;
    Ok(Json(stats))
}
