//! File upload endpoint

use crate::server::state::AppState;
use crate::server::utils::read_multipart;
use crate::utils::error::GatewayError;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use tracing::info;

/// POST /api/files/upload
///
/// Multipart: `file` (required) plus a `user_id` or `username` field naming
/// the uploader. Classification is by filename extension only; the stored
/// record is returned with 201.
pub async fn upload_file(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let form = read_multipart(payload).await?;

    let file = form
        .file("file")
        .ok_or_else(|| GatewayError::validation("未提供文件"))?;
    let uploader = form
        .field("user_id")
        .or_else(|| form.field("username"))
        .filter(|u| !u.trim().is_empty())
        .ok_or(GatewayError::Unauthenticated)?;

    info!(file = %file.filename, uploader = %uploader, "file upload");
    let record = state.media.put(&file.filename, &file.data, uploader).await?;
    Ok(HttpResponse::Created().json(record))
}
