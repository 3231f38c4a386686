//! Shared handler utilities
//!
//! Multipart form collection and session-id resolution, used by the
//! conversation, media and upload handlers.

use crate::utils::error::{GatewayError, Result};
use actix_multipart::Multipart;
use actix_web::HttpRequest;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Request header carrying the caller's conversation identity
pub const SESSION_HEADER: &str = "x-session-id";

/// One uploaded file from a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Fully collected multipart form: text fields plus uploaded files
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }
}

/// Collect an entire multipart payload into memory
///
/// Fields with a filename in their content disposition are treated as file
/// uploads; everything else is decoded as UTF-8 text.
pub async fn read_multipart(mut payload: Multipart) -> Result<MultipartForm> {
    let mut form = MultipartForm::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| GatewayError::validation(format!("invalid multipart data: {}", e)))?;

        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| GatewayError::validation(format!("error reading field: {}", e)))?;
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) => {
                debug!(field = %field_name, file = %filename, size = data.len(), "multipart file");
                form.files.push(UploadedFile {
                    field_name,
                    filename,
                    data,
                });
            }
            None => {
                let value = String::from_utf8(data).map_err(|_| {
                    GatewayError::validation(format!("field {} is not valid UTF-8", field_name))
                })?;
                form.fields.insert(field_name, value);
            }
        }
    }

    Ok(form)
}

/// Resolve the caller's session id, minting a fresh one when absent
///
/// The resolved id is echoed back in the response so the client can pin it
/// on subsequent requests.
pub fn resolve_session_id(req: &HttpRequest) -> String {
    req.headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn session_id_is_taken_from_the_header_when_present() {
        let req = TestRequest::default()
            .insert_header((SESSION_HEADER, "abc-123"))
            .to_http_request();
        assert_eq!(resolve_session_id(&req), "abc-123");
    }

    #[test]
    fn missing_or_blank_header_mints_a_uuid() {
        let req = TestRequest::default().to_http_request();
        let id = resolve_session_id(&req);
        assert!(Uuid::parse_str(&id).is_ok());

        let req = TestRequest::default()
            .insert_header((SESSION_HEADER, "   "))
            .to_http_request();
        assert!(Uuid::parse_str(&resolve_session_id(&req)).is_ok());
    }
}
