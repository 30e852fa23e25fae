use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use futures::stream;
use multer::{parse_boundary, Multipart};
use tracing::{debug, error, info, warn};

use dedup_core::{parse_rows, InputFormat, Outcome, OutputFormat, OutputMode};

use super::AppState;
use crate::api::{Downloads, UploadError, UploadResponse, UploadStatus};
use crate::metrics::UPLOADS;

/// Form field the upload is expected in.
const FILE_FIELD: &str = "file";

struct UploadedFile {
    name: String,
    data: Bytes,
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let result = handle_upload(&state, &headers, body).await;

    let status = match &result {
        Ok(Json(response)) => response.status,
        Err(e) => e.status(),
    };
    metrics::counter!(UPLOADS, "status" => status.as_str()).increment(1);

    result
}

async fn handle_upload(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let body = body.map_err(|rejection| {
        warn!("failed to read upload body: {}", rejection.body_text());
        UploadError::from(rejection)
    })?;
    let file = read_file_field(headers, body).await?;

    let format = InputFormat::from_file_name(&file.name).ok_or_else(|| {
        debug!(file_name = %file.name, "rejected upload with unsupported extension");
        UploadError::UnsupportedFileType
    })?;
    let output_format = if state.force_csv_output {
        OutputFormat::Csv
    } else {
        format.output_format()
    };

    info!(file_name = %file.name, size = file.data.len(), "processing upload");

    let data = file.data;
    let rows = tokio::task::spawn_blocking(move || parse_rows(&data, format))
        .await
        .map_err(|e| {
            error!("parse task failed: {}", e);
            UploadError::Internal
        })?
        .map_err(|e| {
            warn!(file_name = %file.name, "unreadable upload: {}", e);
            UploadError::from(e)
        })?;

    let outcome = state.pipeline.run(&rows, output_format).await?;
    let message = outcome.message().to_owned();

    let (status, report) = match outcome {
        Outcome::NoData => return Err(UploadError::NoDataFound),
        Outcome::AllDuplicates(report) => (UploadStatus::AllDuplicates, report),
        Outcome::Success(report) => (UploadStatus::Success, report),
    };
    let downloads = match state.pipeline.mode() {
        OutputMode::Split => Downloads::split(&report),
        OutputMode::NewOnly => Downloads::single(&report),
    };

    Ok(Json(UploadResponse {
        status,
        message,
        downloads,
    }))
}

/// Media types are case-insensitive, parameters are ignored.
fn is_form_data(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default();
    essence.trim().eq_ignore_ascii_case("multipart/form-data")
}

/// Pull the first file out of a multipart body. Other parts are skipped.
async fn read_file_field(headers: &HeaderMap, body: Bytes) -> Result<UploadedFile, UploadError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !is_form_data(content_type) {
        debug!(content_type, "upload without a multipart body");
        return Err(UploadError::NoFileProvided);
    }

    let boundary = parse_boundary(content_type).map_err(|e| {
        warn!("failed to parse multipart boundary: {}", e);
        UploadError::MalformedUpload(e.to_string())
    })?;

    let body_stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = Multipart::new(body_stream, boundary);

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("multipart parsing error: {}", e);
        UploadError::MalformedUpload(e.to_string())
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let data = field.bytes().await.map_err(|e| {
            warn!(file_name = %name, "failed to read file field: {}", e);
            UploadError::MalformedUpload(e.to_string())
        })?;

        return Ok(UploadedFile { name, data });
    }

    Err(UploadError::NoFileProvided)
}
