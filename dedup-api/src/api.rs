use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dedup_core::{OutputFile, ParseError, PipelineError, Report};
use serde_derive::Serialize;
use thiserror::Error;

/// Terminal status of an upload. Outcomes that share an HTTP code stay distinguishable here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    NoFileProvided,
    UnsupportedFileType,
    FileTooLarge,
    UnreadableFile,
    NoDataFound,
    AllDuplicates,
    Success,
    InternalFailure,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::NoFileProvided => "no_file_provided",
            UploadStatus::UnsupportedFileType => "unsupported_file_type",
            UploadStatus::FileTooLarge => "file_too_large",
            UploadStatus::UnreadableFile => "unreadable_file",
            UploadStatus::NoDataFound => "no_data_found",
            UploadStatus::AllDuplicates => "all_duplicates",
            UploadStatus::Success => "success",
            UploadStatus::InternalFailure => "internal_failure",
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SplitFiles {
    pub new: Option<String>,
    pub duplicate: Option<String>,
}

/// Download links, shaped by whether the service returns one file or two.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Downloads {
    Split { files: SplitFiles },
    Single { file: Option<String> },
}

impl Downloads {
    pub fn split(report: &Report) -> Self {
        Downloads::Split {
            files: SplitFiles {
                new: url(&report.outputs.new),
                duplicate: url(&report.outputs.duplicate),
            },
        }
    }

    pub fn single(report: &Report) -> Self {
        Downloads::Single {
            file: url(&report.outputs.new),
        }
    }
}

fn url(file: &Option<OutputFile>) -> Option<String> {
    file.as_ref().map(|f| f.url.clone())
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub message: String,
    #[serde(flatten)]
    pub downloads: Downloads,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: UploadStatus,
    message: String,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file uploaded.")]
    NoFileProvided,
    #[error("Invalid file type.")]
    UnsupportedFileType,
    #[error("File is too large.")]
    FileTooLarge,
    #[error("Could not read the uploaded file: {0}")]
    MalformedUpload(String),
    #[error("Could not read the uploaded file: {0}")]
    UnreadableFile(#[from] ParseError),
    #[error("No data found in the file.")]
    NoDataFound,

    #[error("Existence check failed.")]
    ExistenceCheckFailed,
    #[error("Write failed.")]
    WriteFailed,
    #[error("Failed to build output files.")]
    OutputFailed,
    #[error("Processing timed out.")]
    TimedOut,
    #[error("Internal error.")]
    Internal,
}

impl From<PipelineError> for UploadError {
    fn from(error: PipelineError) -> Self {
        // Details were already logged by the pipeline; callers only get the classification.
        match error {
            PipelineError::ExistenceCheck { .. } => UploadError::ExistenceCheckFailed,
            PipelineError::Write { .. } => UploadError::WriteFailed,
            PipelineError::Output { .. } => UploadError::OutputFailed,
            PipelineError::TimedOut { .. } => UploadError::TimedOut,
        }
    }
}

impl From<BytesRejection> for UploadError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::FileTooLarge
        } else {
            UploadError::MalformedUpload(rejection.body_text())
        }
    }
}

impl UploadError {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadError::NoFileProvided => UploadStatus::NoFileProvided,
            UploadError::UnsupportedFileType => UploadStatus::UnsupportedFileType,
            UploadError::FileTooLarge => UploadStatus::FileTooLarge,
            UploadError::MalformedUpload(_) | UploadError::UnreadableFile(_) => {
                UploadStatus::UnreadableFile
            }
            UploadError::NoDataFound => UploadStatus::NoDataFound,
            UploadError::ExistenceCheckFailed
            | UploadError::WriteFailed
            | UploadError::OutputFailed
            | UploadError::TimedOut
            | UploadError::Internal => UploadStatus::InternalFailure,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::NoFileProvided
            | UploadError::MalformedUpload(_)
            | UploadError::UnreadableFile(_) => StatusCode::BAD_REQUEST,
            UploadError::UnsupportedFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::NoDataFound => StatusCode::UNPROCESSABLE_ENTITY,
            UploadError::ExistenceCheckFailed => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::WriteFailed | UploadError::OutputFailed | UploadError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UploadError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
