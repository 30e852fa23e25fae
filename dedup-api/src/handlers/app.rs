use std::future::ready;
use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::{routing, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use dedup_core::Pipeline;

use super::upload;
use crate::metrics::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub force_csv_output: bool,
}

pub fn add_routes(
    router: Router,
    state: AppState,
    uploads_dir: &Path,
    max_body_size: usize,
) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No background loops to report on, axum health is enough
        .route(
            "/upload",
            routing::post(upload::upload)
                .with_state(state)
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .nest_service("/uploads", ServeDir::new(uploads_dir))
}

/// The full service: routes, CORS for the frontend origin, tracing, and optionally `/metrics`.
pub fn router(
    state: AppState,
    uploads_dir: &Path,
    max_body_size: usize,
    allowed_origin: HeaderValue,
    metrics: bool,
) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(allowed_origin);

    let router = add_routes(Router::new(), state, uploads_dir, max_body_size)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics));

    // Installing a global recorder more than once (tests) does not work.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", routing::get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}

pub async fn index() -> &'static str {
    "dedup api"
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use dedup_core::{Identifier, MemoryStore, OutputMode, OutputWriter, PipelineConfig};
    use http_body_util::BodyExt; // for `collect`
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    const BOUNDARY: &str = "dedupboundary";

    fn app(store: &MemoryStore, dir: &Path, mode: OutputMode) -> Router {
        app_with_body_limit(store, dir, mode, 1_000_000)
    }

    fn app_with_body_limit(
        store: &MemoryStore,
        dir: &Path,
        mode: OutputMode,
        max_body_size: usize,
    ) -> Router {
        let pipeline = Pipeline::new(
            Arc::new(store.clone()),
            &PipelineConfig::default(),
            OutputWriter::new(dir, "/uploads", 500_000),
            mode,
        );
        let state = AppState {
            pipeline: Arc::new(pipeline),
            force_csv_output: false,
        };

        router(
            state,
            dir,
            max_body_size,
            HeaderValue::from_static("http://localhost:5173"),
            false,
        )
    }

    fn multipart(field: &str, file_name: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             ignored\r\n\
             --{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        );

        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&MemoryStore::new(), dir.path(), OutputMode::Split);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"dedup api");
    }

    #[tokio::test]
    async fn upload_splits_and_serves_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_identifiers([Identifier::new(7.0).unwrap()]);
        let app = app(&store, dir.path(), OutputMode::Split);

        let response = app
            .clone()
            .oneshot(multipart("file", "ids.csv", "5,x\n7,\n5,9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_json_include!(
            actual: body.clone(),
            expected: json!({
                "status": "success",
                "message": "Files processed successfully.",
            })
        );
        assert_eq!(store.len(), 3);

        let new_url = body["files"]["new"].as_str().unwrap();
        assert!(new_url.starts_with("/uploads/"));
        assert!(new_url.ends_with("/processed_file_new.csv"));

        let download = app
            .oneshot(Request::builder().uri(new_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        let contents = download.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&contents[..], b"5\n9\n");
    }

    #[tokio::test]
    async fn repeated_upload_reports_all_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app(&store, dir.path(), OutputMode::Split);

        let first = app
            .clone()
            .oneshot(multipart("file", "ids.csv", "1\n2\n3"))
            .await
            .unwrap();
        assert_eq!(json_body(first).await["message"], "No duplicate entries found.");

        let second = app
            .oneshot(multipart("file", "ids.csv", "1\n2\n3"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let body = json_body(second).await;
        assert_eq!(body["status"], "all_duplicates");
        assert_eq!(body["message"], "All entries were duplicates.");
        assert_eq!(body["files"]["new"], Value::Null);
        assert!(body["files"]["duplicate"].is_string());
    }

    #[tokio::test]
    async fn single_file_mode_returns_one_link() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&MemoryStore::new(), dir.path(), OutputMode::NewOnly);

        let response = app
            .oneshot(multipart("file", "IDS.CSV", "10\n11"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert!(body.get("files").is_none());
        assert!(body["file"]
            .as_str()
            .unwrap()
            .ends_with("/processed_file_new.csv"));
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app(&store, dir.path(), OutputMode::Split);

        let response = app
            .oneshot(multipart("attachment", "ids.csv", "1\n2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_json_include!(
            actual: json_body(response).await,
            expected: json!({"status": "no_file_provided", "message": "No file uploaded."})
        );
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app(&store, dir.path(), OutputMode::Split);

        let response = app
            .oneshot(multipart("file", "ids.txt", "1\n2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json_body(response).await["message"], "Invalid file type.");
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn file_without_numbers_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app(&store, dir.path(), OutputMode::Split);

        let response = app
            .oneshot(multipart("file", "ids.csv", "name,email\nada,ada@example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_json_include!(
            actual: json_body(response).await,
            expected: json!({"status": "no_data_found", "message": "No data found in the file."})
        );
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn corrupt_workbook_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&MemoryStore::new(), dir.path(), OutputMode::Split);

        let response = app
            .oneshot(multipart("file", "ids.xlsx", "definitely not a zip archive"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "unreadable_file");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app_with_body_limit(&store, dir.path(), OutputMode::Split, 64);

        let contents = "1\n".repeat(100);
        let response = app
            .oneshot(multipart("file", "ids.csv", &contents))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_json_include!(
            actual: json_body(response).await,
            expected: json!({"status": "file_too_large", "message": "File is too large."})
        );
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn content_type_is_matched_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let app = app(&store, dir.path(), OutputMode::Split);

        let mut request = multipart("file", "ids.csv", "1\n2");
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&format!("Multipart/Form-Data; boundary={BOUNDARY}")).unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "success");
        assert_eq!(store.len(), 2);
    }
}
