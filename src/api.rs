// REST API with Axum
//
// Thin HTTP layer over the library: read API with validated filters,
// dashboard helpers, and import / clean endpoints.

use crate::aggregation::{present, AggregatedStatistic};
use crate::db::clear_statistics;
use crate::filter::{filter_statistics, FilterError, StatisticFilter};
use crate::importer::{DemographicsImporter, ImportReport};
use crate::summary::{DataSummary, FilterOptions};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    importer: Arc<DemographicsImporter>,
}

impl AppState {
    pub fn new(conn: Connection, importer: DemographicsImporter) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            importer: Arc::new(importer),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                log::error!("API error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// Raw query string; every value is validated by `StatisticFilter::from_params`
#[derive(Debug, Default, Deserialize)]
pub struct DemographicsQuery {
    pub year: Option<String>,
    pub age_group: Option<String>,
    pub sex: Option<String>,
    pub hd_index: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ImportUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanResponse {
    pub removed: usize,
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/demographics - Filtered statistics with `total_both_sexes`
async fn list_demographics(
    State(state): State<AppState>,
    Query(query): Query<DemographicsQuery>,
) -> Result<Json<ApiResponse<Vec<AggregatedStatistic>>>, ApiError> {
    let filter = StatisticFilter::from_params(
        query.year.as_deref(),
        query.age_group.as_deref(),
        query.sex.as_deref(),
        query.hd_index.as_deref(),
        query.ordering.as_deref(),
    )?;

    let conn = state.conn()?;
    let stats = filter_statistics(&conn, &filter)?;
    let presented = present(&conn, &stats)?;

    Ok(Json(ApiResponse::ok(presented)))
}

/// GET /api/filters - Distinct values for the dashboard selectors
async fn get_filter_options(State(state): State<AppState>) -> Result<Json<ApiResponse<FilterOptions>>, ApiError> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(FilterOptions::load(&conn)?)))
}

/// GET /api/summary - Counts, per-year totals and sample rows
async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ApiResponse<DataSummary>>, ApiError> {
    let conn = state.conn()?;
    let summary = DataSummary::load(&conn, query.year, query.limit.unwrap_or(10))?;
    Ok(Json(ApiResponse::ok(summary)))
}

fn report_response(report: ImportReport, failure: StatusCode) -> Response {
    let status = if report.success { StatusCode::OK } else { failure };
    (status, Json(report)).into_response()
}

/// POST /api/import/url - Fetch and import a remote CSV
async fn import_url(
    State(state): State<AppState>,
    Json(request): Json<ImportUrlRequest>,
) -> Result<Response, ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("No URL provided.".to_string()));
    }

    // Fetch outside the lock; only the batch itself holds the connection
    let report = tokio::task::spawn_blocking(move || -> Result<ImportReport, ApiError> {
        let source = match state.importer.fetch_source(&request.url) {
            Ok(source) => source,
            Err(report) => return Ok(report),
        };
        let mut conn = state.conn()?;
        Ok(state.importer.import_source(&mut conn, source))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("import task failed: {e}")))??;

    Ok(report_response(report, StatusCode::BAD_GATEWAY))
}

/// POST /api/import/file - Import the CSV sent as the request body
async fn import_file(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No file provided.".to_string()));
    }

    let report = tokio::task::spawn_blocking(move || -> Result<ImportReport, ApiError> {
        let mut conn = state.conn()?;
        Ok(state.importer.import_from_reader(&mut conn, "upload", body.as_ref()))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("import task failed: {e}")))??;

    Ok(report_response(report, StatusCode::BAD_REQUEST))
}

/// POST /api/clean - Remove every statistic
async fn clean_database(State(state): State<AppState>) -> Result<Json<ApiResponse<CleanResponse>>, ApiError> {
    let conn = state.conn()?;
    let removed = clear_statistics(&conn, "api")?;
    Ok(Json(ApiResponse::ok(CleanResponse { removed })))
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/demographics", get(list_demographics))
        .route("/filters", get(get_filter_options))
        .route("/summary", get(get_summary))
        .route("/import/url", post(import_url))
        .route("/import/file", post(import_file))
        .route("/clean", post(clean_database))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::importer::{FetchedSource, SourceFetcher};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    const CSV: &str = "Year,Age Group,Sex,Human Development Index Rating,VALUE
2022,0 - 4 years,1,20,100
2022,0 - 4 years,2,20,90
2022,0 - 4 years,-,20,190
2022,5 - 9 years,1,30,70
";

    struct StubFetcher {
        status: u16,
    }

    impl SourceFetcher for StubFetcher {
        fn fetch(&self, _url: &str) -> anyhow::Result<FetchedSource> {
            Ok(FetchedSource {
                status: self.status,
                body: CSV.as_bytes().to_vec(),
            })
        }
    }

    /// Remote source that takes a while to answer
    struct SlowFetcher {
        delay: Duration,
    }

    impl SourceFetcher for SlowFetcher {
        fn fetch(&self, _url: &str) -> anyhow::Result<FetchedSource> {
            std::thread::sleep(self.delay);
            Ok(FetchedSource {
                status: 200,
                body: CSV.as_bytes().to_vec(),
            })
        }
    }

    fn app_with(fetcher: Box<dyn SourceFetcher>) -> Router {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        router(AppState::new(conn, DemographicsImporter::new(fetcher)))
    }

    fn app(status: u16) -> Router {
        app_with(Box::new(StubFetcher { status }))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_body(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(200);
        let (status, json) = send(&app, get("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], "OK");
    }

    #[tokio::test]
    async fn test_import_file_then_query() {
        let app = app(200);

        let (status, report) = send(&app, post_body("/api/import/file", "text/csv", CSV)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["imported_rows"], 3);
        assert_eq!(report["skipped_rows"], 1);

        let (status, json) = send(&app, get("/api/demographics?year=2022&age_group=0%20-%204%20years")).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json["data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row["total_both_sexes"], 190);
        }
    }

    #[tokio::test]
    async fn test_unknown_filter_value_is_bad_request() {
        let app = app(200);
        send(&app, post_body("/api/import/file", "text/csv", CSV)).await;

        let (status, json) = send(&app, get("/api/demographics?sex=Unknown")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid sex parameter: 'Unknown' does not exist.");
    }

    #[tokio::test]
    async fn test_bad_year_and_ordering_are_bad_requests() {
        let app = app(200);

        let (status, _) = send(&app, get("/api/demographics?year=soon")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(&app, get("/api/demographics?ordering=size")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid ordering parameter: 'size'.");
    }

    #[tokio::test]
    async fn test_import_url_and_clean() {
        let app = app(200);

        let (status, report) = send(
            &app,
            post_body("/api/import/url", "application/json", r#"{"url":"https://example.com/data.csv"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["success"], true);

        let (_, options) = send(&app, get("/api/filters")).await;
        assert_eq!(options["data"]["years"], serde_json::json!([2022]));
        assert_eq!(options["data"]["total_records"], 3);

        let (status, cleaned) = send(&app, post_body("/api/clean", "application/json", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleaned["data"]["removed"], 3);

        let (_, summary) = send(&app, get("/api/summary")).await;
        assert_eq!(summary["data"]["total_statistics"], 0);
    }

    #[tokio::test]
    async fn test_import_url_http_failure() {
        let app = app(404);

        let (status, report) = send(
            &app,
            post_body("/api/import/url", "application/json", r#"{"url":"https://example.com/missing.csv"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(report["success"], false);
        assert_eq!(report["error"], "Failed to fetch CSV from URL: HTTP 404");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_are_not_blocked_by_url_fetch() {
        let app = app_with(Box::new(SlowFetcher {
            delay: Duration::from_secs(2),
        }));

        let import = tokio::spawn(app.clone().oneshot(post_body(
            "/api/import/url",
            "application/json",
            r#"{"url":"https://example.com/slow.csv"}"#,
        )));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let (status, _) = send(&app, get("/api/filters")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(started.elapsed() < Duration::from_secs(1), "read waited {:?}", started.elapsed());

        let response = import.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let (_, options) = send(&app, get("/api/filters")).await;
        assert_eq!(options["data"]["total_records"], 3);
    }
}
