use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use index::{DirectoryReport, DocumentDetail, DocumentRecord, IndexStats, IngestReport, Indexer};
use query::{Answer, QueryService, RetrievalMode, RetrievalTrace};

use crate::error::ApiError;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

pub struct AppState {
    pub indexer: Indexer,
    pub service: QueryService,
    pub metrics: Arc<Metrics>,
    pub default_top_k: usize,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/documents", post(ingest_document).get(list_documents))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/retrieve", post(retrieve))
        .route("/answer", post(answer))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    chunks: String,
    tree: String,
    metadata: String,
    stats: Option<IndexStats>,
}

fn probe<T>(result: &anyhow::Result<T>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stores = state.indexer.stores();
    let chunks = stores.chunks.count().await;
    let tree = stores.tree.count().await;
    let metadata = stores.metadata.document_count().await;

    let healthy = chunks.is_ok() && tree.is_ok() && metadata.is_ok();
    let stats = if healthy {
        state.indexer.stats().await.ok()
    } else {
        None
    };

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        chunks: probe(&chunks),
        tree: probe(&tree),
        metadata: probe(&metadata),
        stats,
    })
}

#[derive(Deserialize)]
struct IngestRequest {
    path: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum IngestResponse {
    Document(IngestReport),
    Directory(DirectoryReport),
}

async fn ingest_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestResponse> {
    let path = PathBuf::from(&req.path);
    let timer = TimedOperation::start();

    let result = if path.is_dir() {
        state
            .indexer
            .ingest_directory(&path)
            .await
            .map(IngestResponse::Directory)
    } else {
        state
            .indexer
            .ingest_file(&path)
            .await
            .map(IngestResponse::Document)
    };
    state.metrics.record_request(result.is_ok());

    let response = result?;
    match &response {
        IngestResponse::Document(report) => {
            state.metrics.record_ingest(timer.elapsed(), report.chunk_count);
        }
        IngestResponse::Directory(report) => {
            for ingested in &report.ingested {
                state.metrics.record_ingest(
                    timer.elapsed() / report.ingested.len() as u32,
                    ingested.chunk_count,
                );
            }
        }
    }
    Ok(Json(response))
}

async fn list_documents(State(state): State<Arc<AppState>>) -> ApiResult<Vec<DocumentRecord>> {
    let documents = state
        .indexer
        .stores()
        .metadata
        .list_documents()
        .await
        .map_err(|e| index::Error::collaborator("list documents", e))?;
    Ok(Json(documents))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DocumentDetail> {
    state
        .indexer
        .stores()
        .metadata
        .get_document(&id)
        .await
        .map_err(|e| index::Error::collaborator("get document", e))?
        .map(Json)
        .ok_or_else(|| index::Error::NotFound(format!("document {id}")).into())
}

#[derive(Serialize)]
struct DeleteResponse {
    id: String,
    deleted: bool,
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    if !state.indexer.delete_document(&id).await? {
        return Err(index::Error::NotFound(format!("document {id}")).into());
    }
    Ok(Json(DeleteResponse { id, deleted: true }))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    mode: Option<String>,
    top_k: Option<usize>,
    doc_id: Option<String>,
}

impl QueryRequest {
    fn mode(&self) -> Result<Option<RetrievalMode>, ApiError> {
        self.mode
            .as_deref()
            .map(str::parse::<RetrievalMode>)
            .transpose()
            .map_err(ApiError::BadRequest)
    }
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<index::RetrievalResult>,
    trace: RetrievalTrace,
}

async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<RetrieveResponse> {
    let mode = req.mode()?;
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let timer = TimedOperation::start();

    let result = state
        .service
        .engine()
        .retrieve_with_trace(&req.query, mode, top_k, req.doc_id.as_deref())
        .await;
    state.metrics.record_request(result.is_ok());

    let retrieval = result?;
    state
        .metrics
        .record_query(timer.elapsed(), retrieval.trace.mode, retrieval.results.len());

    Ok(Json(RetrieveResponse {
        results: retrieval.results,
        trace: retrieval.trace,
    }))
}

async fn answer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Answer> {
    let mode = req.mode()?;
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let timer = TimedOperation::start();

    let result = state
        .service
        .answer(&req.query, mode, top_k, req.doc_id.as_deref())
        .await;
    state.metrics.record_request(result.is_ok());

    let answer = result?;
    state
        .metrics
        .record_query(timer.elapsed(), answer.trace.mode, answer.sources.len());
    Ok(Json(answer))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use extract::PatternExtractor;
    use index::{HashEmbedder, Stores};
    use ingest::{Chunker, ChunkerConfig};
    use query::{AnswerGenerator, RetrievalConfig, RetrievalEngine, UNCONFIGURED_ANSWER};
    use raptor::TreeBuilder;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        let stores = Stores::in_memory();
        let embedder = Arc::new(HashEmbedder::new(64));
        let extractor = Arc::new(PatternExtractor::default());
        let indexer = Indexer::new(
            Chunker::new(ChunkerConfig::new(200, 20)).unwrap(),
            TreeBuilder::default(),
            embedder.clone(),
            extractor.clone(),
            stores.clone(),
        );
        let engine = RetrievalEngine::new(embedder, extractor, stores, RetrievalConfig::default());
        create_router(Arc::new(AppState {
            indexer,
            service: QueryService::new(engine, AnswerGenerator::unconfigured()),
            metrics: Metrics::new(),
            default_top_k: 5,
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let app = app();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.txt");
        std::fs::write(&path, "Paris is nice.\n\nParis has the Eiffel Tower.").unwrap();

        let (status, report) = call(
            &app,
            "POST",
            "/documents",
            Some(json!({ "path": path.to_str().unwrap() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let doc_id = report["doc_id"].as_str().unwrap().to_string();
        assert_eq!(report["filename"], "cities.txt");

        let (status, documents) = call(&app, "GET", "/documents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(documents.as_array().unwrap().len(), 1);

        let (status, detail) = call(&app, "GET", &format!("/documents/{doc_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["document"]["id"], doc_id.as_str());

        let (status, _) = call(&app, "DELETE", &format!("/documents/{doc_id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "GET", &format!("/documents/{doc_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", &format!("/documents/{doc_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_error_statuses() {
        let app = app();
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "   ").unwrap();

        let cases = [
            (dir.path().join("missing.txt"), StatusCode::NOT_FOUND),
            (dir.path().join("scan.pdf"), StatusCode::BAD_REQUEST),
            (blank, StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (path, expected) in cases {
            let (status, body) = call(
                &app,
                "POST",
                "/documents",
                Some(json!({ "path": path.to_str().unwrap() })),
            )
            .await;
            assert_eq!(status, expected, "{body}");
            assert!(body["error"]["message"].is_string());
        }
    }

    #[tokio::test]
    async fn test_retrieve_and_answer() {
        let app = app();
        let (status, body) = call(&app, "POST", "/retrieve", Some(json!({ "query": "Paris" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["trace"]["empty_reason"], "no_documents_indexed");

        let (status, body) = call(
            &app,
            "POST",
            "/retrieve",
            Some(json!({ "query": "Paris", "mode": "semantic" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, body) = call(
            &app,
            "POST",
            "/answer",
            Some(json!({ "query": "What is the relationship between X and Y" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], UNCONFIGURED_ANSWER);
        assert_eq!(body["trace"]["mode"], "graph");

        let (_, metrics) = call(&app, "GET", "/metrics", None).await;
        assert_eq!(metrics["queries"]["vector"], 1);
        assert_eq!(metrics["queries"]["graph"], 1);
        assert_eq!(metrics["failed_requests"], 0);
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["stats"]["documents"], 0);
    }
}
