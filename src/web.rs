use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

use crate::{
    books::{Book, SearchResult, Status},
    errors::CatalogError,
    semantic::similarity::limit_from_signed,
    service::{CatalogService, CatalogStats},
};

#[derive(Clone)]
struct SharedState {
    service: Arc<CatalogService>,
    default_limit: usize,
}

impl SharedState {
    fn limit(&self, requested: Option<i64>) -> usize {
        requested.map_or(self.default_limit, limit_from_signed)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => log::error!("failed to install signal handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/books", get(list_books).post(create_book))
        .route(
            "/api/books/:id",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/api/books/:id/similar", get(similar_books))
        .route("/api/search", get(search))
        .route("/api/stats", get(stats))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn start_app(service: Arc<CatalogService>, listen: &str, default_limit: usize) -> anyhow::Result<()> {
    let app = router(SharedState {
        service,
        default_limit,
    });

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Serve the catalog API until Ctrl+C or SIGTERM.
///
/// The caller keeps its own handle on `service`, so the blocking HTTP
/// client inside it is released outside the runtime.
pub fn start_daemon(service: Arc<CatalogService>, listen: &str, default_limit: usize) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(service, listen, default_limit))
}

#[derive(Debug)]
enum HttpError {
    Catalog(CatalogError),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            HttpError::Catalog(err) => err,
            HttpError::Internal(msg) => {
                log::error!("{msg}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": msg})),
                )
                    .into_response();
            }
        };

        let message = err.to_string();
        match err {
            CatalogError::Validation { field, .. } => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": message, "field": field})),
            ),
            CatalogError::NotFound(_) => {
                (StatusCode::NOT_FOUND, Json(json!({"error": message})))
            }
            CatalogError::Duplicate { existing, reason } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": message,
                    "reason": reason.to_string(),
                    "existing": existing,
                })),
            ),
            CatalogError::Provider(_) => {
                log::error!("{message}");
                (StatusCode::BAD_GATEWAY, Json(json!({"error": message})))
            }
            CatalogError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": message})),
            ),
            CatalogError::Storage(_) => {
                log::error!("{message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": message})),
                )
            }
        }
        .into_response()
    }
}

impl From<CatalogError> for HttpError {
    fn from(err: CatalogError) -> Self {
        HttpError::Catalog(err)
    }
}

/// Run a catalog call off the async workers.
async fn blocking<T, F>(service: &Arc<CatalogService>, f: F) -> Result<T, HttpError>
where
    T: Send + 'static,
    F: FnOnce(&CatalogService) -> Result<T, CatalogError> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|err| HttpError::Internal(format!("catalog task failed: {err}")))?
        .map_err(HttpError::from)
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_books(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Book>>, HttpError> {
    let status = query
        .status
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Status>())
        .transpose()?;

    blocking(&state.service, move |svc| match status {
        Some(status) => svc.list_by_status(status),
        None => svc.list(),
    })
    .await
    .map(Json)
}

#[derive(Debug, Default, Deserialize)]
struct CreateQuery {
    #[serde(default)]
    force: bool,
}

async fn create_book(
    State(state): State<SharedState>,
    Query(query): Query<CreateQuery>,
    Json(book): Json<Book>,
) -> Result<(StatusCode, Json<Book>), HttpError> {
    log::debug!("create payload: {:?} by {:?}", book.title, book.author);

    let book = blocking(&state.service, move |svc| {
        if query.force {
            svc.add_unchecked(book)
        } else {
            svc.add(book)
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(book)))
}

async fn get_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, HttpError> {
    blocking(&state.service, move |svc| svc.get(id)).await.map(Json)
}

async fn update_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(mut book): Json<Book>,
) -> Result<Json<Book>, HttpError> {
    book.id = id;
    blocking(&state.service, move |svc| svc.update(book))
        .await
        .map(Json)
}

async fn delete_book(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    blocking(&state.service, move |svc| svc.delete(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn similar_books(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SearchResult>>, HttpError> {
    let limit = state.limit(query.limit);
    blocking(&state.service, move |svc| svc.find_similar(id, limit))
        .await
        .map(Json)
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<i64>,
}

async fn search(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, HttpError> {
    if query.q.trim().is_empty() {
        return Err(CatalogError::validation("q", "search query is required").into());
    }

    let limit = state.limit(query.limit);
    blocking(&state.service, move |svc| svc.search(&query.q, limit))
        .await
        .map(Json)
}

async fn stats(State(state): State<SharedState>) -> Result<Json<CatalogStats>, HttpError> {
    blocking(&state.service, |svc| svc.stats()).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::StorageError,
        duplicates::MatchReason,
        semantic::EmbeddingError,
        tests::support::{csv_store, service_with},
    };
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(default_limit: usize) -> Router {
        let (service, _) = service_with(csv_store());
        router(SharedState {
            service: Arc::new(service),
            default_limit,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post_book(app: &Router, body: Value) -> i64 {
        let (status, book) = send(app, "POST", "/api/books", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{book}");
        book["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_conflict_and_force() {
        let app = app(10);
        let first = post_book(&app, json!({"title": "Dune", "author": "Frank Herbert"})).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/books",
            Some(json!({"title": "DUNE", "author": "frank herbert"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "title+author");
        assert_eq!(body["existing"]["id"], first);
        assert_eq!(body["existing"]["title"], "Dune");

        let forced = post_book_at(&app, "/api/books?force=true").await;
        assert_ne!(forced, first);

        let (_, books) = send(&app, "GET", "/api/books", None).await;
        assert_eq!(books.as_array().unwrap().len(), 2);
    }

    async fn post_book_at(app: &Router, uri: &str) -> i64 {
        let (status, book) = send(
            app,
            "POST",
            uri,
            Some(json!({"title": "DUNE", "author": "frank herbert"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{book}");
        book["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_status_filter() {
        let app = app(10);
        post_book(&app, json!({"title": "Dune", "author": "Frank Herbert"})).await;
        let read = post_book(
            &app,
            json!({"title": "Emma", "author": "Jane Austen", "status": "read"}),
        )
        .await;

        let (status, books) = send(&app, "GET", "/api/books?status=read", None).await;
        assert_eq!(status, StatusCode::OK);
        let books = books.as_array().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["id"], read);
        assert!(books[0]["completed_at"].is_string());
        assert!(books[0].get("embedding").is_none());

        let (status, body) = send(&app, "GET", "/api/books?status=shelved", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "status");
    }

    #[tokio::test]
    async fn test_search_limits() {
        let app = app(1);
        for (title, description) in [
            ("Starfall", "space station"),
            ("Orbit", "space and desert"),
            ("Dunes", "desert crossing"),
        ] {
            post_book(
                &app,
                json!({"title": title, "author": "Someone", "description": description}),
            )
            .await;
        }

        let (status, results) = send(&app, "GET", "/api/search?q=space", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results.as_array().unwrap().len(), 1);
        assert_eq!(results[0]["book"]["title"], "Starfall");

        for limit in ["0", "-3"] {
            let (_, results) =
                send(&app, "GET", &format!("/api/search?q=space&limit={limit}"), None).await;
            assert_eq!(results.as_array().unwrap().len(), 3, "limit={limit}");
        }

        let (_, similar) = send(&app, "GET", "/api/books/1/similar?limit=0", None).await;
        let similar = similar.as_array().unwrap();
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|r| r["book"]["id"] != 1));

        let (status, _) = send(&app, "GET", "/api/search?q=%20", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_book_lifecycle() {
        let app = app(10);
        let (status, body) = send(
            &app,
            "POST",
            "/api/books",
            Some(json!({"title": " ", "author": "Nobody"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "title");

        let id = post_book(&app, json!({"title": "Dune", "author": "Frank Herbert"})).await;

        let (status, book) = send(
            &app,
            "PUT",
            &format!("/api/books/{id}"),
            Some(json!({"title": "Dune", "author": "Frank Herbert", "rating": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(book["rating"], 5);

        let (status, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["rated"], 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/books/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/books/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn status_of(err: CatalogError) -> StatusCode {
        HttpError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(CatalogError::validation("title", "title is required")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CatalogError::NotFound(4)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CatalogError::Duplicate {
                existing: Box::new(Book::new("Dune", "Frank Herbert")),
                reason: MatchReason::Isbn,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CatalogError::Provider(EmbeddingError::Status(500))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CatalogError::Storage(StorageError::Corrupt("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
