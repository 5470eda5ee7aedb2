use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{self, SessionStore};
use crate::cache::GeneCache;
use crate::clones;
use crate::config::Config;
use crate::downloader;
use crate::error::{AppError, AppResult};
use crate::gateway::{GeneLookupGateway, MyGeneClient, lookup_gateway};
use crate::import::{self, ImportKind};
use crate::model::CloneFields;
use crate::reconcile::Reconciler;
use crate::store::{GeneStore, open_store};
use crate::table::{self, Classification, DisplayRow, TableFilter};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn GeneStore>,
    /// Backs the pass-through proxy endpoint
    pub upstream: MyGeneClient,
    pub reconciler: Reconciler,
    pub sessions: SessionStore,
    pub classification: Classification,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn GeneStore>,
        gateway: Arc<dyn GeneLookupGateway>,
    ) -> Self {
        let cache = Arc::new(GeneCache::new());
        AppState {
            upstream: MyGeneClient::new(config.mygene_url.as_str()),
            reconciler: Reconciler::new(store.clone(), gateway, cache),
            sessions: SessionStore::new(Duration::from_secs(config.session_ttl_secs)),
            classification: config.classification,
            store,
            config,
        }
    }

    /// Pick the store and lookup backends named by the configuration.
    pub fn from_config(config: Config) -> AppResult<Self> {
        let store = open_store(&config)?;
        let gateway = lookup_gateway(&config)?;
        Ok(Self::new(config, store, gateway))
    }

    fn viewer(&self, jar: &CookieJar) -> Option<Uuid> {
        self.sessions.user_from_jar(jar)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let proxy = Router::new()
        .route(
            "/functions/v1/fetch-gene-data",
            get(fetch_gene_data_query).post(fetch_gene_data_body),
        )
        .layer(cors);

    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/api/auth/anonymous", post(auth::handle_sign_in))
        .route("/api/auth/signout", post(auth::handle_sign_out))
        .route("/api/auth/me", get(auth::handle_me))
        .route("/api/genes", get(list_genes))
        .route("/api/genes/search", get(search_genes))
        .route("/api/genes/resolve", post(resolve_gene))
        .route("/api/genes/:id", get(get_gene))
        .route("/api/genes/:id/clones", post(add_clone))
        .route("/api/clones/:id", patch(update_clone).delete(delete_clone))
        .route("/api/table", get(table_rows))
        .route("/api/table/export.csv", get(export_csv))
        .route("/api/table/export.xlsx", get(export_xlsx))
        .route("/api/import/template/:kind", get(import_template))
        .route("/api/import/:kind", post(import_file))
        .merge(proxy)
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> AppResult<()> {
    let address = config.address();
    let state = Arc::new(AppState::from_config(config)?);

    let cached = state
        .reconciler
        .cache()
        .refresh(state.store.as_ref())
        .await?;
    info!("Loaded {cached} genes into the cache");

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Deserialize)]
struct GeneSymbolParams {
    #[serde(rename = "geneSymbol")]
    gene_symbol: Option<String>,
}

async fn fetch_gene_data_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeneSymbolParams>,
) -> Response {
    proxy_lookup(&state, params.gene_symbol).await
}

async fn fetch_gene_data_body(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let symbol = serde_json::from_slice::<GeneSymbolParams>(&body)
        .ok()
        .and_then(|params| params.gene_symbol);
    proxy_lookup(&state, symbol).await
}

/// Forward a symbol upstream and hand back its body byte for byte.
async fn proxy_lookup(state: &AppState, symbol: Option<String>) -> Response {
    let Some(symbol) = symbol.filter(|s| !s.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Gene symbol is required" })),
        )
            .into_response();
    };

    match state.upstream.fetch_raw(&symbol).await {
        Ok(raw) => {
            let content_type = raw
                .content_type
                .unwrap_or_else(|| "application/json".to_string());
            ([(header::CONTENT_TYPE, content_type)], raw.body).into_response()
        }
        Err(e) => {
            let message = match e {
                AppError::ExternalService(message) => message,
                other => other.to_string(),
            };
            warn!("Gene lookup proxy failed for {symbol}: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}

async fn list_genes(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let records = state.reconciler.records(state.viewer(&jar)).await?;
    Ok(Json(records))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_genes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.reconciler.search(&query.q).await?))
}

#[derive(Deserialize)]
struct ResolveRequest {
    symbol: String,
}

async fn resolve_gene(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .reconciler
        .resolve(&request.symbol, state.viewer(&jar))
        .await?;
    Ok(Json(record))
}

async fn get_gene(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.reconciler.record(id, state.viewer(&jar)).await?))
}

async fn add_clone(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(gene_id): Path<Uuid>,
    Json(fields): Json<CloneFields>,
) -> AppResult<impl IntoResponse> {
    let user = state.sessions.provider(&jar);
    let record = clones::add_clone(state.store.as_ref(), &user, gene_id, fields).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_clone(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(clone_id): Path<Uuid>,
    Json(patch): Json<CloneFields>,
) -> AppResult<impl IntoResponse> {
    let user = state.sessions.provider(&jar);
    let record = clones::update_clone(state.store.as_ref(), &user, clone_id, patch).await?;
    Ok(Json(record))
}

async fn delete_clone(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(clone_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user = state.sessions.provider(&jar);
    clones::delete_clone(state.store.as_ref(), &user, clone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
struct TableQuery {
    search: Option<String>,
    priority: Option<String>,
    status: Option<String>,
}

/// Flattened, filtered rows for the viewer.
async fn filtered_rows(
    state: &AppState,
    jar: &CookieJar,
    query: &TableQuery,
) -> AppResult<Vec<DisplayRow>> {
    let filter = TableFilter::from_params(
        query.search.as_deref(),
        query.priority.as_deref(),
        query.status.as_deref(),
    )?;
    let records = state.reconciler.records(state.viewer(jar)).await?;
    Ok(filter.apply(table::flatten(&records, state.classification)))
}

async fn table_rows(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<TableQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(filtered_rows(&state, &jar, &query).await?))
}

fn attachment(content_type: &str, filename: &str, body: impl IntoResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<TableQuery>,
) -> AppResult<Response> {
    let rows = filtered_rows(&state, &jar, &query).await?;
    let csv = downloader::to_csv(&rows)?;
    let filename = downloader::export_filename(Utc::now().date_naive(), "csv");
    info!("Exporting {} rows to {filename}", rows.len());
    Ok(attachment("text/csv; charset=utf-8", &filename, csv))
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<TableQuery>,
) -> AppResult<Response> {
    let rows = filtered_rows(&state, &jar, &query).await?;
    let xlsx = downloader::to_xlsx(&rows)?;
    let filename = downloader::export_filename(Utc::now().date_naive(), "xlsx");
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &filename,
        xlsx,
    ))
}

async fn import_template(Path(kind): Path<String>) -> AppResult<Response> {
    let kind: ImportKind = kind.parse()?;
    Ok(attachment(
        "text/csv; charset=utf-8",
        &kind.template_filename(),
        kind.template(),
    ))
}

/// Progress sink for uploads.
///
/// The request only answers once the import is done, so a browser client gets
/// the final summary; per-row progress goes to the log here and to the
/// terminal in `gene-cli import`.
fn import_progress(kind: ImportKind) -> impl FnMut(u8) + Send {
    move |progress| debug!("{kind} upload {progress}%")
}

/// Accept a multipart upload (field `file`) and run the import pipeline.
async fn import_file(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let kind: ImportKind = kind.parse()?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed upload: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(format!("malformed upload: {e}")))?;
            upload = Some(bytes);
        }
    }
    let upload =
        upload.ok_or_else(|| AppError::InvalidInput("No file data received".to_string()))?;

    let user = state.sessions.provider(&jar);
    let summary = import::import_csv(
        &upload[..],
        kind,
        &user,
        state.store.as_ref(),
        import_progress(kind),
    )
    .await?;

    state
        .reconciler
        .cache()
        .refresh(state.store.as_ref())
        .await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn upload_progress_is_logged() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut progress = import_progress(ImportKind::Clones);
            progress(50);
            progress(100);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("clones upload 50%"), "{output}");
        assert!(output.contains("clones upload 100%"), "{output}");
    }
}
