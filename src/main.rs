//! upas-import - Bulk beneficiary import and intake-rules service for the
//! UPAS case-management backend.

mod backend;
mod columns;
mod config;
mod file_check;
mod import;
mod intake;
mod loan;
mod notify;
mod preview;
mod refdata;
mod retry;
mod search;
mod template;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backend::{UpasApi, UpasClient};
use config::Config;
use file_check::FileMeta;
use import::{ImportError, ImportSession};
use notify::Notifier;
use refdata::RefData;
use search::SearchRegistry;

/// One import dialog's session, individually locked so a long backend
/// call in one dialog never blocks the others.
type SharedSession = Arc<std::sync::Mutex<ImportSession>>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    api: Arc<dyn UpasApi>,
    sessions: Arc<std::sync::Mutex<HashMap<String, SharedSession>>>,
    refdata: RefData,
    notifier: Notifier,
    search: SearchRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "upas_import=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let client = UpasClient::new(&config)?;
    info!("Backend client initialized for {}", config.backend_url);

    let state = AppState {
        api: Arc::new(client),
        sessions: Arc::new(std::sync::Mutex::new(HashMap::new())),
        refdata: RefData::new(),
        notifier: Notifier::new(),
        search: SearchRegistry::new(),
    };

    // Hydrate dictionaries. The service still starts if the backend is
    // down; forms lose label resolution until the next refresh.
    match state.api.fetch_dictionaries().await {
        Ok(dict) => state.refdata.replace(dict),
        Err(e) => {
            warn!("Could not load dictionaries at startup: {}", e);
            state
                .notifier
                .warning("Référentiels", &format!("chargement initial impossible: {e}"));
        }
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/import/preview", post(preview_upload))
        .route("/import/validate", post(validate_upload))
        .route("/import/execute", post(execute_import))
        .route("/import/status", get(import_status))
        .route("/import/template", get(download_template))
        .route("/import/template/instructions", get(template_instructions))
        .route("/search/beneficiaires", get(search_beneficiaires))
        .route("/intake/evaluate", post(evaluate_intake))
        .route("/intake/assistance/evaluate", post(evaluate_assistance))
        .route("/notifications", get(notifications))
        .layer(DefaultBodyLimit::max(12 * 1024 * 1024)) // headroom above the 10 MiB file cap
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Fields read out of an import multipart body.
#[derive(Default)]
struct ImportUpload {
    filename: String,
    mime: Option<String>,
    bytes: Vec<u8>,
    campagne_id: Option<i64>,
    session_id: Option<String>,
    ignore_doublons: bool,
    force: bool,
}

/// Drain a multipart body into an [`ImportUpload`].
async fn read_upload(mut multipart: Multipart) -> Result<ImportUpload, (StatusCode, String)> {
    let mut upload = ImportUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                upload.filename = field.file_name().unwrap_or("import").to_string();
                upload.mime = field.content_type().map(|m| m.to_string());
                upload.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                    .to_vec();
            }
            Some("campagne_id") => {
                let text = field.text().await.map_err(bad_field)?;
                upload.campagne_id = text.trim().parse().ok();
            }
            Some("session_id") => {
                upload.session_id = Some(field.text().await.map_err(bad_field)?);
            }
            Some("ignore_doublons") => {
                upload.ignore_doublons = field.text().await.map_err(bad_field)? == "true";
            }
            Some("force_import") => {
                upload.force = field.text().await.map_err(bad_field)? == "true";
            }
            _ => {}
        }
    }

    Ok(upload)
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, format!("Bad multipart field: {}", e))
}

/// Metadata checks shared by every upload handler. Runs before any
/// content is parsed or sent anywhere.
fn check_upload(
    upload: &ImportUpload,
    notifier: &Notifier,
) -> Result<(), (StatusCode, String)> {
    if upload.bytes.is_empty() {
        notifier.error("Import", "aucun fichier fourni");
        return Err((StatusCode::BAD_REQUEST, ImportError::MissingFile.to_string()));
    }
    let meta = FileMeta {
        filename: upload.filename.clone(),
        mime: upload.mime.clone(),
        size: upload.bytes.len() as u64,
    };
    if let Err(e) = file_check::check_file(&meta) {
        notifier.error("Fichier refusé", &e.to_string());
        return Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()));
    }
    Ok(())
}

/// Decode an uploaded file locally and report detected columns. No
/// network: this is the gate an operator sees before remote validation.
async fn preview_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<preview::TablePreview>, (StatusCode, String)> {
    let upload = read_upload(multipart).await?;
    check_upload(&upload, &state.notifier)?;

    let preview = preview::preview_table(&upload.filename, &upload.bytes).map_err(|e| {
        state.notifier.error("Lecture du fichier", &e.to_string());
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;

    if !preview.has_required_columns {
        state.notifier.warning(
            "Colonnes manquantes",
            &preview.missing_columns.join(", "),
        );
    }

    Ok(Json(preview))
}

/// Submit the file for dry-run validation on the backend.
async fn validate_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<backend::ValidationReport>, (StatusCode, String)> {
    let upload = read_upload(multipart).await?;
    check_upload(&upload, &state.notifier)?;

    let session = session_for(&state, &upload);
    // No lock is held while the backend call runs.
    let campagne_id = {
        let mut session = session.lock().unwrap();
        session.set_campagne(upload.campagne_id);
        session.begin_validate()
    }
    .map_err(|e| import_failure(&state, e))?;

    let outcome = state
        .api
        .validate_file(upload.bytes, upload.filename, campagne_id)
        .await;

    let recorded = session.lock().unwrap().record_validation(outcome);
    match recorded {
        Ok(report) => {
            if report.invalid_rows > 0 {
                state.notifier.warning(
                    "Validation",
                    &format!("{} ligne(s) invalide(s)", report.invalid_rows),
                );
            }
            Ok(Json(report))
        }
        Err(e) => Err(import_failure(&state, e)),
    }
}

/// Execute the import, honoring the local validation gate.
async fn execute_import(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<backend::ImportResult>, (StatusCode, String)> {
    let upload = read_upload(multipart).await?;
    check_upload(&upload, &state.notifier)?;

    let key = session_key(&upload);
    let session = session_for(&state, &upload);
    // The session stays unlocked but marked busy for the duration of the
    // backend call, so concurrent attempts get AlreadyRunning and the
    // status endpoint sees the import in flight.
    let campagne_id = {
        let mut session = session.lock().unwrap();
        session.set_campagne(upload.campagne_id);
        session.begin_import(upload.force)
    }
    .map_err(|e| import_failure(&state, e))?;

    let outcome = state
        .api
        .import_file(
            upload.bytes,
            upload.filename,
            campagne_id,
            upload.ignore_doublons,
            upload.force,
        )
        .await;

    let result = session
        .lock()
        .unwrap()
        .finish_import(outcome)
        .map_err(|e| import_failure(&state, e))?;

    if result.error_count > 0 {
        state.notifier.warning(
            "Import partiel",
            &format!("{} ligne(s) rejetée(s)", result.error_count),
        );
    }

    // Leave the summary on screen briefly, then close the workflow.
    let session_map = state.sessions.clone();
    tokio::spawn(async move {
        tokio::time::sleep(import::CLOSE_DELAY).await;
        session_map.lock().unwrap().remove(&key);
    });

    Ok(Json(result))
}

fn session_key(upload: &ImportUpload) -> String {
    upload
        .session_id
        .clone()
        .unwrap_or_else(|| "default".to_string())
}

/// Get or create the session for this dialog, wiring the success
/// notification on first use. The map lock is only held for the lookup.
fn session_for(state: &AppState, upload: &ImportUpload) -> SharedSession {
    let key = session_key(upload);
    let mut sessions = state.sessions.lock().unwrap();
    sessions
        .entry(key)
        .or_insert_with(|| {
            let mut session = ImportSession::new(upload.campagne_id);
            let notifier = state.notifier.clone();
            session.set_on_success(Box::new(move |result| {
                notifier.info(
                    "Import terminé",
                    &format!(
                        "{} importé(s), {} ignoré(s), {} en erreur",
                        result.imported_count, result.skipped_count, result.error_count
                    ),
                );
            }));
            Arc::new(std::sync::Mutex::new(session))
        })
        .clone()
}

/// Map an import failure to a response, always notifying first.
fn import_failure(state: &AppState, e: ImportError) -> (StatusCode, String) {
    let status = match &e {
        ImportError::MissingFile | ImportError::NoCampaign => StatusCode::BAD_REQUEST,
        ImportError::ValidationRequired | ImportError::InvalidRows(_) => StatusCode::CONFLICT,
        ImportError::AlreadyRunning => StatusCode::CONFLICT,
        ImportError::ValidationUnavailable(_) => StatusCode::BAD_GATEWAY,
        ImportError::Backend(b) if !b.is_transient() => StatusCode::UNPROCESSABLE_ENTITY,
        ImportError::Backend(_) => StatusCode::BAD_GATEWAY,
    };
    let category = if e.is_local() { "Import" } else { "Serveur" };
    state.notifier.error(category, &e.to_string());
    (status, e.to_string())
}

#[derive(serde::Deserialize)]
struct StatusQuery {
    session_id: Option<String>,
}

#[derive(serde::Serialize)]
struct ImportStatus {
    importing: bool,
    can_import_unforced: bool,
    last_report: Option<backend::ValidationReport>,
}

/// Current state of an import dialog, for a client re-opening it.
async fn import_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<ImportStatus> {
    let key = query.session_id.unwrap_or_else(|| "default".to_string());
    let session = state.sessions.lock().unwrap().get(&key).cloned();
    let status = match session {
        Some(session) => {
            let session = session.lock().unwrap();
            ImportStatus {
                importing: session.is_importing(),
                can_import_unforced: session.can_import_unforced(),
                last_report: session.last_report().cloned(),
            }
        }
        None => ImportStatus {
            importing: false,
            can_import_unforced: false,
            last_report: None,
        },
    };
    Json(status)
}

#[derive(serde::Deserialize)]
struct TemplateQuery {
    campagne_id: i64,
}

/// Download the import template rendered as CSV.
async fn download_template(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let template = state
        .api
        .fetch_template(query.campagne_id)
        .await
        .map_err(|e| {
            state.notifier.error("Modèle d'import", &e.to_string());
            (StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    let bytes = template::render_csv(&template).map_err(|e| {
        state.notifier.error("Modèle d'import", &e.to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        template::download_filename(query.campagne_id)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Free-text filling instructions accompanying the template.
async fn template_instructions(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> Result<String, (StatusCode, String)> {
    let template = state
        .api
        .fetch_template(query.campagne_id)
        .await
        .map_err(|e| {
            state.notifier.error("Modèle d'import", &e.to_string());
            (StatusCode::BAD_GATEWAY, e.to_string())
        })?;
    Ok(template.instructions)
}

#[derive(serde::Deserialize)]
struct SearchQuery {
    q: String,
    session_id: Option<String>,
}

/// Debounced beneficiary search, one debounce scope per client. A
/// superseded request answers 204 and the client keeps the newer
/// request's results.
async fn search_beneficiaires(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let key = query.session_id.as_deref().unwrap_or("default");
    let debouncer = state.search.for_client(key);
    match debouncer.search(state.api.as_ref(), query.q).await {
        None => Ok(StatusCode::NO_CONTENT.into_response()),
        Some(Ok(hits)) => Ok(Json(hits).into_response()),
        Some(Err(e)) => {
            state.notifier.error("Recherche", &e.to_string());
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

#[derive(serde::Serialize)]
struct IntakeEvaluation {
    derived: intake::Derived,
    required_fields: Vec<intake::FormField>,
}

/// Evaluate the conditional-field rules for a beneficiary draft.
async fn evaluate_intake(
    State(state): State<AppState>,
    Json(draft): Json<intake::BeneficiaryDraft>,
) -> Json<IntakeEvaluation> {
    let derived = intake::evaluate(&draft, &state.refdata);
    let required_fields = intake::required_fields(&draft, &state.refdata);
    Json(IntakeEvaluation {
        derived,
        required_fields,
    })
}

#[derive(serde::Serialize)]
struct AssistanceEvaluation {
    is_pret: bool,
    draft: intake::AssistanceDraft,
}

/// Rederive loan classification and the expected return date for an
/// assistance draft.
async fn evaluate_assistance(
    State(state): State<AppState>,
    Json(mut draft): Json<intake::AssistanceDraft>,
) -> Json<AssistanceEvaluation> {
    draft.recompute(&state.refdata);
    let is_pret = draft.is_pret(&state.refdata);
    if !is_pret {
        draft.duree_utilisation = None;
        draft.date_fin_prevue = None;
    }
    Json(AssistanceEvaluation { is_pret, draft })
}

/// Recent user-visible notifications, oldest first.
async fn notifications(State(state): State<AppState>) -> Json<Vec<notify::Notification>> {
    Json(state.notifier.recent())
}
