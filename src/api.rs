use std::path::PathBuf;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    copilot, extract,
    models::{ChatTurn, Flashcard, MindMap, QuizItem},
    pipeline::{self, PipelineOptions},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct GenerateMapPayload {
    text: String,
    /// Sobrescriben la configuración del servidor si se envían.
    chunk_threshold_chars: Option<usize>,
    enable_map_summary: Option<bool>,
}

#[derive(Deserialize)]
pub struct StudyAidsPayload {
    /// Si no se envía, se usa el resumen del último mapa generado.
    summary: Option<String>,
}

#[derive(Serialize)]
pub struct StudyAidsResponse {
    flashcards: Vec<Flashcard>,
    quiz: Vec<QuizItem>,
}

#[derive(Deserialize)]
pub struct CopilotPayload {
    question: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
pub struct CopilotResponse {
    reply: String,
}

#[derive(Deserialize)]
pub struct ExtractPayload {
    path: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/generate-map", post(generate_map_handler))
        .route("/api/map", get(map_handler))
        .route("/api/study-aids", post(study_aids_handler))
        .route("/api/copilot", post(copilot_handler))
        .route("/api/extract", post(extract_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Lanza la generación del mapa en segundo plano; el frontend sondea
/// `/api/status` y recupera el resultado con `/api/map`.
#[axum::debug_handler]
async fn generate_map_handler(
    State(state): State<AppState>,
    Json(payload): Json<GenerateMapPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if state.status.lock().unwrap().is_busy {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "Ya hay una generación en curso."})),
        ));
    }

    let opts = PipelineOptions {
        chunk_threshold_chars: payload
            .chunk_threshold_chars
            .unwrap_or(state.config.chunk_threshold_chars),
        enable_map_summary: payload
            .enable_map_summary
            .unwrap_or(state.config.enable_map_summary),
    };

    spawn(async move {
        {
            let mut status = state.status.lock().unwrap();
            status.is_busy = true;
            status.message = "Iniciando la generación del mapa...".to_string();
            status.progress = 0.0;
        }

        let map = pipeline::process_text_to_mindmap(
            &state.llm_manager,
            &payload.text,
            &opts,
            state.status.clone(),
        )
        .await;

        let mut status = state.status.lock().unwrap();
        status.is_busy = false;
        status.progress = 0.0;
        status.message = match (&map.meta.error, &map.meta.warning) {
            (Some(error), _) => format!("Generación terminada con error: {error}"),
            (None, Some(warning)) => format!("Mapa mínimo generado (aviso: {warning})"),
            (None, None) => format!(
                "¡Mapa generado! {} nodos.",
                map.meta.n_nodes.unwrap_or(map.nodes.len())
            ),
        };

        *state.last_map.lock().unwrap() = Some(map);
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn map_handler(
    State(state): State<AppState>,
) -> Result<Json<MindMap>, (StatusCode, Json<serde_json::Value>)> {
    match state.last_map.lock().unwrap().clone() {
        Some(map) => Ok(Json(map)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Todavía no se ha generado ningún mapa."})),
        )),
    }
}

#[axum::debug_handler]
async fn study_aids_handler(
    State(state): State<AppState>,
    Json(payload): Json<StudyAidsPayload>,
) -> Result<Json<StudyAidsResponse>, (StatusCode, Json<serde_json::Value>)> {
    let summary = match payload.summary {
        Some(summary) => summary,
        None => state
            .last_map
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|map| map.meta.summary.clone())
            .unwrap_or_default(),
    };

    if summary.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Genera primero un mapa con resumen para obtener tarjetas y quiz."})),
        ));
    }

    let (flashcards, quiz) =
        copilot::generate_flashcards_and_quiz(&state.llm_manager, &summary).await;
    Ok(Json(StudyAidsResponse { flashcards, quiz }))
}

#[axum::debug_handler]
async fn copilot_handler(
    State(state): State<AppState>,
    Json(payload): Json<CopilotPayload>,
) -> Result<Json<CopilotResponse>, (StatusCode, Json<serde_json::Value>)> {
    let map = state.last_map.lock().unwrap().clone();

    match copilot::ask_copilot(
        &state.llm_manager,
        &payload.question,
        &payload.history,
        map.as_ref(),
    )
    .await
    {
        Ok(reply) => Ok(Json(CopilotResponse { reply })),
        Err(e) => {
            error!("Error del copiloto: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Error al consultar el copiloto: {e}")})),
            ))
        }
    }
}

#[axum::debug_handler]
async fn extract_handler(
    Json(payload): Json<ExtractPayload>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let path = PathBuf::from(&payload.path);
    if !path.is_file() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "La ruta proporcionada no es un fichero válido."})),
        ));
    }

    match extract::extract_text_from_path(&path) {
        Ok(text) => Ok(Json(json!({ "text": text }))),
        Err(e) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("Error al extraer el texto: {e}")})),
        )),
    }
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
