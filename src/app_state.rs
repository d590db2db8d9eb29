use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{config::AppConfig, llm::LlmManager, models::MindMap};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub status: Arc<Mutex<Status>>,
    /// Último mapa generado, disponible para el frontend y el copiloto.
    pub last_map: Arc<Mutex<Option<MindMap>>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
