//! Carga y gestión de configuración de la aplicación (Gemini + pipeline).

use anyhow::{anyhow, Result};
use std::env;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    Gemini,
    OpenAI,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    /// Umbral en caracteres a partir del cual el texto se pre-resume por trozos.
    pub chunk_threshold_chars: usize,
    /// Activa la etapa de resumen + quiz del mapa.
    pub enable_map_summary: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        // La clave la lee Rig del entorno en cada llamada; aquí sólo se valida
        // su presencia para fallar en el arranque y no en la primera petición.
        env::var("GEMINI_API_KEY").map_err(|_| anyhow!("Falta GEMINI_API_KEY en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3344".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        let chunk_threshold_chars = env::var("CHUNK_THRESHOLD_CHARS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18_000);

        let enable_map_summary = env::var("ENABLE_MAP_SUMMARY")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            chunk_threshold_chars,
            enable_map_summary,
        })
    }
}
