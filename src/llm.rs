//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa Gemini; OpenAI/Ollama quedan preparados para el futuro.
//!
//! Todo el resto del sistema trata "preguntar algo al modelo" como una única
//! función falible con reintentos, sin duplicar la lógica de backoff. El fallo
//! se señala con un tipo de error explícito, nunca con una cadena centinela,
//! para que el código de reparación de JSON no confunda un mensaje de error
//! con una carga útil.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::{AppConfig, LlmProvider};

/// Fallo de una llamada al modelo. Todos los fallos de transporte/servicio se
/// tratan de forma uniforme: reintento con backoff y, agotados los intentos,
/// este error tipado.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Proveedor LLM {0} aún no implementado para chat")]
    UnsupportedProvider(String),
    #[error("Llamada al modelo agotada tras {attempts} intentos: {message}")]
    Exhausted { attempts: u32, message: String },
}

/// Puerta de enlace al modelo generativo. Se abstrae como trait para poder
/// sustituirla por una implementación guionizada en los tests.
pub trait ModelGateway: Send + Sync {
    /// Envía un prompt y devuelve el texto de respuesta recortado. `retries`
    /// son los reintentos adicionales tras el primer intento.
    fn call(
        &self,
        prompt: &str,
        retries: u32,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;
}

/// Gestor de LLMs basado en Rig.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        }
    }

    async fn call_gemini(&self, prompt: &str, retries: u32) -> Result<String, GatewayError> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt as _;
        use rig::providers::gemini;

        // Cliente Gemini de Rig (lee GEMINI_API_KEY del entorno)
        let client = gemini::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gemini-2.5-flash"
        } else {
            self.chat_model.as_str()
        };

        let mut last_error = String::new();
        for attempt in 0..=retries {
            let agent = client.agent(model_name).build();
            match agent.prompt(prompt).await {
                Ok(text) => return Ok(text.trim().to_string()),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < retries {
                        // Backoff lineal: 1.2s, 2.4s, ...
                        let backoff = Duration::from_secs_f32(1.2 * (attempt + 1) as f32);
                        warn!(
                            "Fallo en la llamada a Gemini (intento {}/{}): {last_error}. \
                             Reintentando en {backoff:?}",
                            attempt + 1,
                            retries + 1
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(GatewayError::Exhausted {
            attempts: retries + 1,
            message: last_error,
        })
    }
}

impl ModelGateway for LlmManager {
    async fn call(&self, prompt: &str, retries: u32) -> Result<String, GatewayError> {
        match self.provider {
            LlmProvider::Gemini => self.call_gemini(prompt, retries).await,
            ref other => Err(GatewayError::UnsupportedProvider(format!("{other:?}"))),
        }
    }
}
