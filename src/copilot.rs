//! Compañero de estudio: tarjetas + quiz a partir del resumen del mapa, y
//! chat contextual (copiloto) sobre el mapa generado.

use serde_json::Value;
use tracing::warn;

use crate::llm::{GatewayError, ModelGateway};
use crate::models::{ChatTurn, Flashcard, MindMap, QuizItem};
use crate::repair;

const MAX_CONTEXT_LABELS: usize = 50;

fn study_aids_prompt(summary_text: &str) -> String {
    format!(
        r#"You are an academic assistant. Based on the text below, create:
1. 5 concise flashcards (front = question, back = answer)
2. 5 short quiz questions with 4 options each and the correct answer marked.

Return valid JSON:
{{
  "flashcards": [{{"q": "...", "a": "..."}}],
  "quiz": [{{"q": "...", "options": ["...","...","...","..."], "answer": "..."}}]
}}

Text:
{summary_text}"#
    )
}

/// Genera 5 tarjetas y 5 preguntas tipo test a partir de un resumen.
///
/// Contrato de mejor esfuerzo: una única llamada sin reintentos; un resumen en
/// blanco o cualquier fallo devuelve dos listas vacías.
pub async fn generate_flashcards_and_quiz<G: ModelGateway>(
    gateway: &G,
    summary_text: &str,
) -> (Vec<Flashcard>, Vec<QuizItem>) {
    if summary_text.trim().is_empty() {
        return (Vec::new(), Vec::new());
    }

    let raw = match gateway.call(&study_aids_prompt(summary_text), 0).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("No se pudieron generar tarjetas y quiz: {e}");
            return (Vec::new(), Vec::new());
        }
    };

    let Some(parsed) = repair::parse_value(&raw) else {
        warn!("La respuesta de tarjetas/quiz no contenía JSON válido");
        return (Vec::new(), Vec::new());
    };

    let flashcards = lenient_list::<Flashcard>(parsed.get("flashcards"));
    let quiz = lenient_list::<QuizItem>(parsed.get("quiz"));
    (flashcards, quiz)
}

/// Deserializa una lista elemento a elemento, descartando los malformados en
/// lugar de invalidar la lista entera.
fn lenient_list<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Convierte el mapa en un contexto textual legible para el copiloto.
fn compose_context(map: Option<&MindMap>) -> String {
    let Some(map) = map else {
        return "No map context provided.".to_string();
    };

    let mut parts = Vec::new();
    if !map.nodes.is_empty() {
        parts.push("Mind Map Topics:".to_string());
        for node in map.nodes.iter().take(MAX_CONTEXT_LABELS) {
            parts.push(format!("- {}", node.label));
        }
    }
    if let Some(summary) = map.meta.summary.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("\nOverall Summary:\n{summary}"));
    }

    if parts.is_empty() {
        "No map context provided.".to_string()
    } else {
        parts.join("\n")
    }
}

/// Pregunta al copiloto usando el mapa como contexto y la conversación previa.
pub async fn ask_copilot<G: ModelGateway>(
    gateway: &G,
    question: &str,
    history: &[ChatTurn],
    map: Option<&MindMap>,
) -> Result<String, GatewayError> {
    let context = compose_context(map);

    let mut prompt = String::from(
        "You are MapMyNotes Copilot - a helpful academic assistant. You receive study \
         notes and mind map structures and respond clearly, concisely, and with examples.\n\n",
    );
    for turn in history {
        prompt.push_str(&format!("{}: {}\n", turn.role, turn.text));
    }
    prompt.push_str(&format!("\nContext:\n{context}\n\nUser Question: {question}"));

    gateway.call(&prompt, 1).await
}

/// Resumen rápido del mapa actual, en viñetas, apto para repaso.
pub async fn summarize_map<G: ModelGateway>(
    gateway: &G,
    map: &MindMap,
) -> Result<String, GatewayError> {
    let prompt = format!(
        "Create a clear and concise summary of this mind map suitable for quick revision. \
         Use bullet points and key ideas.\n\n{}",
        compose_context(Some(map))
    );
    gateway.call(&prompt, 1).await
}
