//! Modelos de dominio (esquema no confiable del modelo y grafo renderizable).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profundidad máxima admitida para el esquema anidado. El modelo controla la
/// anidación, así que se acota de forma generosa en lugar de confiar en ella.
pub const MAX_OUTLINE_DEPTH: usize = 512;

/// Un elemento del esquema jerárquico devuelto por Gemini.
/// Estructura no confiable: todos los campos pueden faltar o venir mal tipados.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlineItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub subtopics: Vec<OutlineItem>,
}

impl OutlineItem {
    /// Conversión tolerante desde JSON arbitrario: los campos ausentes o con
    /// tipo incorrecto se sustituyen por valores vacíos, nunca se falla.
    pub fn from_value(value: &Value) -> Self {
        Self::from_value_at(value, 0)
    }

    fn from_value_at(value: &Value, depth: usize) -> Self {
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let key_points = value
            .get("key_points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Más allá del tope de profundidad se descartan los subtemas.
        let subtopics = if depth + 1 < MAX_OUTLINE_DEPTH {
            value
                .get("subtopics")
                .and_then(Value::as_array)
                .map(|subs| {
                    subs.iter()
                        .filter(|sub| sub.is_object())
                        .map(|sub| Self::from_value_at(sub, depth + 1))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            title,
            summary,
            key_points,
            subtopics,
        }
    }

    /// Número total de elementos del subárbol, este incluido.
    pub fn count(&self) -> usize {
        1 + self.subtopics.iter().map(OutlineItem::count).sum::<usize>()
    }
}

/// Nodo del mapa mental aplanado, tal y como lo consume el renderizador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub level: usize,
    pub summary: String,
    pub key_points: Vec<String>,
    pub ai_explanation: String,
}

/// Arista dirigida padre → hijo entre nodos del mapa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Pregunta/respuesta corta del resumen del mapa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQa {
    pub q: String,
    pub a: String,
}

/// Metadatos acumulados por el pipeline. Las claves de error señalan
/// degradación parcial, nunca un fallo total (salvo `error = "no_text"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQa>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip_error: Option<String>,
}

/// Resultado completo de una generación: el contrato estable con el frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindMap {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub meta: MapMeta,
}

/// Tarjeta de estudio generada por el compañero de estudio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub q: String,
    pub a: String,
}

/// Pregunta tipo test con 4 opciones; `answer` debe coincidir con una opción.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizItem {
    pub q: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
}

/// Turno de conversación del copiloto (rol "user" o "model").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

/// Trunca una cadena a `max` caracteres respetando los límites Unicode.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_usa_valores_vacios_para_campos_ausentes() {
        let item = OutlineItem::from_value(&json!({"title": "Tema"}));
        assert_eq!(item.title, "Tema");
        assert_eq!(item.summary, "");
        assert!(item.key_points.is_empty());
        assert!(item.subtopics.is_empty());
    }

    #[test]
    fn from_value_ignora_campos_mal_tipados() {
        let item = OutlineItem::from_value(&json!({
            "title": 42,
            "summary": ["no", "es", "texto"],
            "key_points": "tampoco",
            "subtopics": [{"title": "Hijo"}, "basura", 7]
        }));
        assert_eq!(item.title, "");
        assert_eq!(item.summary, "");
        assert!(item.key_points.is_empty());
        // Los subtemas que no son objetos se descartan sin fallar.
        assert_eq!(item.subtopics.len(), 1);
        assert_eq!(item.subtopics[0].title, "Hijo");
    }

    #[test]
    fn truncate_chars_respeta_limites_unicode() {
        assert_eq!(truncate_chars("áéíóú", 3), "áéí");
        assert_eq!(truncate_chars("corto", 140), "corto");
    }
}
