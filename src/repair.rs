//! Reparación de salida estructurada: extrae JSON válido de respuestas
//! ruidosas del modelo (prosa alrededor, vallas de markdown, etc.).
//!
//! Estrategia en dos fases:
//!   1. Parseo estricto del texto completo.
//!   2. Búsqueda voraz del primer tramo `{...}` o `[...]` (multilínea) y
//!      segundo intento de parseo sobre ese tramo.
//! Si ambas fallan se devuelve `None`; nunca se propaga un error al llamador.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::models::OutlineItem;

static RE_JSON_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("regex de tramo JSON inválida"));

/// Intenta recuperar un valor JSON de un texto arbitrario.
pub fn parse_value(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let span = RE_JSON_SPAN.find(text)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("No se pudo reparar el JSON de la respuesta del modelo: {e}");
            None
        }
    }
}

/// Valida en la frontera de reparación que la respuesta sea un array de nivel
/// superior y lo convierte a un esquema tipado de forma tolerante. Los
/// elementos que no son objetos se descartan; un valor de otra forma (objeto,
/// texto, etc.) devuelve `None` para que el orquestador reintente.
pub fn parse_outline(text: &str) -> Option<Vec<OutlineItem>> {
    let value = parse_value(text)?;
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter(|item| item.is_object())
            .map(OutlineItem::from_value)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parseo_estricto_directo() {
        let parsed = parse_value(r#"{"a": 1}"#).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn recupera_json_rodeado_de_prosa() {
        let parsed = parse_value("garbage text {\"a\":1} trailing").unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn recupera_json_en_valla_de_markdown() {
        let text = "Claro, aquí tienes:\n```json\n[{\"title\": \"Tema\"}]\n```\n";
        let parsed = parse_value(text).unwrap();
        assert_eq!(parsed, json!([{"title": "Tema"}]));
    }

    #[test]
    fn recupera_arrays_multilinea() {
        let text = "Resultado:\n[\n  1,\n  2\n]\nfin";
        assert_eq!(parse_value(text).unwrap(), json!([1, 2]));
    }

    #[test]
    fn devuelve_none_si_no_hay_json() {
        assert!(parse_value("esto no contiene nada estructurado").is_none());
        assert!(parse_value("llaves rotas { sin cierre").is_none());
    }

    #[test]
    fn ida_y_vuelta_de_un_esquema_valido() {
        let outline = vec![OutlineItem {
            title: "Raíz".into(),
            summary: "Resumen".into(),
            key_points: vec!["p1".into()],
            subtopics: vec![OutlineItem {
                title: "Hijo".into(),
                ..Default::default()
            }],
        }];
        let text = serde_json::to_string(&outline).unwrap();
        let parsed = parse_outline(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Raíz");
        assert_eq!(parsed[0].subtopics[0].title, "Hijo");
    }

    #[test]
    fn un_objeto_de_nivel_superior_no_es_un_esquema() {
        assert!(parse_outline(r#"{"title": "no es una lista"}"#).is_none());
    }

    #[test]
    fn los_elementos_no_objeto_se_descartan() {
        let parsed = parse_outline(r#"[{"title": "A"}, "texto suelto", 3]"#).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "A");
    }
}
