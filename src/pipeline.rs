//! Pipeline texto → mapa mental.
//!
//! Flujo sobre una petición, terminal en la primera condición irrecuperable:
//!   1. Texto vacío → grafo vacío con `meta.error = "no_text"`.
//!   2. Pre-resumen por trozos si el texto supera el umbral configurado.
//!   3. Título raíz (una llamada, primera línea de la respuesta).
//!   4. Jerarquía con un único reintento de prompt estricto; si aun así no hay
//!      esquema válido, grafo degenerado de un solo nodo con `warning`.
//!   5. Aplanado a nodos + aristas.
//!   6-8. Enriquecimiento a prueba de fallos: resumen + quiz del mapa,
//!      explicaciones por lotes y palabras clave. Las dos etapas con llamada
//!      al modelo son independientes y se ejecutan en paralelo; cada una
//!      escribe claves disjuntas de `meta`.
//!
//! El orquestador nunca propaga un error al llamador: todo fallo degrada a un
//! fallback documentado o a una clave `meta.*_error`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use crate::app_state::Status;
use crate::hierarchy::{self, short_id};
use crate::llm::{GatewayError, ModelGateway};
use crate::models::{truncate_chars, MapMeta, MindMap, Node, OutlineItem, QuizQa};
use crate::repair;

const NO_EXPLANATION: &str = "No explanation available.";
const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable.";
const MAX_KEYWORDS: usize = 12;

/// Parámetros de una generación (derivados de la configuración, pero
/// sobrescribibles por petición).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_threshold_chars: usize,
    pub enable_map_summary: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_threshold_chars: 18_000,
            enable_map_summary: true,
        }
    }
}

// ---------------- Prompts ----------------

fn structure_prompt(text: &str) -> String {
    format!(
        r#"You are an expert educational AI that converts study material into a detailed mind map.

INPUT TEXT:
{text}

TASK:
- Identify key topics and organize them hierarchically.
- There can be multiple levels (like 3, 4, or more) if the content naturally supports it.
- Each node must include:
  - "title": short descriptive name (2-6 words)
  - "summary": a concise explanation (<= 40 words)
  - "key_points": 1-4 short bullet points (optional)
  - "subtopics": a list of deeper related nodes (if applicable)

OUTPUT:
Return strictly valid JSON with the structure:
[
  {{
    "title": "Root Topic",
    "summary": "...",
    "key_points": ["point1", "point2"],
    "subtopics": [
      {{
        "title": "Subtopic 1",
        "summary": "...",
        "key_points": ["p1", "p2"],
        "subtopics": [ ... ]
      }}
    ]
  }}
]"#
    )
}

fn map_summary_prompt(hierarchy_json: &str) -> String {
    format!(
        r#"You are an academic summarizer. Given the structured hierarchy of a mind map,
generate a short, clear study summary in JSON format.

Input (hierarchy JSON):
{hierarchy_json}

Return valid JSON:
{{
  "thesis": "1-line overall takeaway",
  "bullets": ["6 quick revision points"],
  "quiz": [
    {{"q": "Question 1?", "a": "Answer"}},
    {{"q": "Question 2?", "a": "Answer"}}
  ]
}}"#
    )
}

fn root_name_prompt(text: &str) -> String {
    format!(
        "You are given a block of study material.\n\
         Generate a short, descriptive title (max 6 words) that represents the main theme or subject.\n\
         Return only the title - no explanation.\n\n\
         Input text:\n{text}"
    )
}

fn explanations_prompt(titles: &[String]) -> String {
    let listed: Vec<String> = titles.iter().map(|t| format!("- {t}")).collect();
    format!(
        "You are an AI educator. Given a list of study topics, return a JSON array where \
         each item is {{\"title\": \"topic\", \"explanation\": \"Layman + Technical + Tip (max 90 words)\"}}.\n\n\
         Topics:\n{}",
        listed.join("\n")
    )
}

// ---------------- Pipeline principal ----------------

/// Convierte texto crudo en un mapa mental multinivel (nodos + aristas +
/// metadatos). Siempre devuelve un `MindMap` bien formado.
pub async fn process_text_to_mindmap<G: ModelGateway>(
    gateway: &G,
    text: &str,
    opts: &PipelineOptions,
    status: Arc<Mutex<Status>>,
) -> MindMap {
    let text = text.trim();
    if text.is_empty() {
        return MindMap {
            nodes: Vec::new(),
            edges: Vec::new(),
            meta: MapMeta {
                summary: Some(String::new()),
                error: Some("no_text".to_string()),
                ..Default::default()
            },
        };
    }

    // --- Pre-resumen si el texto es demasiado largo ---
    let working_text = if text.chars().count() > opts.chunk_threshold_chars {
        presummarize(gateway, text, opts.chunk_threshold_chars, &status).await
    } else {
        text.to_string()
    };

    // --- Título raíz ---
    set_status(&status, "Generando el título del mapa...", 0.2);
    let root_title = match gateway.call(&root_name_prompt(&working_text), 1).await {
        Ok(reply) => first_line(&reply),
        Err(e) => {
            warn!("No se pudo generar el título raíz: {e}");
            String::new()
        }
    };

    // --- Estructura jerárquica, con un reintento de prompt estricto ---
    set_status(&status, "Estructurando los temas...", 0.35);
    let prompt = structure_prompt(&working_text);
    let mut outline = fetch_outline(gateway, &prompt).await;
    if outline.as_ref().is_none_or(Vec::is_empty) {
        let retry_prompt =
            format!("{prompt}\n\nRe-output strictly valid JSON with nested subtopics only.");
        outline = fetch_outline(gateway, &retry_prompt).await;
    }

    let outline = match outline.filter(|items| !items.is_empty()) {
        Some(items) => items,
        None => {
            warn!("El modelo no devolvió una jerarquía parseable; se genera el mapa mínimo");
            return fallback_map(text, &root_title);
        }
    };

    // --- Jerarquía → nodos + aristas ---
    set_status(&status, "Construyendo el grafo...", 0.55);
    let (mut nodes, edges) = hierarchy::build_graph(&outline);
    let mut meta = MapMeta {
        n_nodes: Some(nodes.len()),
        ..Default::default()
    };

    // --- Enriquecimiento: resumen + quiz y explicaciones, en paralelo ---
    set_status(&status, "Enriqueciendo el mapa (resumen y explicaciones)...", 0.75);
    let titles: Vec<String> = nodes
        .iter()
        .map(|n| n.label.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let (summary_result, explanations_result) = tokio::join!(
        map_summary_stage(gateway, &outline, opts.enable_map_summary),
        explanations_stage(gateway, &titles),
    );

    match summary_result {
        Ok(Some((summary, quiz))) => {
            meta.summary = Some(summary);
            meta.quiz = Some(quiz);
        }
        // Respuesta transportada pero no parseable: se omite sin anotar error.
        Ok(None) => {}
        Err(e) => meta.summary_error = Some(e.to_string()),
    }

    match explanations_result {
        Ok(mapping) => {
            for node in &mut nodes {
                node.ai_explanation = mapping
                    .get(node.label.trim())
                    .cloned()
                    .unwrap_or_else(|| NO_EXPLANATION.to_string());
            }
        }
        Err(e) => {
            for node in &mut nodes {
                node.ai_explanation = EXPLANATION_UNAVAILABLE.to_string();
            }
            meta.tooltip_error = Some(e.to_string());
        }
    }

    // --- Palabras clave (local, sin llamada al modelo) ---
    meta.keywords = Some(extract_keywords(&nodes));

    set_status(&status, "Mapa mental completado.", 1.0);
    info!(
        "Mapa generado: {} nodos, {} aristas",
        nodes.len(),
        edges.len()
    );

    MindMap { nodes, edges, meta }
}

// ---------------- Etapas ----------------

/// Divide el texto en trozos de tamaño fijo y resume cada uno en una frase
/// corta; la concatenación acota el tamaño del prompt de las etapas
/// posteriores sea cual sea la longitud de entrada. Un trozo fallido se omite.
async fn presummarize<G: ModelGateway>(
    gateway: &G,
    text: &str,
    chunk_chars: usize,
    status: &Arc<Mutex<Status>>,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let total_chunks = chars.len().div_ceil(chunk_chars);
    let mut summaries = Vec::new();

    for (index, chunk) in chars.chunks(chunk_chars).enumerate() {
        set_status(
            status,
            &format!("Pre-resumiendo el trozo {}/{}...", index + 1, total_chunks),
            0.05 + 0.1 * (index + 1) as f32 / total_chunks as f32,
        );
        let chunk_text: String = chunk.iter().collect();
        let prompt =
            format!("Summarize this text in one short sentence (<=25 words):\n\n{chunk_text}");
        match gateway.call(&prompt, 1).await {
            Ok(reply) => summaries.push(first_line(&reply)),
            Err(e) => warn!("No se pudo resumir el trozo {}: {e}", index + 1),
        }
    }

    summaries.join("\n")
}

async fn fetch_outline<G: ModelGateway>(gateway: &G, prompt: &str) -> Option<Vec<OutlineItem>> {
    match gateway.call(prompt, 1).await {
        Ok(raw) => repair::parse_outline(&raw),
        Err(e) => {
            warn!("Fallo obteniendo la jerarquía del modelo: {e}");
            None
        }
    }
}

/// Mapa mínimo de un solo nodo cuando la estructuración falla por completo.
/// Es un camino de éxito terminal: el frontend puede renderizarlo igualmente.
fn fallback_map(text: &str, root_title: &str) -> MindMap {
    let label = if root_title.is_empty() {
        "Main Topic".to_string()
    } else {
        root_title.to_string()
    };
    let node = Node {
        id: short_id("root"),
        label,
        level: 0,
        summary: truncate_chars(text, 320),
        key_points: Vec::new(),
        ai_explanation: String::new(),
    };
    MindMap {
        nodes: vec![node],
        edges: Vec::new(),
        meta: MapMeta {
            summary: Some(truncate_chars(text, 800)),
            warning: Some("parse_failed".to_string()),
            ..Default::default()
        },
    }
}

/// Resumen + quiz del mapa a partir de los 3 primeros temas de nivel superior.
/// `Ok(None)` cubre tanto la etapa desactivada como una respuesta no parseable.
async fn map_summary_stage<G: ModelGateway>(
    gateway: &G,
    outline: &[OutlineItem],
    enabled: bool,
) -> Result<Option<(String, Vec<QuizQa>)>, GatewayError> {
    if !enabled {
        return Ok(None);
    }

    let head = &outline[..outline.len().min(3)];
    let compact = serde_json::to_string(head).unwrap_or_default();
    let raw = gateway.call(&map_summary_prompt(&compact), 1).await?;

    let Some(parsed) = repair::parse_value(&raw) else {
        warn!("La respuesta del resumen del mapa no contenía JSON válido");
        return Ok(None);
    };

    let thesis = parsed
        .get("thesis")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let bullets: Vec<&str> = parsed
        .get("bullets")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let quiz: Vec<QuizQa> = parsed
        .get("quiz")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let summary = format!("{thesis}\n\n{}", bullets.join("\n"));
    Ok(Some((summary, quiz)))
}

/// Explicaciones por lotes: una sola llamada para N nodos en lugar de N
/// llamadas, a cambio de asignar por coincidencia exacta de etiqueta.
async fn explanations_stage<G: ModelGateway>(
    gateway: &G,
    titles: &[String],
) -> Result<HashMap<String, String>, GatewayError> {
    if titles.is_empty() {
        return Ok(HashMap::new());
    }
    let raw = gateway.call(&explanations_prompt(titles), 1).await?;
    Ok(explanation_mapping(repair::parse_value(&raw)))
}

/// Acepta tanto un array de `{title, explanation}` como un objeto
/// `titulo -> explicacion`; cualquier otra forma produce un mapa vacío.
fn explanation_mapping(parsed: Option<Value>) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    match parsed {
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(title) = item.get("title").and_then(Value::as_str) {
                    let explanation = item
                        .get("explanation")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    mapping.insert(title.trim().to_string(), explanation.to_string());
                }
            }
        }
        Some(Value::Object(entries)) => {
            for (title, value) in entries {
                if let Some(explanation) = value.as_str() {
                    mapping.insert(title.trim().to_string(), explanation.to_string());
                }
            }
        }
        _ => {}
    }
    mapping
}

/// Las 12 palabras más frecuentes de etiquetas + resúmenes, con desempate por
/// orden de primera aparición para que el resultado sea determinista.
pub fn extract_keywords(nodes: &[Node]) -> Vec<String> {
    const STRIP: &[char] = &['.', ',', ':', ';', '(', ')', '[', ']'];

    let pool: Vec<String> = nodes
        .iter()
        .map(|n| format!("{} {}", n.label, n.summary))
        .collect();

    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut next_rank = 0usize;
    for token in pool.join(" ").split_whitespace() {
        // El filtro de longitud se aplica sobre el token crudo, antes de
        // recortar puntuación.
        if token.chars().count() <= 3 {
            continue;
        }
        let lowered = token.to_lowercase();
        let word = lowered.trim_matches(STRIP);
        if word.is_empty() {
            continue;
        }
        let entry = counts.entry(word.to_string()).or_insert_with(|| {
            next_rank += 1;
            (0, next_rank)
        });
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word)
        .collect()
}

// ---------------- Utilidades ----------------

fn first_line(reply: &str) -> String {
    reply.lines().next().unwrap_or_default().trim().to_string()
}

fn set_status(status: &Arc<Mutex<Status>>, message: &str, progress: f32) {
    let mut status = status.lock().unwrap();
    status.message = message.to_string();
    status.progress = progress;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedGateway;
    use std::collections::HashSet;

    const OUTLINE_JSON: &str = r#"[
        {
            "title": "Fotosíntesis",
            "summary": "Conversión de luz en energía química",
            "key_points": ["luz", "clorofila"],
            "subtopics": [
                {"title": "Fase luminosa", "summary": "Captura de energía luminosa"},
                {"title": "Ciclo de Calvin", "summary": "Fijación del carbono"}
            ]
        }
    ]"#;

    const SUMMARY_JSON: &str = r#"{
        "thesis": "La fotosíntesis sostiene la vida.",
        "bullets": ["Ocurre en los cloroplastos", "Produce oxígeno"],
        "quiz": [{"q": "¿Dónde ocurre?", "a": "En los cloroplastos"}]
    }"#;

    const EXPLANATIONS_JSON: &str = r#"[
        {"title": "Fotosíntesis", "explanation": "Las plantas fabrican su alimento."},
        {"title": "Fase luminosa", "explanation": "Se captura la luz del sol."}
    ]"#;

    fn nuevo_status() -> Arc<Mutex<Status>> {
        Arc::new(Mutex::new(Status::default()))
    }

    fn gateway_completa() -> ScriptedGateway {
        ScriptedGateway::new(vec![
            ("short, descriptive title", Ok("Fotosíntesis\nlínea extra".to_string())),
            ("academic summarizer", Ok(format!("```json\n{SUMMARY_JSON}\n```"))),
            ("AI educator", Ok(EXPLANATIONS_JSON.to_string())),
            ("expert educational AI", Ok(OUTLINE_JSON.to_string())),
        ])
    }

    #[test]
    fn entrada_vacia_devuelve_error_terminal() {
        let gateway = ScriptedGateway::always_failing();
        let map = tokio_test::block_on(process_text_to_mindmap(
            &gateway,
            "   \n\t ",
            &PipelineOptions::default(),
            nuevo_status(),
        ));
        assert!(map.nodes.is_empty());
        assert!(map.edges.is_empty());
        assert_eq!(map.meta.error.as_deref(), Some("no_text"));
        assert_eq!(map.meta.summary.as_deref(), Some(""));
        // Terminal: ni siquiera se intenta llamar al modelo.
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn fallo_total_degrada_a_un_solo_nodo() {
        let gateway = ScriptedGateway::always_failing();
        let text = "Texto de estudio sobre biología. ".repeat(40);
        let map = process_text_to_mindmap(
            &gateway,
            &text,
            &PipelineOptions::default(),
            nuevo_status(),
        )
        .await;

        assert_eq!(map.nodes.len(), 1);
        assert!(map.edges.is_empty());
        assert_eq!(map.meta.warning.as_deref(), Some("parse_failed"));
        // El título también falló, así que se usa la etiqueta por defecto.
        assert_eq!(map.nodes[0].label, "Main Topic");
        let expected = truncate_chars(text.trim(), 800);
        assert_eq!(map.meta.summary.as_deref(), Some(expected.as_str()));
        assert!(map.nodes[0].summary.chars().count() <= 320);
    }

    #[tokio::test]
    async fn respuesta_sin_json_degrada_con_el_titulo_obtenido() {
        let gateway = ScriptedGateway::new(vec![
            ("short, descriptive title", Ok("Historia Romana".to_string())),
            ("expert educational AI", Ok("Lo siento, no puedo ayudar con eso.".to_string())),
        ]);
        let map = process_text_to_mindmap(
            &gateway,
            "Apuntes sobre el imperio romano.",
            &PipelineOptions::default(),
            nuevo_status(),
        )
        .await;

        assert_eq!(map.nodes.len(), 1);
        assert_eq!(map.nodes[0].label, "Historia Romana");
        assert_eq!(map.meta.warning.as_deref(), Some("parse_failed"));
        // Una llamada de título, una de estructura y exactamente un reintento.
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn generacion_completa_con_enriquecimiento() {
        let gateway = gateway_completa();
        let map = process_text_to_mindmap(
            &gateway,
            "Apuntes de biología sobre la fotosíntesis.",
            &PipelineOptions::default(),
            nuevo_status(),
        )
        .await;

        assert_eq!(map.nodes.len(), 3);
        assert_eq!(map.edges.len(), 2);
        assert_eq!(map.meta.n_nodes, Some(3));
        assert!(map.meta.error.is_none());
        assert!(map.meta.warning.is_none());

        let summary = map.meta.summary.as_deref().unwrap();
        assert_eq!(
            summary,
            "La fotosíntesis sostiene la vida.\n\nOcurre en los cloroplastos\nProduce oxígeno"
        );
        assert_eq!(map.meta.quiz.as_ref().unwrap().len(), 1);

        // Explicaciones asignadas por coincidencia exacta de etiqueta; las no
        // coincidentes reciben el texto por defecto.
        let by_label: std::collections::HashMap<_, _> = map
            .nodes
            .iter()
            .map(|n| (n.label.as_str(), n.ai_explanation.as_str()))
            .collect();
        assert_eq!(by_label["Fotosíntesis"], "Las plantas fabrican su alimento.");
        assert_eq!(by_label["Fase luminosa"], "Se captura la luz del sol.");
        assert_eq!(by_label["Ciclo de Calvin"], NO_EXPLANATION);

        let keywords = map.meta.keywords.as_ref().unwrap();
        assert!(!keywords.is_empty());
        assert!(keywords.len() <= 12);
    }

    #[tokio::test]
    async fn las_etapas_de_enriquecimiento_son_independientes() {
        let gateway = ScriptedGateway::new(vec![
            ("short, descriptive title", Ok("Fotosíntesis".to_string())),
            ("academic summarizer", Ok(SUMMARY_JSON.to_string())),
            ("AI educator", Err("servicio caído".to_string())),
            ("expert educational AI", Ok(OUTLINE_JSON.to_string())),
        ]);
        let map = process_text_to_mindmap(
            &gateway,
            "Apuntes de biología.",
            &PipelineOptions::default(),
            nuevo_status(),
        )
        .await;

        // El resumen sobrevive al fallo de las explicaciones.
        assert!(map.meta.summary.is_some());
        assert!(map.meta.summary_error.is_none());
        assert!(map.meta.tooltip_error.is_some());
        for node in &map.nodes {
            assert_eq!(node.ai_explanation, EXPLANATION_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn el_resumen_puede_desactivarse() {
        let gateway = gateway_completa();
        let opts = PipelineOptions {
            enable_map_summary: false,
            ..Default::default()
        };
        let map = process_text_to_mindmap(&gateway, "Apuntes.", &opts, nuevo_status()).await;
        assert!(map.meta.summary.is_none());
        assert!(map.meta.quiz.is_none());
        // Las explicaciones siguen ejecutándose.
        assert!(map.nodes.iter().any(|n| n.ai_explanation == "Las plantas fabrican su alimento."));
    }

    #[tokio::test]
    async fn el_texto_largo_se_preresume_por_trozos() {
        let gateway = ScriptedGateway::new(vec![
            ("Summarize this text", Ok("Frase resumen del trozo.".to_string())),
            ("short, descriptive title", Ok("Tema".to_string())),
            ("expert educational AI", Ok(OUTLINE_JSON.to_string())),
            ("academic summarizer", Ok(SUMMARY_JSON.to_string())),
            ("AI educator", Ok(EXPLANATIONS_JSON.to_string())),
        ]);
        let opts = PipelineOptions {
            chunk_threshold_chars: 100,
            ..Default::default()
        };
        let text = "palabra ".repeat(40); // 320 caracteres → 4 trozos
        let map = process_text_to_mindmap(&gateway, &text, &opts, nuevo_status()).await;

        assert!(map.meta.error.is_none());
        // 4 resúmenes de trozo + título + estructura + resumen + explicaciones.
        assert_eq!(gateway.call_count(), 8);
    }

    #[test]
    fn las_palabras_clave_son_deterministas() {
        let nodes: Vec<Node> = [
            ("Redes neuronales", "Las redes aprenden representaciones"),
            ("Entrenamiento", "Gradiente descendente sobre redes"),
        ]
        .iter()
        .map(|(label, summary)| Node {
            id: short_id("n0"),
            label: label.to_string(),
            level: 0,
            summary: summary.to_string(),
            key_points: Vec::new(),
            ai_explanation: String::new(),
        })
        .collect();

        let first = extract_keywords(&nodes);
        let second = extract_keywords(&nodes);
        assert_eq!(first, second);
        assert_eq!(first[0], "redes"); // la más frecuente
        assert!(first.len() <= 12);
        let unique: HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), first.len());
    }
}
