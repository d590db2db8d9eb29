//! Conversión del esquema jerárquico en un grafo plano de nodos y aristas.
//!
//! Recorrido en profundidad con pila explícita (sin recursión) que conserva el
//! orden de entrada: el primer nodo sin arista entrante, en orden de creación,
//! es el que el renderizador trata como raíz.

use tracing::warn;
use uuid::Uuid;

use crate::models::{truncate_chars, Edge, Node, OutlineItem, MAX_OUTLINE_DEPTH};

const MAX_LABEL_CHARS: usize = 140;
const MAX_SUMMARY_CHARS: usize = 400;
const MAX_KEY_POINTS: usize = 6;

/// Genera un id corto y único con prefijo, p. ej. `n2_9f3ab01c`.
pub fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Aplana el esquema en nodos + aristas padre → hijo.
///
/// Las reglas de truncado (140/400/6) se aplican aquí y no antes, de modo que
/// cualquier llamador reciba nodos acotados sea cual sea la verbosidad del
/// modelo. Un elemento malformado nunca invalida el resto del grafo.
pub fn build_graph(outline: &[OutlineItem]) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    // Pila de (elemento, id del padre, nivel); se apila en orden inverso para
    // que el desapilado reproduzca el preorden del esquema.
    let mut stack: Vec<(&OutlineItem, Option<String>, usize)> = outline
        .iter()
        .rev()
        .map(|item| (item, None, 0))
        .collect();

    while let Some((item, parent_id, level)) = stack.pop() {
        let node_id = short_id(&format!("n{level}"));

        nodes.push(Node {
            id: node_id.clone(),
            label: truncate_chars(&item.title, MAX_LABEL_CHARS),
            level,
            summary: truncate_chars(&item.summary, MAX_SUMMARY_CHARS),
            key_points: item.key_points.iter().take(MAX_KEY_POINTS).cloned().collect(),
            ai_explanation: String::new(),
        });

        if let Some(parent) = parent_id {
            edges.push(Edge {
                source: parent,
                target: node_id.clone(),
            });
        }

        if item.subtopics.is_empty() {
            continue;
        }
        if level + 1 >= MAX_OUTLINE_DEPTH {
            warn!(
                "Profundidad máxima ({MAX_OUTLINE_DEPTH}) alcanzada; se descartan {} subtemas",
                item.subtopics.len()
            );
            continue;
        }
        for sub in item.subtopics.iter().rev() {
            stack.push((sub, Some(node_id.clone()), level + 1));
        }
    }

    (nodes, edges)
}
