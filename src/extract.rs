//! Extracción de texto de documentos de estudio (PDF y texto plano).
//! Envoltorio fino de E/S: la comprensión semántica vive en el pipeline.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::warn;

/// Extrae el texto UTF-8 de un fichero soportado. Las extensiones no
/// soportadas son un error del llamador, no un fallo silencioso.
pub fn extract_text_from_path(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("");

    let text = match extension.to_lowercase().as_str() {
        "pdf" => pdf_extract::extract_text(path).map_err(|e| {
            warn!("No se pudo extraer texto del PDF {}: {e}", path.display());
            anyhow!("No se pudo extraer texto del PDF: {e}")
        })?,
        "txt" | "md" => fs::read_to_string(path)
            .map_err(|e| anyhow!("No se pudo leer el fichero {}: {e}", path.display()))?,
        other => {
            return Err(anyhow!(
                "Extensión no soportada ('.{other}'); se admiten pdf, txt y md"
            ));
        }
    };

    Ok(text.trim().to_string())
}
