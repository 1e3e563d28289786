//! Taxonomía de errores del núcleo conversacional.
//!
//! La traducción degradada no aparece aquí: nunca es un error en el camino
//! del chat, sólo un resultado marcado como `degraded` (ver `language.rs`).

use axum::{http::StatusCode, Json};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Entrada obligatoria ausente o vacía. Se rechaza sin efectos laterales.
    #[error("error de validación: {0}")]
    Validation(String),
    /// Fallo (o timeout) de embeddings, generación o fuente de registros.
    #[error("servicio externo no disponible: {0}")]
    UpstreamUnavailable(String),
    #[error("no encontrado: {0}")]
    NotFound(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Forma de error que devuelven los handlers de la API.
    pub fn into_response_parts(self) -> (StatusCode, Json<serde_json::Value>) {
        (self.status_code(), Json(json!({ "error": self.to_string() })))
    }
}

/// Exige que un campo de texto no esté vacío tras recortar espacios.
pub fn require_non_empty(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} no puede estar vacío")));
    }
    Ok(())
}
