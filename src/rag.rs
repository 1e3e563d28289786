//! Recuperación top-K sobre el índice de un usuario y construcción del prompt.
//!
//! Flujo:
//!   1. Embedding de la consulta con el mismo proveedor que construyó el índice.
//!   2. Búsqueda por producto interno sobre vectores normalizados.
//!   3. Render de los recibos recuperados y del historial reciente como contexto.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::{
    error::{CoreError, CoreResult},
    llm::EmbeddingProvider,
    models::{Record, Role, Turn},
    vector_store::FlatIndex,
};

/// Número de recibos que se recuperan si no se configura otro.
pub const DEFAULT_TOP_K: usize = 3;

/// Turnos del historial que se incluyen en el prompt.
const HISTORY_WINDOW: usize = 5;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    call_timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, call_timeout: Duration) -> Self {
        Self {
            embedder,
            call_timeout,
        }
    }

    /// Devuelve como mucho `k` registros, del más al menos similar. Un índice
    /// vacío no es un error: simplemente no hay contexto.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        index: &FlatIndex,
        records: &[Record],
        k: usize,
    ) -> CoreResult<Vec<Record>> {
        if index.is_empty() || records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let texts = [query.to_string()];
        let query_vec = match timeout(self.call_timeout, self.embedder.embed(&texts)).await {
            Ok(Ok(mut vectors)) if vectors.len() == 1 => vectors.remove(0),
            Ok(Ok(vectors)) => {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "se esperaba 1 embedding para la consulta y llegaron {}",
                    vectors.len()
                )))
            }
            Ok(Err(e)) => {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "fallo de embeddings en la consulta: {e}"
                )))
            }
            Err(_) => {
                return Err(CoreError::UpstreamUnavailable(
                    "timeout de embeddings en la consulta".to_string(),
                ))
            }
        };

        if query_vec.len() != index.dimension() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "la consulta tiene dimensión {} y el índice {}",
                query_vec.len(),
                index.dimension()
            )));
        }

        let hits = index.search(&query_vec, k);
        debug!(
            "Recuperación: {} de {} registros (k={k}).",
            hits.len(),
            records.len()
        );

        Ok(hits
            .into_iter()
            .filter_map(|hit| records.get(hit.position).cloned())
            .collect())
    }
}

/// Bloque de contexto con los recibos relevantes.
pub fn render_receipts(relevant: &[Record]) -> String {
    if relevant.is_empty() {
        return "No relevant receipts found for this query.".to_string();
    }

    let mut context = String::from("Relevant receipt information:\n");
    for (i, receipt) in relevant.iter().enumerate() {
        context.push_str(&format!("\nReceipt {}:\n", i + 1));
        context.push_str(&format!("- Vendor: {}\n", receipt.vendor_or_unknown()));
        context.push_str(&format!("- Categories: {}\n", receipt.categories.join(", ")));
        context.push_str(&format!("- Parsed Data: {}\n", receipt.raw_text));
        context.push_str(&format!("- Extra Fields: {}\n", receipt.extra_fields_json()));
        context.push_str(&format!("- Date: {}\n", receipt.timestamp.to_rfc3339()));
    }
    context
}

/// Últimos turnos en el idioma pivote, uno por línea.
pub fn render_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut text = String::from("Conversation History:\n");
    for turn in &history[start..] {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        text.push_str(&format!("{role}: {}\n", turn.pivot_text()));
    }
    text
}

/// Prompt completo que se envía al modelo de generación.
pub fn build_prompt(query: &str, relevant: &[Record], history: &[Turn]) -> String {
    format!(
        "{receipts}\n\n{history}\nUser Query: {query}\n\n\
Please provide a helpful, conversational response based on the user's receipt data and conversation history.\n\
If the user asks about spending patterns, categories, vendors, or specific receipts, use the provided context.\n\
If no relevant data is available, politely inform the user and suggest what they could do to get better insights.",
        receipts = render_receipts(relevant),
        history = render_history(history),
    )
}
