//! Modelos de dominio (recibos, turnos, conversaciones y el contrato del chat).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Un recibo/transacción ya extraído por el colaborador de ingesta.
/// Es inmutable una vez indexado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub owner: String,
    pub vendor: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Texto bruto que devolvió la extracción.
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub extra_fields: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Representación textual que se envía al modelo de embeddings.
    /// Debe ser determinista: de ella depende la comparación de consultas.
    pub fn embedding_text(&self) -> String {
        format!(
            "Receipt ID: {}\nVendor: {}\nCategories: {}\nParsed Data: {}\nExtra Fields: {}\nTimestamp: {}",
            self.id,
            self.vendor_or_unknown(),
            self.categories.join(", "),
            self.raw_text,
            self.extra_fields_json(),
            self.timestamp.to_rfc3339(),
        )
    }

    pub fn vendor_or_unknown(&self) -> &str {
        if self.vendor.trim().is_empty() {
            "Unknown"
        } else {
            &self.vendor
        }
    }

    pub fn extra_fields_json(&self) -> String {
        if self.extra_fields.is_null() {
            "{}".to_string()
        } else {
            self.extra_fields.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Un mensaje dentro de una conversación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Texto tal y como lo escribió el usuario o tal y como se le mostró.
    pub content: String,
    pub original_language: Language,
    /// Forma alternativa del texto: la versión pivote de un mensaje de
    /// usuario traducido, o la versión mostrada de una respuesta traducida.
    pub translated_content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: String, language: Language, pivot_form: Option<String>) -> Self {
        Self {
            role: Role::User,
            content,
            original_language: language,
            translated_content: pivot_form,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(pivot_text: String, displayed: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: pivot_text,
            original_language: Language::PIVOT,
            translated_content: displayed,
            timestamp: Utc::now(),
        }
    }

    /// Texto en el idioma pivote, el que se usa para construir prompts.
    pub fn pivot_text(&self) -> &str {
        if self.original_language.is_pivot() {
            &self.content
        } else {
            self.translated_content.as_deref().unwrap_or(&self.content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub owner: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Petición de chat tal y como llega del cliente.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Código del idioma de visualización; los desconocidos caen al pivote.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    pub language: Language,
    pub detected_language: Language,
    pub relevant_receipts_count: usize,
    pub total_receipts: usize,
    pub translation_degraded: bool,
    pub thinking_text: &'static str,
    pub follow_up_chips: Vec<&'static str>,
    pub timestamp: DateTime<Utc>,
}
