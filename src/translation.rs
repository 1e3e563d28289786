//! Proveedor de traducción externo (API HTTP estilo MyMemory).
//!
//! La respuesta JSON se modela como `ProviderReply`: o bien trae el campo
//! tipado que esperamos, o se conserva el texto bruto como fallo de parseo.
//! Nunca se rellena con valores por defecto.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::language::Language;

/// Resultado etiquetado de interpretar la salida de un proveedor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply<T> {
    Success(T),
    ParseFailure { raw_text: String },
}

impl<T> ProviderReply<T> {
    /// Convierte el resultado en error si no se pudo interpretar.
    pub fn into_result(self, what: &str) -> Result<T> {
        match self {
            ProviderReply::Success(value) => Ok(value),
            ProviderReply::ParseFailure { raw_text } => {
                Err(anyhow!("respuesta de {what} no interpretable: '{raw_text}'"))
            }
        }
    }
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseStatus")]
    response_status: serde_json::Value,
    #[serde(rename = "responseData")]
    response_data: Option<MyMemoryData>,
    #[serde(rename = "responseDetails", default)]
    response_details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MyMemoryData {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Interpreta el cuerpo JSON del servicio de traducción.
pub fn parse_translation_body(body: &str) -> ProviderReply<String> {
    let parsed: MyMemoryResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) => {
            return ProviderReply::ParseFailure {
                raw_text: body.to_string(),
            }
        }
    };

    // El servicio devuelve el estado unas veces como número y otras como texto.
    let status_ok = match &parsed.response_status {
        serde_json::Value::Number(n) => n.as_u64() == Some(200),
        serde_json::Value::String(s) => s == "200",
        _ => false,
    };

    match parsed.response_data {
        Some(data) if status_ok => ProviderReply::Success(data.translated_text),
        _ => {
            if let Some(details) = parsed.response_details {
                warn!("El servicio de traducción respondió con error: {details}");
            }
            ProviderReply::ParseFailure {
                raw_text: body.to_string(),
            }
        }
    }
}

/// Cliente HTTP del servicio de traducción.
#[derive(Debug, Clone)]
pub struct MyMemoryTranslator {
    client: reqwest::Client,
    endpoint: Url,
}

impl MyMemoryTranslator {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl TranslationProvider for MyMemoryTranslator {
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String> {
        let langpair = format!("{}|{}", source.code(), target.code());
        let body = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_translation_body(&body).into_result("traducción")
    }
}
