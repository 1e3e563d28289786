//! Carga y gestión de configuración de la aplicación (LLM, traducción y límites).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    pub translation_api_url: Url,

    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
    pub translation_timeout: Duration,

    pub retrieval_top_k: usize,
    pub max_message_chars: usize,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero con una fuente de variables inyectable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr = var_or("SERVER_ADDR", "127.0.0.1:3322");

        let llm_provider = LlmProvider::from_str(&var_or("LLM_PROVIDER", "openai"))?;
        let llm_embedding_model = var_or("LLM_EMBEDDING_MODEL", "text-embedding-3-small");
        let llm_chat_model = var_or("LLM_CHAT_MODEL", "gpt-4o-mini");

        let translation_raw = var_or(
            "TRANSLATION_API_URL",
            "https://api.mymemory.translated.net/get",
        );
        let translation_api_url = Url::parse(&translation_raw)
            .map_err(|e| anyhow!("TRANSLATION_API_URL inválida ({translation_raw}): {e}"))?;

        let embedding_timeout = Duration::from_secs(parse_number(&lookup, "EMBEDDING_TIMEOUT_SECS", 30)?);
        let generation_timeout = Duration::from_secs(parse_number(&lookup, "GENERATION_TIMEOUT_SECS", 60)?);
        let translation_timeout = Duration::from_secs(parse_number(&lookup, "TRANSLATION_TIMEOUT_SECS", 10)?);

        let retrieval_top_k = parse_number(&lookup, "RETRIEVAL_TOP_K", 3)?;
        let max_message_chars = parse_number(&lookup, "MAX_MESSAGE_CHARS", 2000)?;

        Ok(Self {
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            translation_api_url,
            embedding_timeout,
            generation_timeout,
            translation_timeout,
            retrieval_top_k,
            max_message_chars,
        })
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key} debe ser un número entero, se recibió '{raw}'")),
    }
}
