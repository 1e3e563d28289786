//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.
//!
//! El núcleo sólo ve dos contratos: `EmbeddingProvider` y `GenerationProvider`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

use crate::config::{AppConfig, LlmProvider};
use crate::translation::ProviderReply;

/// Vector de embedding. La dimensión es constante durante la vida del proceso.
pub type EmbeddingVector = Vec<f64>;

/// Salida del modelo de chat, ya clasificada.
pub type GenerationReply = ProviderReply<String>;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Un vector por texto de entrada, en el mismo orden.
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerationReply>;
}

/// Clasifica el texto devuelto por el modelo: una respuesta en blanco no es
/// una respuesta.
pub fn classify_completion(raw: String) -> GenerationReply {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        ProviderReply::ParseFailure { raw_text: raw }
    } else {
        ProviderReply::Success(trimmed.to_string())
    }
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);
        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn generate_with_openai(&self, prompt: &str) -> Result<GenerationReply> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        const SYSTEM_PROMPT: &str = r#"
You are SageBot, a helpful AI assistant for a smart receipt and expense management app.
You help users understand their spending patterns, analyze receipts, and provide financial insights.
Only rely on the receipt information supplied in the prompt. If it does not contain the answer, say so
politely and suggest what the user could do to get better insights.
"#;

        let client = openai::Client::from_env();

        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client.agent(model_name).preamble(SYSTEM_PROMPT).build();

        let answer = agent.prompt(prompt).await?;
        Ok(classify_completion(answer))
    }
}

#[async_trait]
impl EmbeddingProvider for LlmManager {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }
}

#[async_trait]
impl GenerationProvider for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<GenerationReply> {
        match self.provider {
            LlmProvider::OpenAI => self.generate_with_openai(prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}
