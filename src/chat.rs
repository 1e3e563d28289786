//! Orquestador del chat: una petición recorre, en orden,
//!
//!   RECEIVE → DETECT_LANG → TRANSLATE_IN? → CACHE_ENSURE → RETRIEVE →
//!   GENERATE → TRANSLATE_OUT? → PERSIST_TURNS → RESPOND
//!
//! y cualquier fallo la lleva a ERROR. Nada se guarda antes de
//! PERSIST_TURNS, así que cancelar o fallar a mitad no deja rastro.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::{
    config::AppConfig,
    conversation::{resolve_id, ConversationStore},
    error::{require_non_empty, CoreError, CoreResult},
    index_cache::IndexCacheManager,
    language::{detect_language, Language, LanguagePipeline, Translation},
    llm::GenerationProvider,
    models::{ChatRequest, ChatResponse, Turn},
    rag::{build_prompt, Retriever, DEFAULT_TOP_K},
    translation::ProviderReply,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Receive,
    DetectLang,
    TranslateIn,
    CacheEnsure,
    Retrieve,
    Generate,
    TranslateOut,
    PersistTurns,
    Respond,
    Error,
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChatStage::Receive => "RECEIVE",
            ChatStage::DetectLang => "DETECT_LANG",
            ChatStage::TranslateIn => "TRANSLATE_IN",
            ChatStage::CacheEnsure => "CACHE_ENSURE",
            ChatStage::Retrieve => "RETRIEVE",
            ChatStage::Generate => "GENERATE",
            ChatStage::TranslateOut => "TRANSLATE_OUT",
            ChatStage::PersistTurns => "PERSIST_TURNS",
            ChatStage::Respond => "RESPOND",
            ChatStage::Error => "ERROR",
        };
        f.write_str(name)
    }
}

fn enter(stage: &mut ChatStage, next: ChatStage) {
    debug!("Chat: {stage} → {next}");
    *stage = next;
}

/// Límites del orquestador.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub top_k: usize,
    pub max_message_chars: usize,
    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
}

impl ChatSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            top_k: cfg.retrieval_top_k,
            max_message_chars: cfg.max_message_chars,
            embedding_timeout: cfg.embedding_timeout,
            generation_timeout: cfg.generation_timeout,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_message_chars: 2000,
            embedding_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
        }
    }
}

pub struct ChatOrchestrator {
    cache: Arc<IndexCacheManager>,
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    language: LanguagePipeline,
    conversations: Arc<ConversationStore>,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        cache: Arc<IndexCacheManager>,
        generator: Arc<dyn GenerationProvider>,
        language: LanguagePipeline,
        conversations: Arc<ConversationStore>,
        settings: ChatSettings,
    ) -> Self {
        // La consulta se embebe con el mismo proveedor que los índices.
        let retriever = Retriever::new(cache.embedder(), settings.embedding_timeout);
        Self {
            cache,
            retriever,
            generator,
            language,
            conversations,
            settings,
        }
    }

    /// Atiende un mensaje de chat de principio a fin.
    pub async fn handle(&self, request: ChatRequest) -> CoreResult<ChatResponse> {
        let mut stage = ChatStage::Receive;
        match self.run(&request, &mut stage).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let failed_at = stage;
                enter(&mut stage, ChatStage::Error);
                error!(
                    "Chat de {} falló en {failed_at}: {e}",
                    request.user_id
                );
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ChatRequest, stage: &mut ChatStage) -> CoreResult<ChatResponse> {
        // RECEIVE
        let user_id = request.user_id.trim();
        require_non_empty("user_id", user_id)?;
        require_non_empty("message", &request.message)?;
        let length = request.message.chars().count();
        if length > self.settings.max_message_chars {
            return Err(CoreError::Validation(format!(
                "el mensaje tiene {length} caracteres y el máximo es {}",
                self.settings.max_message_chars
            )));
        }

        let display = Language::resolve(request.language.as_deref());
        let conversation_id = resolve_id(request.conversation_id.as_deref());
        if let Ok(existing) = self.conversations.get(&conversation_id) {
            if existing.owner != user_id {
                return Err(CoreError::Validation(format!(
                    "la conversación {conversation_id} pertenece a otro usuario"
                )));
            }
        }
        let history = self.conversations.history(&conversation_id);

        enter(stage, ChatStage::DetectLang);
        let detected = detect_language(&request.message);

        let inbound = if detected.is_pivot() {
            Translation::unchanged(&request.message)
        } else {
            enter(stage, ChatStage::TranslateIn);
            self.language
                .translate_to_pivot(&request.message, detected)
                .await
        };

        enter(stage, ChatStage::CacheEnsure);
        let snapshot = self.cache.ensure_fresh(user_id).await?;

        enter(stage, ChatStage::Retrieve);
        let relevant = self
            .retriever
            .retrieve_top_k(
                &inbound.text,
                &snapshot.index,
                &snapshot.records,
                self.settings.top_k,
            )
            .await?;

        enter(stage, ChatStage::Generate);
        let prompt = build_prompt(&inbound.text, &relevant, &history);
        let pivot_answer = self.generate(&prompt).await?;

        let outbound = if display.is_pivot() {
            Translation::unchanged(&pivot_answer)
        } else {
            enter(stage, ChatStage::TranslateOut);
            self.language
                .translate(&pivot_answer, display, Language::PIVOT)
                .await
        };

        enter(stage, ChatStage::PersistTurns);
        let user_turn = Turn::user(
            request.message.clone(),
            detected,
            inbound.translated.then(|| inbound.text.clone()),
        );
        let assistant_turn = Turn::assistant(
            pivot_answer,
            outbound.translated.then(|| outbound.text.clone()),
        );
        self.conversations
            .append_exchange(&conversation_id, user_id, vec![user_turn, assistant_turn])
            .await?;

        enter(stage, ChatStage::Respond);
        info!(
            "Chat de {user_id} en {conversation_id}: idioma {detected}, {} de {} recibos usados.",
            relevant.len(),
            snapshot.record_count
        );

        Ok(ChatResponse {
            conversation_id,
            response: outbound.text,
            language: display,
            detected_language: detected,
            relevant_receipts_count: relevant.len(),
            total_receipts: snapshot.record_count,
            translation_degraded: inbound.degraded || outbound.degraded,
            thinking_text: display.thinking_text(),
            follow_up_chips: display.follow_up_chips().to_vec(),
            timestamp: Utc::now(),
        })
    }

    /// Un fallo de generación aborta la petición: no hay texto de reserva.
    async fn generate(&self, prompt: &str) -> CoreResult<String> {
        let reply = match timeout(self.settings.generation_timeout, self.generator.generate(prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "fallo de generación: {e}"
                )))
            }
            Err(_) => {
                return Err(CoreError::UpstreamUnavailable(
                    "timeout de generación".to_string(),
                ))
            }
        };

        match reply {
            ProviderReply::Success(text) => Ok(text),
            ProviderReply::ParseFailure { raw_text } => Err(CoreError::UpstreamUnavailable(
                format!("respuesta de generación no interpretable: '{raw_text}'"),
            )),
        }
    }
}
