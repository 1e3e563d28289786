use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    chat::ChatOrchestrator,
    config::AppConfig,
    conversation::ConversationStore,
    index_cache::{CacheStats, IndexCacheManager},
    ingest::InMemoryRecordStore,
    language::LanguagePipeline,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chat: Arc<ChatOrchestrator>,
    pub records: Arc<InMemoryRecordStore>,
    pub cache: Arc<IndexCacheManager>,
    pub conversations: Arc<ConversationStore>,
    pub language: LanguagePipeline,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Contadores que expone `/api/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    pub message: String,
    pub conversations: usize,
    #[serde(flatten)]
    pub cache: CacheStats,
}

impl AppState {
    pub fn status(&self) -> Status {
        Status {
            message: "Servidor listo.".to_string(),
            conversations: self.conversations.len(),
            cache: self.cache.stats(),
        }
    }

    /// Vacía todos los almacenes de proceso.
    pub fn teardown(&self) {
        self.conversations.clear();
        self.cache.clear();
    }
}
