//! Proveedores deterministas para los tests (sin red).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::{
    index_cache::IndexCacheManager,
    ingest::{InMemoryRecordStore, NewRecord, RecordSource},
    language::Language,
    llm::{EmbeddingProvider, EmbeddingVector, GenerationProvider, GenerationReply},
    models::Record,
    translation::{ProviderReply, TranslationProvider},
};

/// Vocabulario del embedder de pruebas: una dimensión por palabra más una
/// dimensión de sesgo constante, para que ningún vector sea nulo.
const VOCABULARY: [&str; 8] = [
    "coffee",
    "milk",
    "petrol",
    "grocery",
    "pharmacy",
    "restaurant",
    "electricity",
    "book",
];

#[derive(Clone, Default)]
pub struct MockEmbedder {
    pub calls: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub extra_dims: Arc<AtomicUsize>,
    /// Devuelve vectores de longitud cero.
    pub hollow: Arc<AtomicBool>,
    delay: Duration,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn vector_for(&self, text: &str) -> EmbeddingVector {
        if self.hollow.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let lowered = text.to_lowercase();
        let mut v: EmbeddingVector = VOCABULARY
            .iter()
            .map(|word| lowered.matches(word).count() as f64)
            .collect();
        v.push(0.1);
        v.extend(std::iter::repeat(0.0).take(self.extra_dims.load(Ordering::SeqCst)));
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("embedding service down"));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

#[derive(Clone)]
pub enum GeneratorMode {
    Canned,
    Fail,
    Blank,
    Slow(Duration),
}

/// Generador que guarda los prompts recibidos. En modo `Canned` responde
/// siempre la misma frase.
#[derive(Clone)]
pub struct MockGenerator {
    pub prompts: Arc<Mutex<Vec<String>>>,
    mode: GeneratorMode,
}

impl MockGenerator {
    pub fn new(mode: GeneratorMode) -> Self {
        Self {
            prompts: Arc::new(Mutex::new(Vec::new())),
            mode,
        }
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationReply> {
        self.prompts.lock().push(prompt.to_string());
        match &self.mode {
            GeneratorMode::Canned => Ok(ProviderReply::Success("Here is your summary.".to_string())),
            GeneratorMode::Fail => Err(anyhow!("generation service down")),
            GeneratorMode::Blank => Ok(ProviderReply::ParseFailure {
                raw_text: String::new(),
            }),
            GeneratorMode::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ProviderReply::Success("late".to_string()))
            }
        }
    }
}

/// Traductor que antepone `[origen->destino] ` al texto.
#[derive(Clone, Default)]
pub struct MockTranslator {
    pub calls: Arc<AtomicUsize>,
    fail: bool,
    delay: Duration,
}

impl MockTranslator {
    pub fn working() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TranslationProvider for MockTranslator {
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(anyhow!("translation service down"));
        }
        Ok(format!("[{source}->{target}] {text}"))
    }
}

/// Fuente de registros sobre un `InMemoryRecordStore` que puede fallar o
/// tardar a voluntad.
#[derive(Clone, Default)]
pub struct MockRecordSource {
    pub store: Arc<InMemoryRecordStore>,
    pub fail: Arc<AtomicBool>,
    pub delay_ms: Arc<AtomicU64>,
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn list_records(&self, user_id: &str) -> Result<Vec<Record>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("record source down"));
        }
        self.store.list_records(user_id).await
    }
}

pub fn cache_manager(
    source: Arc<dyn RecordSource>,
    embedder: MockEmbedder,
) -> (IndexCacheManager, MockEmbedder) {
    let cache = IndexCacheManager::new(
        source,
        Arc::new(embedder.clone()),
        Duration::from_millis(500),
    );
    (cache, embedder)
}

pub fn new_record(user_id: &str, vendor: &str, raw_text: &str) -> NewRecord {
    NewRecord {
        user_id: user_id.to_string(),
        receipt_id: None,
        vendor: vendor.to_string(),
        categories: Vec::new(),
        raw_text: raw_text.to_string(),
        extra_fields: serde_json::Value::Null,
        timestamp: None,
    }
}

pub fn record(owner: &str, vendor: &str, raw_text: &str) -> Record {
    Record {
        id: format!("{owner}-{vendor}-{raw_text}"),
        owner: owner.to_string(),
        vendor: vendor.to_string(),
        categories: Vec::new(),
        raw_text: raw_text.to_string(),
        extra_fields: serde_json::Value::Null,
        timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    }
}
