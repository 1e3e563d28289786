//! Caché de índices vectoriales por usuario.
//!
//! Cada usuario tiene como mucho una instantánea `{índice, embeddings,
//! registros, nº de registros al construir, instante de construcción}`. La
//! instantánea sólo es válida mientras el número de registros actual coincide
//! con el del momento de construirla; si no, se reconstruye entera antes de
//! usarla.
//!
//! Comprobar, reconstruir y devolver es una sección crítica por usuario: dos
//! peticiones del mismo usuario nunca reconstruyen a la vez. El mapa sólo se
//! toca para copiar el `Arc` de la instantánea, así que nadie ve un índice a
//! medio construir.
//!
//! La obsolescencia se detecta sólo por recuento. Editar un recibo sin cambiar
//! el total no fuerza la reconstrucción.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    error::{require_non_empty, CoreError, CoreResult},
    ingest::RecordSource,
    kv_store::{KeyValueStore, KeyedStore},
    llm::EmbeddingProvider,
    models::Record,
    vector_store::FlatIndex,
};

#[derive(Debug, Clone)]
pub struct UserIndexCache {
    pub index: FlatIndex,
    pub records: Vec<Record>,
    pub record_count: usize,
    pub built_at: DateTime<Utc>,
}

impl UserIndexCache {
    fn empty() -> Self {
        Self {
            index: FlatIndex::default(),
            records: Vec::new(),
            record_count: 0,
            built_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_users: usize,
    pub rebuilds: u64,
}

pub struct IndexCacheManager {
    source: Arc<dyn RecordSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    entries: KeyedStore<Arc<UserIndexCache>>,
    call_timeout: Duration,
    dimension: OnceLock<usize>,
    rebuilds: AtomicU64,
}

impl IndexCacheManager {
    pub fn new(
        source: Arc<dyn RecordSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            source,
            embedder,
            entries: KeyedStore::new(),
            call_timeout,
            dimension: OnceLock::new(),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Proveedor con el que se construyen los índices. Las consultas deben
    /// usar exactamente este mismo.
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedder.clone()
    }

    /// Devuelve una instantánea vigente para `user_id`, reconstruyéndola si
    /// falta o si el número de registros ha cambiado.
    pub async fn ensure_fresh(&self, user_id: &str) -> CoreResult<Arc<UserIndexCache>> {
        require_non_empty("user_id", user_id)?;

        let _gate = self.entries.lock(user_id).await;

        let records = match timeout(self.call_timeout, self.source.list_records(user_id)).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "no se pudieron leer los registros de {user_id}: {e}"
                )))
            }
            Err(_) => {
                return Err(CoreError::UpstreamUnavailable(format!(
                    "timeout leyendo los registros de {user_id}"
                )))
            }
        };

        if let Some(cached) = self.entries.get(user_id) {
            if cached.record_count == records.len() {
                debug!("Caché vigente para {user_id} ({} registros).", cached.record_count);
                return Ok(cached);
            }
            info!(
                "Caché obsoleta para {user_id}: {} registros en caché, {} actuales.",
                cached.record_count,
                records.len()
            );
        }

        let snapshot = Arc::new(self.build(user_id, records).await?);
        self.entries.set(user_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Elimina la instantánea de `user_id`. La ingesta lo llama justo después
    /// de guardar un registro nuevo.
    pub fn invalidate(&self, user_id: &str) -> bool {
        let removed = self.entries.delete(user_id).is_some();
        if removed {
            debug!("Caché de índices invalidada para {user_id}.");
        }
        removed
    }

    /// Instantánea actual sin comprobar vigencia.
    pub fn cached(&self, user_id: &str) -> Option<Arc<UserIndexCache>> {
        self.entries.get(user_id)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_users: self.entries.len(),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        if !self.entries.is_empty() {
            info!("Vaciando la caché de índices ({} usuarios).", self.entries.len());
        }
        self.entries.clear();
    }

    async fn build(&self, user_id: &str, records: Vec<Record>) -> CoreResult<UserIndexCache> {
        if records.is_empty() {
            debug!("{user_id} no tiene registros; índice vacío.");
            return Ok(UserIndexCache::empty());
        }

        let texts: Vec<String> = records.iter().map(Record::embedding_text).collect();
        let vectors = match timeout(self.call_timeout, self.embedder.embed(&texts)).await {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => {
                warn!("Fallo de embeddings reconstruyendo el índice de {user_id}: {e}");
                return Err(CoreError::UpstreamUnavailable(format!("fallo de embeddings: {e}")));
            }
            Err(_) => {
                warn!("Timeout de embeddings reconstruyendo el índice de {user_id}.");
                return Err(CoreError::UpstreamUnavailable(
                    "timeout de embeddings".to_string(),
                ));
            }
        };

        if vectors.len() != records.len() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "se recibieron {} embeddings para {} registros",
                vectors.len(),
                records.len()
            )));
        }

        let index = FlatIndex::build(&vectors).map_err(CoreError::UpstreamUnavailable)?;
        self.check_dimension(index.dimension())?;

        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        info!("Índice de {user_id} reconstruido con {} registros.", records.len());

        Ok(UserIndexCache {
            index,
            record_count: records.len(),
            records,
            built_at: Utc::now(),
        })
    }

    /// La dimensión queda fijada con el primer índice construido. Un vector
    /// vacío nunca la fija.
    pub fn check_dimension(&self, dimension: usize) -> CoreResult<()> {
        if dimension == 0 {
            return Err(CoreError::UpstreamUnavailable(
                "el proveedor devolvió embeddings vacíos".to_string(),
            ));
        }
        let pinned = *self.dimension.get_or_init(|| dimension);
        if pinned != dimension {
            return Err(CoreError::UpstreamUnavailable(format!(
                "la dimensión de embeddings cambió de {pinned} a {dimension}"
            )));
        }
        Ok(())
    }
}
