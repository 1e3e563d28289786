//! Fuente de registros y punto de enganche de la ingesta.
//!
//! La extracción de campos a partir de imágenes/PDF vive fuera de este
//! servicio; aquí sólo llegan recibos ya estructurados. Tras guardar uno se
//! invalida la caché de índices de su dueño.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{require_non_empty, CoreResult},
    index_cache::IndexCacheManager,
    models::Record,
};

/// Contrato de lectura que consume la caché de índices: siempre un barrido
/// completo, en orden estable.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn list_records(&self, user_id: &str) -> Result<Vec<Record>>;
}

/// Almacén de registros en memoria, por usuario y en orden de inserción.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    by_owner: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, record: Record) {
        self.by_owner
            .write()
            .entry(record.owner.clone())
            .or_default()
            .push(record);
    }

    pub fn count(&self, user_id: &str) -> usize {
        self.by_owner.read().get(user_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<Record>> {
        Ok(self.by_owner.read().get(user_id).cloned().unwrap_or_default())
    }
}

/// Recibo recién estructurado que entrega el colaborador de ingesta.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub user_id: String,
    #[serde(default)]
    pub receipt_id: Option<String>,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub extra_fields: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Guarda el recibo y fuerza la reconstrucción del índice de su dueño.
pub fn ingest_record(
    store: &InMemoryRecordStore,
    cache: &IndexCacheManager,
    new_record: NewRecord,
) -> CoreResult<Record> {
    require_non_empty("user_id", &new_record.user_id)?;

    let record = Record {
        id: new_record
            .receipt_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        owner: new_record.user_id,
        vendor: new_record.vendor,
        categories: new_record.categories,
        raw_text: new_record.raw_text,
        extra_fields: new_record.extra_fields,
        timestamp: new_record.timestamp.unwrap_or_else(Utc::now),
    };

    store.add_record(record.clone());
    cache.invalidate(&record.owner);

    info!(
        "Recibo {} ingerido para el usuario {} ({} en total).",
        record.id,
        record.owner,
        store.count(&record.owner)
    );
    Ok(record)
}
