//! Historial de conversaciones en memoria, acotado a los últimos turnos.
//!
//! Cada conversación se modifica sólo añadiendo turnos y siempre dentro de su
//! sección crítica, así que dos mensajes concurrentes de la misma
//! conversación nunca intercalan ni pierden turnos.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{require_non_empty, CoreError, CoreResult},
    kv_store::{KeyValueStore, KeyedStore},
    models::{Conversation, ConversationSummary, Turn},
};

/// Máximo de turnos que se conservan por conversación.
pub const MAX_TURNS: usize = 20;

/// Añade al final y descarta por delante hasta quedar en `MAX_TURNS`.
fn push_bounded(turns: &mut Vec<Turn>, turn: Turn) {
    turns.push(turn);
    if turns.len() > MAX_TURNS {
        let excess = turns.len() - MAX_TURNS;
        turns.drain(..excess);
    }
}

fn ensure_owner(conversation: &Conversation, owner: &str) -> CoreResult<()> {
    if conversation.owner != owner {
        return Err(CoreError::Validation(format!(
            "la conversación {} pertenece a otro usuario",
            conversation.id
        )));
    }
    Ok(())
}

#[derive(Default)]
pub struct ConversationStore {
    conversations: KeyedStore<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devuelve la conversación `conversation_id` o la crea vacía. Sin id se
    /// genera uno nuevo.
    pub async fn create_or_get(
        &self,
        conversation_id: Option<&str>,
        owner: &str,
    ) -> CoreResult<Conversation> {
        require_non_empty("user_id", owner)?;
        let id = resolve_id(conversation_id);

        let _gate = self.conversations.lock(&id).await;
        self.load_or_create(&id, owner)
    }

    /// Añade turnos al final de la conversación, creándola si hace falta, en
    /// una sola sección crítica. Cada turno pasa por el mismo recorte a
    /// `MAX_TURNS`. El orquestador guarda así la pareja usuario/asistente.
    pub async fn append_exchange(
        &self,
        conversation_id: &str,
        owner: &str,
        turns: Vec<Turn>,
    ) -> CoreResult<Conversation> {
        require_non_empty("conversation_id", conversation_id)?;
        require_non_empty("user_id", owner)?;

        let _gate = self.conversations.lock(conversation_id).await;
        let mut conversation = self.load_or_create(conversation_id, owner)?;
        for turn in turns {
            push_bounded(&mut conversation.turns, turn);
        }
        self.conversations.set(conversation_id, conversation.clone());
        debug!(
            "Conversación {conversation_id}: {} turnos tras añadir.",
            conversation.turns.len()
        );
        Ok(conversation)
    }

    pub fn get(&self, conversation_id: &str) -> CoreResult<Conversation> {
        self.conversations
            .get(conversation_id)
            .ok_or_else(|| CoreError::NotFound(format!("conversación {conversation_id}")))
    }

    /// Copia de los turnos; vacía si la conversación aún no existe.
    pub fn history(&self, conversation_id: &str) -> Vec<Turn> {
        self.conversations
            .get(conversation_id)
            .map(|c| c.turns)
            .unwrap_or_default()
    }

    pub async fn delete(&self, conversation_id: &str) -> CoreResult<()> {
        let _gate = self.conversations.lock(conversation_id).await;
        match self.conversations.delete(conversation_id) {
            Some(_) => {
                info!("Conversación {conversation_id} eliminada.");
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("conversación {conversation_id}"))),
        }
    }

    /// Resumen de las conversaciones de un usuario, de la más antigua a la
    /// más reciente.
    pub fn list_by_user(&self, user_id: &str) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .values()
            .into_iter()
            .filter(|c| c.owner == user_id)
            .map(|c| ConversationSummary {
                conversation_id: c.id,
                created_at: c.created_at,
                message_count: c.turns.len(),
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn clear(&self) {
        self.conversations.clear();
    }

    /// Debe llamarse con la sección crítica de `id` tomada.
    fn load_or_create(&self, id: &str, owner: &str) -> CoreResult<Conversation> {
        if let Some(existing) = self.conversations.get(id) {
            ensure_owner(&existing, owner)?;
            return Ok(existing);
        }
        let conversation = Conversation {
            id: id.to_string(),
            owner: owner.to_string(),
            turns: Vec::new(),
            created_at: Utc::now(),
        };
        self.conversations.set(id, conversation.clone());
        debug!("Conversación {id} creada para {owner}.");
        Ok(conversation)
    }
}

/// Id suministrado por el cliente, o uno nuevo si no hay (o está en blanco).
pub fn resolve_id(conversation_id: Option<&str>) -> String {
    match conversation_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}
