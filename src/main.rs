// Módulos de la aplicación
mod api;
mod app_state;
mod chat;
mod config;
mod conversation;
mod error;
mod index_cache;
mod ingest;
mod kv_store;
mod language;
mod llm;
mod models;
mod rag;
mod translation;
mod vector_store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::AppState,
    chat::{ChatOrchestrator, ChatSettings},
    conversation::ConversationStore,
    index_cache::IndexCacheManager,
    ingest::InMemoryRecordStore,
    language::LanguagePipeline,
    translation::MyMemoryTranslator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Proveedores externos: LLM (embeddings + generación) y traducción
    let llm_manager =
        Arc::new(llm::LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);
    let translator = Arc::new(MyMemoryTranslator::new(cfg.translation_api_url.clone()));
    let language = LanguagePipeline::new(translator, cfg.translation_timeout);

    // 4. Almacenes de proceso y orquestador
    let records = Arc::new(InMemoryRecordStore::new());
    let cache = Arc::new(IndexCacheManager::new(
        records.clone(),
        llm_manager.clone(),
        cfg.embedding_timeout,
    ));
    let conversations = Arc::new(ConversationStore::new());
    let chat = Arc::new(ChatOrchestrator::new(
        cache.clone(),
        llm_manager,
        language.clone(),
        conversations.clone(),
        ChatSettings::from_config(&cfg),
    ));

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        chat,
        records,
        cache,
        conversations,
        language,
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    app_state.teardown();
    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
