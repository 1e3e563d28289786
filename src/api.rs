use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    app_state::{AppState, Status},
    error::{require_non_empty, CoreError},
    index_cache::CacheStats,
    ingest::{self, NewRecord},
    language::{detect_language, Language},
    models::{ChatRequest, ChatResponse, Conversation, ConversationSummary, Record},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(e: CoreError) -> ApiError {
    e.into_response_parts()
}

// --- Payloads y Respuestas de la API ---

#[derive(Serialize)]
pub struct UserConversations {
    user_id: String,
    conversations: Vec<ConversationSummary>,
}

#[derive(Serialize)]
pub struct LanguageInfo {
    code: Language,
    name: &'static str,
}

#[derive(Serialize)]
pub struct LanguagesResponse {
    languages: Vec<LanguageInfo>,
    default_language: Language,
}

#[derive(Deserialize)]
pub struct TranslatePayload {
    text: String,
    target_language: String,
    /// Código de origen; ausente o `auto` significa detectar.
    #[serde(default)]
    source_language: Option<String>,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    original_text: String,
    translated_text: String,
    source_language: Language,
    target_language: Language,
    degraded: bool,
}

#[derive(Deserialize)]
pub struct OpenConversationPayload {
    user_id: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
pub struct CacheSnapshotInfo {
    user_id: String,
    record_count: usize,
    indexed_vectors: usize,
    dimension: usize,
    built_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    user_id: String,
    invalidated: bool,
    stats: CacheStats,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/conversations", post(open_conversation_handler))
        .route("/api/conversations/user/:user_id", get(list_conversations_handler))
        .route(
            "/api/conversations/:id",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route("/api/records", post(ingest_record_handler))
        .route(
            "/api/cache/:user_id",
            get(cache_snapshot_handler).delete(invalidate_cache_handler),
        )
        .route("/api/languages", get(languages_handler))
        .route("/api/thinking-text/:lang", get(thinking_text_handler))
        .route("/api/follow-up-chips/:lang", get(follow_up_chips_handler))
        .route("/api/translate", post(translate_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers de chat y conversaciones ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    state.chat.handle(payload).await.map(Json).map_err(api_error)
}

/// Abre (o recupera) una sesión antes del primer mensaje.
#[axum::debug_handler]
async fn open_conversation_handler(
    State(state): State<AppState>,
    Json(payload): Json<OpenConversationPayload>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .conversations
        .create_or_get(payload.conversation_id.as_deref(), payload.user_id.trim())
        .await
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn list_conversations_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserConversations> {
    let conversations = state.conversations.list_by_user(&user_id);
    Json(UserConversations {
        user_id,
        conversations,
    })
}

#[axum::debug_handler]
async fn get_conversation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    state.conversations.get(&id).map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn delete_conversation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.conversations.delete(&id).await.map_err(api_error)?;
    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Conversación eliminada." })),
    ))
}

// --- Ingesta y caché ---

#[axum::debug_handler]
async fn ingest_record_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let record = ingest::ingest_record(&state.records, &state.cache, payload).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[axum::debug_handler]
async fn cache_snapshot_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CacheSnapshotInfo>, ApiError> {
    let snapshot = state.cache.cached(&user_id).ok_or_else(|| {
        api_error(CoreError::NotFound(format!("índice en caché de {user_id}")))
    })?;
    Ok(Json(CacheSnapshotInfo {
        record_count: snapshot.record_count,
        indexed_vectors: snapshot.index.len(),
        dimension: snapshot.index.dimension(),
        built_at: snapshot.built_at,
        user_id,
    }))
}

#[axum::debug_handler]
async fn invalidate_cache_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<InvalidateResponse> {
    let invalidated = state.cache.invalidate(&user_id);
    Json(InvalidateResponse {
        user_id,
        invalidated,
        stats: state.cache.stats(),
    })
}

// --- Idiomas ---

#[axum::debug_handler]
async fn languages_handler() -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: Language::ALL
            .into_iter()
            .map(|code| LanguageInfo {
                code,
                name: code.display_name(),
            })
            .collect(),
        default_language: Language::PIVOT,
    })
}

#[axum::debug_handler]
async fn thinking_text_handler(Path(lang): Path<String>) -> Json<serde_json::Value> {
    let language = Language::resolve(Some(&lang));
    Json(json!({
        "thinking_text": language.thinking_text(),
        "language": language,
    }))
}

#[axum::debug_handler]
async fn follow_up_chips_handler(Path(lang): Path<String>) -> Json<serde_json::Value> {
    let language = Language::resolve(Some(&lang));
    Json(json!({
        "chips": language.follow_up_chips(),
        "language": language,
    }))
}

#[axum::debug_handler]
async fn translate_handler(
    State(state): State<AppState>,
    Json(payload): Json<TranslatePayload>,
) -> Result<Json<TranslateResponse>, ApiError> {
    require_non_empty("text", &payload.text).map_err(api_error)?;
    let target = Language::from_code(&payload.target_language).ok_or_else(|| {
        api_error(CoreError::Validation(format!(
            "idioma no soportado: {}",
            payload.target_language
        )))
    })?;

    let source = match payload.source_language.as_deref() {
        None | Some("auto") => detect_language(&payload.text),
        Some(code) => Language::resolve(Some(code)),
    };

    let outcome = if target.is_pivot() {
        state.language.translate_to_pivot(&payload.text, source).await
    } else {
        state.language.translate(&payload.text, target, source).await
    };

    Ok(Json(TranslateResponse {
        original_text: payload.text,
        translated_text: outcome.text,
        source_language: source,
        target_language: target,
        degraded: outcome.degraded,
    }))
}

// --- Estado y apagado ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status())
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::{ChatOrchestrator, ChatSettings},
        config::AppConfig,
        conversation::ConversationStore,
        index_cache::IndexCacheManager,
        ingest::InMemoryRecordStore,
        language::LanguagePipeline,
        test_support::{cache_manager, GeneratorMode, MockEmbedder, MockGenerator, MockTranslator},
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(mode: GeneratorMode) -> AppState {
        let config = AppConfig::from_lookup(|_: &str| None).unwrap();
        let records = Arc::new(InMemoryRecordStore::new());
        let (cache, _) = cache_manager(records.clone(), MockEmbedder::new());
        let cache: Arc<IndexCacheManager> = Arc::new(cache);
        let conversations = Arc::new(ConversationStore::new());
        let language = LanguagePipeline::new(
            Arc::new(MockTranslator::working()),
            Duration::from_millis(200),
        );
        let chat = Arc::new(ChatOrchestrator::new(
            cache.clone(),
            Arc::new(MockGenerator::new(mode)),
            language.clone(),
            conversations.clone(),
            ChatSettings {
                generation_timeout: Duration::from_millis(200),
                ..ChatSettings::from_config(&config)
            },
        ));
        AppState {
            config,
            chat,
            records,
            cache,
            conversations,
            language,
            shutdown_sender: Arc::new(Mutex::new(None)),
        }
    }

    async fn call(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = create_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn chat_then_list_get_and_delete() {
        let state = state_with(GeneratorMode::Canned);
        let (status, record) = call(
            &state,
            Method::POST,
            "/api/records",
            Some(json!({"user_id": "u1", "vendor": "Cafe Uno", "raw_text": "coffee"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["owner"], "u1");

        let (status, chat) = call(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({"user_id": "u1", "message": "coffee?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chat["total_receipts"], 1);
        assert_eq!(chat["detected_language"], "en");
        let id = chat["conversation_id"].as_str().unwrap().to_string();

        let (_, listed) = call(&state, Method::GET, "/api/conversations/user/u1", None).await;
        assert_eq!(listed["conversations"][0]["message_count"], 2);

        let uri = format!("/api/conversations/{id}");
        let (status, conv) = call(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(conv["turns"].as_array().unwrap().len(), 2);

        let (status, _) = call(&state, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&id));
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let state = state_with(GeneratorMode::Canned);
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({"user_id": "u1", "message": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn generation_outage_is_bad_gateway() {
        let state = state_with(GeneratorMode::Fail);
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({"user_id": "u1", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(state.conversations.len(), 0);
    }

    #[tokio::test]
    async fn deleting_unknown_conversation_is_not_found() {
        let state = state_with(GeneratorMode::Canned);
        let (status, _) = call(&state, Method::DELETE, "/api/conversations/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn language_endpoints_fall_back_to_english() {
        let state = state_with(GeneratorMode::Canned);
        let (_, langs) = call(&state, Method::GET, "/api/languages", None).await;
        assert_eq!(langs["languages"].as_array().unwrap().len(), 6);
        assert_eq!(langs["default_language"], "en");

        let (_, thinking) = call(&state, Method::GET, "/api/thinking-text/fr", None).await;
        assert_eq!(thinking["language"], "en");
        assert_eq!(thinking["thinking_text"], "Thinking...");

        let (_, chips) = call(&state, Method::GET, "/api/follow-up-chips/ta", None).await;
        assert_eq!(chips["chips"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn translate_detects_source_when_auto() {
        let state = state_with(GeneratorMode::Canned);
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/translate",
            Some(json!({"text": "नमस्ते", "target_language": "en", "source_language": "auto"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source_language"], "hi");
        assert_eq!(body["translated_text"], "[hi->en] नमस्ते");

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/translate",
            Some(json!({"text": "hello", "target_language": "xx"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cache_invalidation_and_status() {
        let state = state_with(GeneratorMode::Canned);
        call(
            &state,
            Method::POST,
            "/api/records",
            Some(json!({"user_id": "u1", "vendor": "Cafe Uno", "raw_text": "coffee"})),
        )
        .await;
        call(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({"user_id": "u1", "message": "coffee?"})),
        )
        .await;

        let (_, status) = call(&state, Method::GET, "/api/status", None).await;
        assert_eq!(status["cached_users"], 1);
        assert_eq!(status["conversations"], 1);

        let (status, info) = call(&state, Method::GET, "/api/cache/u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["record_count"], 1);
        assert_eq!(info["indexed_vectors"], 1);
        assert!(info["built_at"].is_string());

        let (_, body) = call(&state, Method::DELETE, "/api/cache/u1", None).await;
        assert_eq!(body["invalidated"], true);
        assert_eq!(body["stats"]["cached_users"], 0);

        let (status, _) = call(&state, Method::GET, "/api/cache/u1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn opened_conversation_is_reused_by_chat() {
        let state = state_with(GeneratorMode::Canned);
        let (status, opened) = call(
            &state,
            Method::POST,
            "/api/conversations",
            Some(json!({"user_id": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["turns"].as_array().unwrap().len(), 0);
        let id = opened["id"].as_str().unwrap().to_string();

        let (_, chat) = call(
            &state,
            Method::POST,
            "/api/chat",
            Some(json!({"user_id": "u1", "message": "hello", "conversation_id": id})),
        )
        .await;
        assert_eq!(chat["conversation_id"], id.as_str());

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/conversations",
            Some(json!({"user_id": "u2", "conversation_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/conversations",
            Some(json!({"user_id": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
