// Route handlers for the REST surface

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::database::SourceType;
use crate::database::sqlite::{
    Document, DocumentQueries, DocumentUpdate, JournalEntry, JournalEntryUpdate, JournalQueries,
    Message, MessageQueries, NewDocument, NewJournalEntry, NewMessage, NewSpace, NewTask, Space,
    SpaceDetails, SpaceMember, SpaceQueries, Task, TaskQueries, TaskUpdate,
};
use crate::indexer::{EmbeddingQueue, QueueStats};
use crate::rag::content::IndexableSource;
use crate::rag::{ChatRequest, ChatResponse, ContextItem};

type Body<T> = Result<Json<T>, JsonRejection>;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateSpaceBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub problem_statement: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinSpaceBody {
    pub invite_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateMessageBody {
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateJournalBody {
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateDocumentBody {
    pub space_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateTaskBody {
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
}

/// A trimmed, non-empty value or a 400 naming the field
fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing {field}")))
}

/// Like `required`, for fields an update may leave out but must not blank
fn non_blank(value: Option<String>, field: &str) -> ApiResult<Option<String>> {
    value.map(|v| required(Some(v), field)).transpose()
}

async fn ensure_space(state: &AppState, space_id: &str) -> ApiResult<Space> {
    SpaceQueries::get_by_id(state.database.pool(), space_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load space", e))?
        .ok_or_else(|| ApiError::not_found("Space not found"))
}

/// Queue the embedding of a written row; the write itself has already succeeded
async fn queue_upsert(queue: &EmbeddingQueue, source: IndexableSource) {
    if let Err(e) = queue.enqueue_upsert(&source).await {
        warn!("Failed to queue embedding for {}: {:#}", source.source_key(), e);
    }
}

async fn queue_delete(
    queue: &EmbeddingQueue,
    source_type: SourceType,
    source_id: &str,
    space_id: &str,
) {
    if let Err(e) = queue.enqueue_delete(source_type, source_id, space_id).await {
        warn!(
            "Failed to queue embedding removal for {}: {:#}",
            source_type.source_key(source_id),
            e
        );
    }
}

#[inline]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[inline]
pub async fn create_space(
    State(state): State<AppState>,
    payload: Body<CreateSpaceBody>,
) -> ApiResult<Json<Space>> {
    let Json(body) = payload?;
    let new_space = NewSpace {
        name: required(body.name, "name")?,
        description: body.description,
        problem_statement: body.problem_statement,
        user_id: required(body.user_id, "userId")?,
    };

    let (space, _owner) = SpaceQueries::create(state.database.pool(), new_space)
        .await
        .map_err(|e| ApiError::internal("Failed to create space", e))?;
    Ok(Json(space))
}

#[derive(Debug, Serialize)]
pub struct JoinedSpace {
    pub space: Space,
    pub member: SpaceMember,
}

#[inline]
pub async fn join_space(
    State(state): State<AppState>,
    payload: Body<JoinSpaceBody>,
) -> ApiResult<Json<JoinedSpace>> {
    let Json(body) = payload?;
    let invite_token = required(body.invite_token, "inviteToken")?;
    let user_id = required(body.user_id, "userId")?;

    let (space, member) = SpaceQueries::join(state.database.pool(), &invite_token, &user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to join space", e))?
        .ok_or_else(|| ApiError::not_found("Space not found"))?;

    debug!("User {} joined space {}", user_id, space.id);
    Ok(Json(JoinedSpace { space, member }))
}

#[inline]
pub async fn get_space(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SpaceDetails>> {
    SpaceQueries::get_details(state.database.pool(), &id)
        .await
        .map_err(|e| ApiError::internal("Failed to load space", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Space not found"))
}

#[inline]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(space_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    MessageQueries::list_by_space(state.database.pool(), &space_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch messages", e))
}

#[inline]
pub async fn create_message(
    State(state): State<AppState>,
    payload: Body<CreateMessageBody>,
) -> ApiResult<Json<Message>> {
    let Json(body) = payload?;
    let new_message = NewMessage {
        space_id: required(body.space_id, "spaceId")?,
        user_id: required(body.user_id, "userId")?,
        content: required(body.content, "content")?,
    };
    ensure_space(&state, &new_message.space_id).await?;

    let message = MessageQueries::create(state.database.pool(), new_message)
        .await
        .map_err(|e| ApiError::internal("Failed to create message", e))?;
    queue_upsert(&state.queue, IndexableSource::from(&message)).await;

    Ok(Json(message))
}

#[inline]
pub async fn list_journal(
    State(state): State<AppState>,
    Path(space_id): Path<String>,
) -> ApiResult<Json<Vec<JournalEntry>>> {
    JournalQueries::list_by_space(state.database.pool(), &space_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch journal entries", e))
}

#[inline]
pub async fn create_journal_entry(
    State(state): State<AppState>,
    payload: Body<CreateJournalBody>,
) -> ApiResult<Json<JournalEntry>> {
    let Json(body) = payload?;
    let new_entry = NewJournalEntry {
        space_id: required(body.space_id, "spaceId")?,
        user_id: required(body.user_id, "userId")?,
        title: required(body.title, "title")?,
        content: required(body.content, "content")?,
    };
    ensure_space(&state, &new_entry.space_id).await?;

    let entry = JournalQueries::create(state.database.pool(), new_entry)
        .await
        .map_err(|e| ApiError::internal("Failed to create journal entry", e))?;
    queue_upsert(&state.queue, IndexableSource::from(&entry)).await;

    Ok(Json(entry))
}

#[inline]
pub async fn update_journal_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Body<JournalEntryUpdate>,
) -> ApiResult<Json<JournalEntry>> {
    let Json(mut update) = payload?;
    update.title = non_blank(update.title, "title")?;
    update.content = non_blank(update.content, "content")?;
    let entry = JournalQueries::update(state.database.pool(), &id, update)
        .await
        .map_err(|e| ApiError::internal("Failed to update journal entry", e))?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;
    queue_upsert(&state.queue, IndexableSource::from(&entry)).await;

    Ok(Json(entry))
}

#[inline]
pub async fn delete_journal_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let entry = JournalQueries::delete(state.database.pool(), &id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete journal entry", e))?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;
    queue_delete(&state.queue, SourceType::Journal, &entry.id, &entry.space_id).await;

    Ok(Json(json!({ "message": "Journal entry deleted successfully" })))
}

#[inline]
pub async fn list_documents(
    State(state): State<AppState>,
    Path(space_id): Path<String>,
) -> ApiResult<Json<Vec<Document>>> {
    DocumentQueries::list_by_space(state.database.pool(), &space_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch documents", e))
}

#[inline]
pub async fn create_document(
    State(state): State<AppState>,
    payload: Body<CreateDocumentBody>,
) -> ApiResult<Json<Document>> {
    let Json(body) = payload?;
    let new_document = NewDocument {
        space_id: required(body.space_id, "spaceId")?,
        title: required(body.title, "title")?,
        url: body.url,
        summary: body.summary,
    };
    ensure_space(&state, &new_document.space_id).await?;

    let document = DocumentQueries::create(state.database.pool(), new_document)
        .await
        .map_err(|e| ApiError::internal("Failed to create document", e))?;
    queue_upsert(&state.queue, IndexableSource::from(&document)).await;

    Ok(Json(document))
}

#[inline]
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Body<DocumentUpdate>,
) -> ApiResult<Json<Document>> {
    let Json(mut update) = payload?;
    update.title = non_blank(update.title, "title")?;
    let document = DocumentQueries::update(state.database.pool(), &id, update)
        .await
        .map_err(|e| ApiError::internal("Failed to update document", e))?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;
    queue_upsert(&state.queue, IndexableSource::from(&document)).await;

    Ok(Json(document))
}

#[inline]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let document = DocumentQueries::delete(state.database.pool(), &id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete document", e))?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;
    queue_delete(&state.queue, SourceType::Doc, &document.id, &document.space_id).await;

    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

#[inline]
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(space_id): Path<String>,
) -> ApiResult<Json<Vec<Task>>> {
    TaskQueries::list_by_space(state.database.pool(), &space_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch tasks", e))
}

#[inline]
pub async fn create_task(
    State(state): State<AppState>,
    payload: Body<CreateTaskBody>,
) -> ApiResult<Json<Task>> {
    let Json(body) = payload?;
    let new_task = NewTask {
        space_id: required(body.space_id, "spaceId")?,
        user_id: body.user_id,
        title: required(body.title, "title")?,
        category: body.category,
    };
    ensure_space(&state, &new_task.space_id).await?;

    let task = TaskQueries::create(state.database.pool(), new_task)
        .await
        .map_err(|e| ApiError::internal("Failed to create task", e))?;
    queue_upsert(&state.queue, IndexableSource::from(&task)).await;

    Ok(Json(task))
}

#[inline]
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Body<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    let Json(mut update) = payload?;
    update.title = non_blank(update.title, "title")?;
    let task = TaskQueries::update(state.database.pool(), &id, update)
        .await
        .map_err(|e| ApiError::internal("Failed to update task", e))?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    queue_upsert(&state.queue, IndexableSource::from(&task)).await;

    Ok(Json(task))
}

#[inline]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = TaskQueries::delete(state.database.pool(), &id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete task", e))?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    queue_delete(&state.queue, SourceType::Task, &task.id, &task.space_id).await;

    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

#[inline]
pub async fn chat(
    State(state): State<AppState>,
    payload: Body<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    let response = state.cofounder.answer(&request).await?;
    Ok(Json(response))
}

#[inline]
pub async fn search(
    State(state): State<AppState>,
    payload: Body<ChatRequest>,
) -> ApiResult<Json<Vec<ContextItem>>> {
    let Json(request) = payload?;
    let space_id = request.space_id.trim();
    let query = request.query.trim();
    if space_id.is_empty() || query.is_empty() {
        return Err(ApiError::bad_request("Missing spaceId or query"));
    }

    let limit = state.cofounder.resolve_limit(request.limit);
    let context = state
        .cofounder
        .pipeline()
        .search_context(query, space_id, limit)
        .await;
    Ok(Json(context))
}

#[inline]
pub async fn indexing_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    state
        .queue
        .stats()
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to load indexing statistics", e))
}
