//! Topic API endpoints.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};

use super::extract::{Json, Query};
use super::{success, ApiResult, PageQuery, Paginated};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    normalize_tags, union_tags, CreateTopicRequest, NewTopic, Topic, UpdateTopicRequest,
    VoteDirection, VoteQuery, DEFAULT_USER_ADDED,
};
use crate::voting::cast_vote;
use crate::AppState;

const MAX_TOPIC_NAME_LEN: usize = 256;
const MAX_USER_ADDED_LEN: usize = 40;

/// GET /api/topics - List topics one page at a time.
pub async fn list_topics(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Paginated<Topic>> {
    let (page, limit, offset) = query.resolve();
    let results = state.repo.list_topics_page(limit, offset).await?;
    let total = state.repo.count_topics().await?;

    success(Paginated {
        results,
        total,
        page,
        limit,
    })
}

/// GET /api/topics/all - List all topics.
pub async fn list_all_topics(State(state): State<AppState>) -> ApiResult<Vec<Topic>> {
    success(state.repo.list_topics().await?)
}

/// GET /api/topics/top-rated - The topic with the highest score.
pub async fn top_rated_topic(State(state): State<AppState>) -> ApiResult<Option<Topic>> {
    success(state.repo.top_rated_topic().await?)
}

/// GET /api/topics/:id - Get a single topic.
pub async fn get_topic(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Topic> {
    match state.repo.get_topic(&id).await? {
        Some(topic) => success(topic),
        None => Err(AppError::NotFound(format!("Topic {} not found", id))),
    }
}

/// POST /api/topics - Create a new topic.
pub async fn create_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTopicRequest>,
) -> ApiResult<Topic> {
    let name = validate_topic_name(&request.name)?;
    let Some(tags) = request.tags.as_deref() else {
        return Err(AppError::Validation("Tags are required".to_string()));
    };
    if let Some(user_added) = &request.user_added {
        validate_user_added(user_added)?;
    }

    // Explicit author first, then the logged-in user
    let user_added = request
        .user_added
        .clone()
        .or_else(|| CurrentUser::from_headers(&headers).map(|u| u.id))
        .unwrap_or_else(|| DEFAULT_USER_ADDED.to_string());

    let new = NewTopic {
        name,
        tags: union_tags(&[], &normalize_tags(tags)),
        description: request.description.clone(),
        user_added,
    };

    match state.repo.insert_topic_if_absent(&new).await? {
        Some(topic) => {
            tracing::info!(topic_id = %topic.id, name = %topic.name, "Created topic");
            success(topic)
        }
        None => Err(AppError::Conflict(format!(
            "Topic \"{}\" already exists",
            new.name
        ))),
    }
}

/// PUT /api/topics/:id - Update a topic.
pub async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTopicRequest>,
) -> ApiResult<Topic> {
    let existing = state
        .repo
        .get_topic(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Topic {} not found", id)))?;

    if let Some(expected) = request.expected_version {
        if existing.version != expected {
            return Err(AppError::VersionMismatch {
                message: format!(
                    "Version mismatch: expected {}, current {}",
                    expected, existing.version
                ),
                current_version: existing.version,
            });
        }
    }

    let mut updated = existing;

    // Renames of referenced topics are refused by the write itself
    if let Some(name) = &request.name {
        updated.name = validate_topic_name(name)?;
    }
    if let Some(tags) = &request.tags {
        updated.tags = union_tags(&[], &normalize_tags(tags));
    }
    if let Some(description) = &request.description {
        updated.description = Some(description.clone());
    }
    if let Some(user_added) = &request.user_added {
        validate_user_added(user_added)?;
        updated.user_added = user_added.clone();
    }

    let topic = state.repo.replace_topic(&updated).await?;
    tracing::info!(topic_id = %topic.id, version = topic.version, "Updated topic");
    success(topic)
}

/// DELETE /api/topics/:id - Delete a topic no meeting references.
pub async fn delete_topic(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_topic(&id).await?;
    tracing::info!(topic_id = %id, "Deleted topic");
    success(())
}

/// PUT /api/topics/vote/:id?vote=up|down - Vote on a topic.
pub async fn vote_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    Query(query): Query<VoteQuery>,
) -> ApiResult<Topic> {
    let direction = query
        .vote
        .as_deref()
        .and_then(VoteDirection::parse)
        .ok_or_else(|| {
            AppError::Validation("Query parameter 'vote' must be \"up\" or \"down\"".to_string())
        })?;

    success(cast_vote(&state.repo, &id, &user, direction).await?)
}

fn validate_topic_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Topic name is required".to_string()));
    }
    if name.chars().count() > MAX_TOPIC_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Topic name must be at most {} characters",
            MAX_TOPIC_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_user_added(user_added: &str) -> Result<(), AppError> {
    if user_added.trim().is_empty() || user_added.chars().count() > MAX_USER_ADDED_LEN {
        return Err(AppError::Validation(format!(
            "userAdded must be 1 to {} characters",
            MAX_USER_ADDED_LEN
        )));
    }
    Ok(())
}
