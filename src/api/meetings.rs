//! Meeting API endpoints.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use super::extract::{Json, Query};
use super::{success, ApiResult, PageQuery, Paginated};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{normalize_tags, Meeting, MeetingDraft, MeetingRequest};
use crate::reconcile::reconcile_topic;
use crate::AppState;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Query parameters of the schedule endpoint.
#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    /// How many days back the schedule reaches (default: 7).
    #[serde(default)]
    pub days: Option<i64>,
}

/// Query parameters of the last-meetings endpoint.
#[derive(Debug, Deserialize)]
pub struct LastQuery {
    /// Number of meetings (default: 3).
    #[serde(default)]
    pub amount: Option<i64>,
}

/// GET /api/meetings - List meetings one page at a time.
pub async fn list_meetings(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Paginated<Meeting>> {
    let (page, limit, offset) = query.resolve();
    let results = state.repo.list_meetings_page(limit, offset).await?;
    let total = state.repo.count_meetings().await?;

    success(Paginated {
        results,
        total,
        page,
        limit,
    })
}

/// GET /api/meetings/all - List all meetings.
pub async fn list_all_meetings(State(state): State<AppState>) -> ApiResult<Vec<Meeting>> {
    success(state.repo.list_meetings().await?)
}

/// GET /api/meetings/sorted - All meetings, earliest first.
pub async fn list_sorted_meetings(State(state): State<AppState>) -> ApiResult<Vec<Meeting>> {
    success(state.repo.list_meetings_sorted().await?)
}

/// GET /api/meetings/archive - Past meetings, newest first.
pub async fn meetings_archive(State(state): State<AppState>) -> ApiResult<Vec<Meeting>> {
    success(state.repo.meetings_until(now_millis()).await?)
}

/// GET /api/meetings/schedule - Upcoming meetings plus the last few days.
pub async fn meetings_schedule(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Vec<Meeting>> {
    let days = query.days.filter(|d| *d > 0).unwrap_or(7);
    let since = now_millis().saturating_sub(days.saturating_mul(MS_PER_DAY));
    success(state.repo.meetings_since(since).await?)
}

/// GET /api/meetings/incoming - The next meeting, if any.
pub async fn incoming_meeting(State(state): State<AppState>) -> ApiResult<Option<Meeting>> {
    success(state.repo.next_meeting(now_millis()).await?)
}

/// GET /api/meetings/last-one - The most recent past meeting, if any.
pub async fn last_meeting(State(state): State<AppState>) -> ApiResult<Option<Meeting>> {
    let mut last = state.repo.last_meetings(now_millis(), 1).await?;
    success(last.pop())
}

/// GET /api/meetings/last - The last `amount` past meetings.
pub async fn last_meetings(
    State(state): State<AppState>,
    Query(query): Query<LastQuery>,
) -> ApiResult<Vec<Meeting>> {
    let amount = query.amount.filter(|a| *a > 0).unwrap_or(3).min(100);
    success(state.repo.last_meetings(now_millis(), amount).await?)
}

/// GET /api/meetings/:id - Get a single meeting.
pub async fn get_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Meeting> {
    match state.repo.get_meeting(&id).await? {
        Some(meeting) => success(meeting),
        None => Err(AppError::NotFound(format!("Meeting {} not found", id))),
    }
}

/// POST /api/meetings - Create a meeting, creating or merging its topic.
pub async fn create_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MeetingRequest>,
) -> ApiResult<Meeting> {
    tracing::debug!(topic = %request.topic, leader = %request.leader, "New meeting request");
    let draft = validate_meeting(request)?;
    let draft = reconcile_draft(&state, &headers, draft).await?;

    let meeting = state.repo.insert_meeting(&draft).await?;
    tracing::info!(meeting_id = %meeting.id, topic = %meeting.topic, "Created meeting");
    success(meeting)
}

/// PUT /api/meetings/:id - Replace a meeting, re-reconciling its topic.
pub async fn update_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MeetingRequest>,
) -> ApiResult<Meeting> {
    let draft = validate_meeting(request)?;

    if state.repo.get_meeting(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Meeting {} not found", id)));
    }

    let draft = reconcile_draft(&state, &headers, draft).await?;
    success(state.repo.replace_meeting(&id, &draft).await?)
}

/// DELETE /api/meetings/:id - Delete a meeting.
pub async fn delete_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.repo.delete_meeting(&id).await?;
    tracing::info!(meeting_id = %id, "Deleted meeting");
    success(())
}

/// Reconcile the draft's topic and carry the merged tags onto the draft.
async fn reconcile_draft(
    state: &AppState,
    headers: &HeaderMap,
    draft: MeetingDraft,
) -> Result<MeetingDraft, AppError> {
    // New topics are credited to the logged-in user, else to the leader
    let author = CurrentUser::from_headers(headers)
        .map(|u| u.id)
        .unwrap_or_else(|| draft.leader.clone());

    let reconciliation = reconcile_topic(
        &state.repo,
        &draft.topic,
        &draft.tags,
        draft.description.as_deref(),
        &author,
    )
    .await?;

    if reconciliation.created {
        tracing::info!(topic_id = %reconciliation.topic.id, author = %author, "Meeting introduced a new topic");
    }

    Ok(MeetingDraft {
        tags: reconciliation.tags,
        ..draft
    })
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Check a meeting request and turn it into a draft.
fn validate_meeting(request: MeetingRequest) -> Result<MeetingDraft, AppError> {
    let date = match request.date {
        Some(date) if date > 0 => date,
        _ => {
            return Err(AppError::Validation(
                "date must be a positive millisecond timestamp".to_string(),
            ))
        }
    };

    let topic = request.topic.trim().to_string();
    if topic.is_empty() || topic.chars().count() > 256 {
        return Err(AppError::Validation(
            "topic must be 1 to 256 characters".to_string(),
        ));
    }

    let leader = request.leader.trim().to_string();
    let leader_len = leader.chars().count();
    if !(3..=128).contains(&leader_len) {
        return Err(AppError::Validation(
            "leader must be 3 to 128 characters".to_string(),
        ));
    }

    if let Some(duration) = &request.duration {
        if !(3..=8).contains(&duration.chars().count()) {
            return Err(AppError::Validation(
                "duration must be 3 to 8 characters".to_string(),
            ));
        }
    }

    if let Some(url) = &request.resources_url {
        if !is_link(url) {
            return Err(AppError::Validation(
                "resourcesURL must be an http(s) link".to_string(),
            ));
        }
    }

    if let Some(description) = &request.description {
        if description.chars().count() > 1024 {
            return Err(AppError::Validation(
                "description must be at most 1024 characters".to_string(),
            ));
        }
    }

    let Some(tags) = request.tags else {
        return Err(AppError::Validation("tags are required".to_string()));
    };

    Ok(MeetingDraft {
        date,
        topic,
        leader,
        duration: request.duration,
        description: request.description,
        tags: normalize_tags(&tags),
        useful_links: request.useful_links,
        resources_url: request.resources_url,
        meeting_href: request.meeting_href,
    })
}

/// An absolute http(s) URL with a host.
fn is_link(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MeetingRequest {
        MeetingRequest {
            date: Some(1_700_000_000_000),
            topic: "Rust".to_string(),
            leader: "alice".to_string(),
            duration: Some("1h30m".to_string()),
            description: None,
            tags: Some(vec![" systems ".to_string(), "".to_string()]),
            useful_links: vec![],
            resources_url: Some("https://example.com".to_string()),
            meeting_href: None,
        }
    }

    #[test]
    fn test_valid_meeting() {
        let draft = validate_meeting(request()).unwrap();
        assert_eq!(draft.tags, vec!["systems".to_string()]);
        assert_eq!(draft.leader, "alice");
    }

    #[test]
    fn test_meeting_validation_failures() {
        let cases: [fn(&mut MeetingRequest); 8] = [
            |r: &mut MeetingRequest| r.date = None,
            |r: &mut MeetingRequest| r.date = Some(0),
            |r: &mut MeetingRequest| r.topic = " ".to_string(),
            |r: &mut MeetingRequest| r.leader = "al".to_string(),
            |r: &mut MeetingRequest| r.duration = Some("1h".to_string()),
            |r: &mut MeetingRequest| r.resources_url = Some("ftp://example.com".to_string()),
            |r: &mut MeetingRequest| r.description = Some("x".repeat(1025)),
            |r: &mut MeetingRequest| r.tags = None,
        ];

        for mutate in cases {
            let mut req = request();
            mutate(&mut req);
            assert!(matches!(
                validate_meeting(req),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_is_link() {
        assert!(is_link("http://example.com/a"));
        assert!(is_link("https://example.com"));
        assert!(!is_link("https://"));
        assert!(!is_link("example.com"));
        assert!(!is_link("https://exa mple.com"));
        assert!(!is_link("https://::::"));
        assert!(!is_link("ftp://example.com"));
        assert!(!is_link("mailto:someone@example.com"));
    }
}
