//! Topic reconciliation for meeting writes.
//!
//! A meeting names its topic; before the meeting is stored the topic is
//! looked up by that name and created when missing. For an existing topic
//! the meeting's tags are merged into the topic's tag set.

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{union_tags, NewTopic, Topic};

/// Lookups retried when the named topic is created, renamed or removed
/// between finding it and writing it.
const MAX_LOOKUP_ATTEMPTS: u32 = 5;

/// Result of reconciling a meeting with its topic.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// A new topic document was written by this call.
    pub created: bool,
    pub topic: Topic,
    /// Merged tag set the caller stores on the meeting.
    pub tags: Vec<String>,
}

/// Find or create the topic called `topic_name` and merge `incoming_tags` into it.
///
/// The unique topic name guarantees one document per name: when a concurrent
/// request creates the same topic first, this call re-reads it and merges
/// instead. A topic created here stays in place even if the caller's meeting
/// write fails afterwards; a retry finds it by name.
pub async fn reconcile_topic(
    repo: &Repository,
    topic_name: &str,
    incoming_tags: &[String],
    description: Option<&str>,
    user_name: &str,
) -> Result<Reconciliation, AppError> {
    if topic_name.trim().is_empty() {
        return Err(AppError::Validation("Topic name is required".to_string()));
    }

    for attempt in 1..=MAX_LOOKUP_ATTEMPTS {
        let Some(existing) = repo.find_topic_by_name(topic_name).await? else {
            let tags = union_tags(&[], incoming_tags);
            let new = NewTopic {
                name: topic_name.to_string(),
                tags: tags.clone(),
                description: description.map(str::to_string),
                user_added: user_name.to_string(),
            };

            match repo.insert_topic_if_absent(&new).await? {
                Some(topic) => {
                    tracing::info!(topic_id = %topic.id, name = %topic.name, "Created topic for meeting");
                    return Ok(Reconciliation {
                        created: true,
                        topic,
                        tags,
                    });
                }
                None => {
                    tracing::debug!(name = topic_name, attempt, "Topic created concurrently, re-reading");
                    continue;
                }
            }
        };

        let merged = repo
            .modify_topic(&existing.id, |topic| {
                if topic.name != topic_name {
                    return false;
                }
                topic.tags = union_tags(&topic.tags, incoming_tags);
                true
            })
            .await;

        match merged {
            Ok((topic, true)) => {
                if topic.version != existing.version {
                    tracing::debug!(topic_id = %topic.id, tags = ?topic.tags, "Merged meeting tags into topic");
                }
                return Ok(Reconciliation {
                    created: false,
                    tags: topic.tags.clone(),
                    topic,
                });
            }
            Ok((_, false)) | Err(AppError::NotFound(_)) => {
                tracing::debug!(name = topic_name, attempt, "Topic changed during tag merge, re-reading");
            }
            Err(err) => return Err(err),
        }
    }

    tracing::warn!(name = topic_name, "Giving up on topic reconciliation after {} attempts", MAX_LOOKUP_ATTEMPTS);
    Err(AppError::Conflict(format!(
        "Topic \"{}\" kept changing during reconciliation",
        topic_name
    )))
}
