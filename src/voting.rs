//! Topic voting.
//!
//! A vote rewrites the topic's ledger and cached score together while the
//! repository holds the write lock, so concurrent voters queue instead of
//! overwriting each other.

use crate::auth::CurrentUser;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Topic, VoteDirection};

/// Apply `user`'s vote to a topic and persist ledger and score in one write.
pub async fn cast_vote(
    repo: &Repository,
    topic_id: &str,
    user: &CurrentUser,
    direction: VoteDirection,
) -> Result<Topic, AppError> {
    let (saved, outcome) = repo
        .modify_topic(topic_id, |topic| topic.apply_vote(&user.id, direction))
        .await?;

    tracing::info!(
        topic_id,
        user_id = %user.id,
        direction = direction.as_str(),
        ?outcome,
        current = ?saved.vote_of(&user.id),
        votes = saved.votes,
        "Vote recorded"
    );
    Ok(saved)
}
