//! Database repository for topic and meeting documents.
//!
//! Topic writes either hold the database write lock for the whole
//! read-modify-write (`modify_topic`) or are conditional on the stored
//! `version` (`replace_topic`).

use chrono::Utc;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{Meeting, MeetingDraft, NewTopic, Topic};

const TOPIC_SELECT: &str = "SELECT id, name, tags, description, votes, user_added, votes_ledger, added_date, version FROM topics";

const MEETING_SELECT: &str = "SELECT id, date, topic, leader, duration, description, tags, useful_links, resources_url, meeting_href, created_at, updated_at FROM meetings";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== TOPIC OPERATIONS ====================

    /// List all topics.
    pub async fn list_topics(&self) -> Result<Vec<Topic>, AppError> {
        let sql = format!("{} ORDER BY name", TOPIC_SELECT);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(topic_from_row).collect()
    }

    /// List one page of topics, ordered by name.
    pub async fn list_topics_page(&self, limit: i64, offset: i64) -> Result<Vec<Topic>, AppError> {
        let sql = format!("{} ORDER BY name LIMIT ? OFFSET ?", TOPIC_SELECT);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(topic_from_row).collect()
    }

    /// Count all topics.
    pub async fn count_topics(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM topics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Get a topic by ID.
    pub async fn get_topic(&self, id: &str) -> Result<Option<Topic>, AppError> {
        let sql = format!("{} WHERE id = ?", TOPIC_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(topic_from_row).transpose()
    }

    /// Find a topic by its exact name.
    pub async fn find_topic_by_name(&self, name: &str) -> Result<Option<Topic>, AppError> {
        let sql = format!("{} WHERE name = ?", TOPIC_SELECT);
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(topic_from_row).transpose()
    }

    /// The topic with the highest score, oldest first on ties.
    pub async fn top_rated_topic(&self) -> Result<Option<Topic>, AppError> {
        let sql = format!("{} ORDER BY votes DESC, added_date ASC LIMIT 1", TOPIC_SELECT);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(topic_from_row).transpose()
    }

    /// Insert a topic unless one with the same name exists.
    ///
    /// Returns `None` when the name is already taken; the caller decides
    /// whether that is a conflict or a reason to re-read.
    pub async fn insert_topic_if_absent(&self, new: &NewTopic) -> Result<Option<Topic>, AppError> {
        let topic = Topic {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name.clone(),
            tags: new.tags.clone(),
            description: new.description.clone(),
            votes: 0,
            user_added: new.user_added.clone(),
            votes_ledger: Vec::new(),
            added_date: Utc::now().to_rfc3339(),
            version: 1,
        };

        let result = sqlx::query(
            "INSERT INTO topics (id, name, tags, description, votes, user_added, votes_ledger, added_date, version) VALUES (?, ?, ?, ?, 0, ?, '[]', ?, 1) ON CONFLICT(name) DO NOTHING"
        )
        .bind(&topic.id)
        .bind(&topic.name)
        .bind(serde_json::to_string(&topic.tags)?)
        .bind(&topic.description)
        .bind(&topic.user_added)
        .bind(&topic.added_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(topic))
    }

    /// Read, change and write a topic's tags and votes under the database write lock.
    ///
    /// Concurrent callers queue on the lock instead of failing, so each one
    /// sees every change committed before it. Nothing is written when `change`
    /// leaves the topic as it was.
    pub async fn modify_topic<T, F>(&self, id: &str, change: F) -> Result<(Topic, T), AppError>
    where
        F: FnOnce(&mut Topic) -> T,
    {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the lock before the read below opens a snapshot
        let claimed = sqlx::query("UPDATE topics SET version = version WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Topic {} not found", id)));
        }

        let sql = format!("{} WHERE id = ?", TOPIC_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_one(&mut *tx).await?;
        let before = topic_from_row(&row)?;

        let mut topic = before.clone();
        let output = change(&mut topic);
        if topic == before {
            tx.commit().await?;
            return Ok((topic, output));
        }

        topic.version = before.version + 1;
        sqlx::query("UPDATE topics SET tags = ?, votes = ?, votes_ledger = ?, version = ? WHERE id = ?")
            .bind(serde_json::to_string(&topic.tags)?)
            .bind(topic.votes)
            .bind(serde_json::to_string(&topic.votes_ledger)?)
            .bind(topic.version)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((topic, output))
    }

    /// Replace a topic document if its stored version still equals `topic.version`.
    ///
    /// A rename only goes through while no meeting references the stored
    /// name; the check is part of the same statement as the write.
    pub async fn replace_topic(&self, topic: &Topic) -> Result<Topic, AppError> {
        let new_version = topic.version + 1;

        let result = sqlx::query(
            "UPDATE topics SET name = ?, tags = ?, description = ?, votes = ?, user_added = ?, votes_ledger = ?, version = ? \
             WHERE id = ? AND version = ? \
             AND (name = ? OR NOT EXISTS (SELECT 1 FROM meetings WHERE meetings.topic = topics.name))"
        )
        .bind(&topic.name)
        .bind(serde_json::to_string(&topic.tags)?)
        .bind(&topic.description)
        .bind(topic.votes)
        .bind(&topic.user_added)
        .bind(serde_json::to_string(&topic.votes_ledger)?)
        .bind(new_version)
        .bind(&topic.id)
        .bind(topic.version)
        .bind(&topic.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(Topic {
                version: new_version,
                ..topic.clone()
            });
        }

        match self.get_topic(&topic.id).await? {
            None => Err(AppError::NotFound(format!("Topic {} not found", topic.id))),
            Some(current) if current.version != topic.version => Err(AppError::VersionMismatch {
                message: format!(
                    "Version mismatch: expected {}, current {}",
                    topic.version, current.version
                ),
                current_version: current.version,
            }),
            Some(current) => Err(AppError::Conflict(format!(
                "Cannot rename topic \"{}\" while meetings reference it",
                current.name
            ))),
        }
    }

    /// Delete a topic unless a meeting still references it by name.
    ///
    /// The reference check and the delete run as one statement.
    pub async fn delete_topic(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "DELETE FROM topics WHERE id = ? AND NOT EXISTS (SELECT 1 FROM meetings WHERE meetings.topic = topics.name)"
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.get_topic(id).await? {
            None => Err(AppError::NotFound(format!("Topic {} not found", id))),
            Some(topic) => Err(AppError::Conflict(format!(
                "Cannot remove topic \"{}\" while at least one meeting references it",
                topic.name
            ))),
        }
    }

    // ==================== MEETING OPERATIONS ====================

    /// List all meetings in insertion order.
    pub async fn list_meetings(&self) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("ORDER BY seq", &[]).await
    }

    /// List all meetings by date, earliest first.
    pub async fn list_meetings_sorted(&self) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("ORDER BY date ASC, seq ASC", &[]).await
    }

    /// List one page of meetings, ordered by date.
    pub async fn list_meetings_page(&self, limit: i64, offset: i64) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("ORDER BY date ASC, seq ASC LIMIT ? OFFSET ?", &[limit, offset])
            .await
    }

    /// Count all meetings.
    pub async fn count_meetings(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM meetings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Meetings that started at or before `now`, newest first.
    pub async fn meetings_until(&self, now: i64) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("WHERE date <= ? ORDER BY date DESC", &[now])
            .await
    }

    /// Meetings at or after `since`, earliest first.
    pub async fn meetings_since(&self, since: i64) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("WHERE date >= ? ORDER BY date ASC", &[since])
            .await
    }

    /// The `amount` most recent meetings at or before `now`.
    pub async fn last_meetings(&self, now: i64, amount: i64) -> Result<Vec<Meeting>, AppError> {
        self.query_meetings("WHERE date <= ? ORDER BY date DESC LIMIT ?", &[now, amount])
            .await
    }

    /// The closest meeting at or after `now`.
    pub async fn next_meeting(&self, now: i64) -> Result<Option<Meeting>, AppError> {
        let mut found = self
            .query_meetings("WHERE date >= ? ORDER BY date ASC LIMIT 1", &[now])
            .await?;
        Ok(found.pop())
    }

    /// Get a meeting by ID.
    pub async fn get_meeting(&self, id: &str) -> Result<Option<Meeting>, AppError> {
        let sql = format!("{} WHERE id = ?", MEETING_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(meeting_from_row).transpose()
    }

    /// Insert a new meeting.
    pub async fn insert_meeting(&self, draft: &MeetingDraft) -> Result<Meeting, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO meetings (id, date, topic, leader, duration, description, tags, useful_links, resources_url, meeting_href, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(draft.date)
        .bind(&draft.topic)
        .bind(&draft.leader)
        .bind(&draft.duration)
        .bind(&draft.description)
        .bind(serde_json::to_string(&draft.tags)?)
        .bind(serde_json::to_string(&draft.useful_links)?)
        .bind(&draft.resources_url)
        .bind(&draft.meeting_href)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(meeting_from_draft(id, draft, now.clone(), now))
    }

    /// Replace every field of an existing meeting.
    pub async fn replace_meeting(&self, id: &str, draft: &MeetingDraft) -> Result<Meeting, AppError> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            "UPDATE meetings SET date = ?, topic = ?, leader = ?, duration = ?, description = ?, tags = ?, useful_links = ?, resources_url = ?, meeting_href = ?, updated_at = ? WHERE id = ? RETURNING created_at"
        )
        .bind(draft.date)
        .bind(&draft.topic)
        .bind(&draft.leader)
        .bind(&draft.duration)
        .bind(&draft.description)
        .bind(serde_json::to_string(&draft.tags)?)
        .bind(serde_json::to_string(&draft.useful_links)?)
        .bind(&draft.resources_url)
        .bind(&draft.meeting_href)
        .bind(&now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!("Meeting {} not found", id)));
        };

        Ok(meeting_from_draft(id.to_string(), draft, row.get("created_at"), now))
    }

    /// Delete a meeting.
    pub async fn delete_meeting(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM meetings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Meeting {} not found", id)));
        }
        Ok(())
    }

    async fn query_meetings(&self, clause: &str, args: &[i64]) -> Result<Vec<Meeting>, AppError> {
        let sql = format!("{} {}", MEETING_SELECT, clause);
        let mut query = sqlx::query(&sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(meeting_from_row).collect()
    }
}

/// Decode a JSON array column; a value that does not parse is an error.
fn json_list<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<Vec<T>, AppError> {
    let raw: String = row.get(column);
    Ok(serde_json::from_str(&raw)?)
}

fn topic_from_row(row: &SqliteRow) -> Result<Topic, AppError> {
    Ok(Topic {
        id: row.get("id"),
        name: row.get("name"),
        tags: json_list(row, "tags")?,
        description: row.get("description"),
        votes: row.get("votes"),
        user_added: row.get("user_added"),
        votes_ledger: json_list(row, "votes_ledger")?,
        added_date: row.get("added_date"),
        version: row.get("version"),
    })
}

fn meeting_from_row(row: &SqliteRow) -> Result<Meeting, AppError> {
    Ok(Meeting {
        id: row.get("id"),
        date: row.get("date"),
        topic: row.get("topic"),
        leader: row.get("leader"),
        duration: row.get("duration"),
        description: row.get("description"),
        tags: json_list(row, "tags")?,
        useful_links: json_list(row, "useful_links")?,
        resources_url: row.get("resources_url"),
        meeting_href: row.get("meeting_href"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn meeting_from_draft(id: String, draft: &MeetingDraft, created_at: String, updated_at: String) -> Meeting {
    Meeting {
        id,
        date: draft.date,
        topic: draft.topic.clone(),
        leader: draft.leader.clone(),
        duration: draft.duration.clone(),
        description: draft.description.clone(),
        tags: draft.tags.clone(),
        useful_links: draft.useful_links.clone(),
        resources_url: draft.resources_url.clone(),
        meeting_href: draft.meeting_href.clone(),
        created_at,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (Repository::new(pool), dir)
    }

    fn new_topic(name: &str) -> NewTopic {
        NewTopic {
            name: name.to_string(),
            tags: vec!["systems".to_string()],
            description: None,
            user_added: "alice".to_string(),
        }
    }

    fn draft(topic: &str, date: i64) -> MeetingDraft {
        MeetingDraft {
            date,
            topic: topic.to_string(),
            leader: "alice".to_string(),
            duration: None,
            description: None,
            tags: vec![],
            useful_links: vec![],
            resources_url: None,
            meeting_href: None,
        }
    }

    #[tokio::test]
    async fn test_insert_topic_if_absent_rejects_duplicate_name() {
        let (repo, _dir) = repo().await;

        let first = repo.insert_topic_if_absent(&new_topic("Rust")).await.unwrap();
        assert!(first.is_some());
        let second = repo.insert_topic_if_absent(&new_topic("Rust")).await.unwrap();
        assert!(second.is_none());
        assert_eq!(repo.count_topics().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_topic_across_pooled_connections() {
        let (repo, _dir) = repo().await;

        // Open every pooled connection so inserts land on fresh ones too
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(repo.pool.acquire().await.unwrap());
        }
        drop(held);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.insert_topic_if_absent(&new_topic(&format!("Topic {}", i % 4)))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 4);
        assert_eq!(repo.count_topics().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_replace_topic_checks_version() {
        let (repo, _dir) = repo().await;
        let topic = repo
            .insert_topic_if_absent(&new_topic("Rust"))
            .await
            .unwrap()
            .unwrap();

        let mut edited = topic.clone();
        edited.tags.push("memory-safety".to_string());
        let written = repo.replace_topic(&edited).await.unwrap();
        assert_eq!(written.version, 2);

        // Writing from the stale copy must not succeed.
        let err = repo.replace_topic(&topic).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::VersionMismatch {
                current_version: 2,
                ..
            }
        ));

        let stored = repo.get_topic(&topic.id).await.unwrap().unwrap();
        assert_eq!(stored.tags, vec!["systems", "memory-safety"]);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_rename_referenced_topic_is_conflict() {
        let (repo, _dir) = repo().await;
        let topic = repo
            .insert_topic_if_absent(&new_topic("Rust"))
            .await
            .unwrap()
            .unwrap();
        repo.insert_meeting(&draft("Rust", 1_000)).await.unwrap();

        let mut renamed = topic.clone();
        renamed.name = "Rust 2024".to_string();
        let err = repo.replace_topic(&renamed).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Other edits of a referenced topic still go through
        let mut described = topic.clone();
        described.description = Some("ownership".to_string());
        let written = repo.replace_topic(&described).await.unwrap();
        assert_eq!(written.name, "Rust");
        assert_eq!(written.version, 2);
    }

    #[tokio::test]
    async fn test_modify_topic_writes_only_changes() {
        let (repo, _dir) = repo().await;
        let topic = repo
            .insert_topic_if_absent(&new_topic("Rust"))
            .await
            .unwrap()
            .unwrap();

        let (unchanged, _) = repo.modify_topic(&topic.id, |_| ()).await.unwrap();
        assert_eq!(unchanged.version, 1);

        let (changed, len) = repo
            .modify_topic(&topic.id, |t| {
                t.tags.push("async".to_string());
                t.tags.len()
            })
            .await
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(changed.version, 2);
        assert_eq!(repo.get_topic(&topic.id).await.unwrap().unwrap(), changed);

        let err = repo.modify_topic("missing", |_| ()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let (repo, _dir) = repo().await;
        let topic = repo
            .insert_topic_if_absent(&new_topic("Rust"))
            .await
            .unwrap()
            .unwrap();
        sqlx::query("UPDATE topics SET votes_ledger = 'not json' WHERE id = ?")
            .bind(&topic.id)
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.get_topic(&topic.id).await,
            Err(AppError::Internal(_))
        ));
        assert!(repo.modify_topic(&topic.id, |_| ()).await.is_err());

        let raw: String = sqlx::query("SELECT votes_ledger FROM topics WHERE id = ?")
            .bind(&topic.id)
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("votes_ledger");
        assert_eq!(raw, "not json");
    }

    #[tokio::test]
    async fn test_delete_topic_referenced_by_meeting_is_conflict() {
        let (repo, _dir) = repo().await;
        let topic = repo
            .insert_topic_if_absent(&new_topic("Rust"))
            .await
            .unwrap()
            .unwrap();
        let meeting = repo.insert_meeting(&draft("Rust", 1_000)).await.unwrap();

        let err = repo.delete_topic(&topic.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(repo.get_topic(&topic.id).await.unwrap().is_some());

        repo.delete_meeting(&meeting.id).await.unwrap();
        repo.delete_topic(&topic.id).await.unwrap();
        assert!(repo.get_topic(&topic.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_topic_is_not_found() {
        let (repo, _dir) = repo().await;
        let err = repo.delete_topic("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_meeting_time_queries() {
        let (repo, _dir) = repo().await;
        for date in [100, 200, 300, 400] {
            repo.insert_meeting(&draft("Rust", date)).await.unwrap();
        }

        let past = repo.meetings_until(250).await.unwrap();
        assert_eq!(past.iter().map(|m| m.date).collect::<Vec<_>>(), vec![200, 100]);

        let upcoming = repo.meetings_since(250).await.unwrap();
        assert_eq!(upcoming.iter().map(|m| m.date).collect::<Vec<_>>(), vec![300, 400]);

        assert_eq!(repo.next_meeting(250).await.unwrap().unwrap().date, 300);
        assert!(repo.next_meeting(500).await.unwrap().is_none());

        let last = repo.last_meetings(400, 2).await.unwrap();
        assert_eq!(last.iter().map(|m| m.date).collect::<Vec<_>>(), vec![400, 300]);

        let page = repo.list_meetings_page(2, 2).await.unwrap();
        assert_eq!(page.iter().map(|m| m.date).collect::<Vec<_>>(), vec![300, 400]);
        assert_eq!(repo.count_meetings().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_replace_meeting_keeps_created_at() {
        let (repo, _dir) = repo().await;
        let meeting = repo.insert_meeting(&draft("Rust", 100)).await.unwrap();

        let mut changed = draft("Rust", 150);
        changed.leader = "bob".to_string();
        let replaced = repo.replace_meeting(&meeting.id, &changed).await.unwrap();

        assert_eq!(replaced.created_at, meeting.created_at);
        assert_eq!(replaced.leader, "bob");
        assert_eq!(repo.get_meeting(&meeting.id).await.unwrap().unwrap().date, 150);

        let err = repo.replace_meeting("missing", &changed).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_deleted_meeting_is_not_found() {
        let (repo, _dir) = repo().await;
        let meeting = repo.insert_meeting(&draft("Rust", 100)).await.unwrap();
        repo.delete_meeting(&meeting.id).await.unwrap();

        let err = repo
            .replace_meeting(&meeting.id, &draft("Rust", 200))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(repo.count_meetings().await.unwrap(), 0);
    }
}
