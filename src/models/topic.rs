//! Topic model: a discussion subject that meetings reference by name.

use serde::{Deserialize, Serialize};

use super::{net_score, record_vote, LedgerEntry, VoteDirection, VoteOutcome};

/// Stored in `userAdded` when nobody is credited with a topic.
pub const DEFAULT_USER_ADDED: &str = "anonymous";

/// A discussion topic with its tag set and vote ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cached net score, always `net_score(&votes_ledger)`
    pub votes: i64,
    pub user_added: String,
    pub votes_ledger: Vec<LedgerEntry>,
    pub added_date: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Topic {
    /// Apply one user's vote and refresh the cached score from the full ledger.
    pub fn apply_vote(&mut self, user_id: &str, direction: VoteDirection) -> VoteOutcome {
        let outcome = record_vote(&mut self.votes_ledger, user_id, direction);
        self.votes = net_score(&self.votes_ledger);
        outcome
    }

    /// The current vote of a user, if any.
    pub fn vote_of(&self, user_id: &str) -> Option<VoteDirection> {
        self.votes_ledger
            .iter()
            .find(|e| e.user_id == user_id)
            .map(|e| e.direction)
    }
}

/// Fields of a topic about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub name: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub user_added: String,
}

/// Request body for creating a new topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    #[serde(alias = "topic")]
    pub name: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_added: Option<String>,
}

/// Request body for updating an existing topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicRequest {
    #[serde(default, alias = "topic")]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_added: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Query string of the vote endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteQuery {
    #[serde(default)]
    pub vote: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Topic {
        Topic {
            id: "t1".into(),
            name: "Rust".into(),
            tags: vec!["systems".into()],
            description: None,
            votes: 0,
            user_added: DEFAULT_USER_ADDED.into(),
            votes_ledger: Vec::new(),
            added_date: "2024-01-01T00:00:00+00:00".into(),
            version: 1,
        }
    }

    #[test]
    fn test_toggle_law() {
        let original = topic();
        let mut t = original.clone();
        t.apply_vote("alice", VoteDirection::Up);
        t.apply_vote("alice", VoteDirection::Up);
        assert_eq!(t, original);
    }

    #[test]
    fn test_switch_law() {
        let mut t = topic();
        t.apply_vote("alice", VoteDirection::Up);
        t.apply_vote("alice", VoteDirection::Down);

        let entries: Vec<_> = t
            .votes_ledger
            .iter()
            .filter(|e| e.user_id == "alice")
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].direction, VoteDirection::Down);
        assert_eq!(t.votes, -1);
    }

    #[test]
    fn test_up_down_up_ends_at_plus_one() {
        let mut t = topic();
        t.apply_vote("alice", VoteDirection::Up);
        t.apply_vote("alice", VoteDirection::Down);
        t.apply_vote("alice", VoteDirection::Up);

        assert_eq!(t.votes, 1);
        assert_eq!(t.votes_ledger.len(), 1);
        assert_eq!(t.vote_of("alice"), Some(VoteDirection::Up));
    }

    #[test]
    fn test_distinct_users_commute() {
        let mut a = topic();
        a.apply_vote("alice", VoteDirection::Up);
        a.apply_vote("bob", VoteDirection::Down);
        a.apply_vote("carol", VoteDirection::Up);

        let mut b = topic();
        b.apply_vote("carol", VoteDirection::Up);
        b.apply_vote("alice", VoteDirection::Up);
        b.apply_vote("bob", VoteDirection::Down);

        assert_eq!(a.votes, b.votes);
        assert_eq!(a.votes, 1);
    }

    #[test]
    fn test_create_request_accepts_legacy_topic_field() {
        let req: CreateTopicRequest =
            serde_json::from_str(r#"{"topic": "Async Rust", "tags": ["tokio"]}"#).unwrap();
        assert_eq!(req.name, "Async Rust");
        assert_eq!(req.tags, Some(vec!["tokio".to_string()]));
    }

    #[test]
    fn test_topic_serializes_camel_case() {
        let json = serde_json::to_value(topic()).unwrap();
        assert_eq!(json["userAdded"], DEFAULT_USER_ADDED);
        assert!(json["votesLedger"].is_array());
        assert!(json.get("description").is_none());
    }
}
