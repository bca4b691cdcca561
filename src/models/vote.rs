//! Per-user vote ledger.

use serde::{Deserialize, Serialize};

/// Direction of a single vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }

    /// Parse a direction. Matching is case-sensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(VoteDirection::Up),
            "down" => Some(VoteDirection::Down),
            _ => None,
        }
    }

    fn weight(&self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

/// One user's current vote on a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub user_id: String,
    pub direction: VoteDirection,
}

/// What a vote did to the ledger.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    /// First vote by this user.
    Cast,
    /// Same direction again, the entry was removed.
    Retracted,
    /// Opposite direction, the entry was flipped.
    Switched,
}

/// Record `direction` for `user_id`, keeping at most one entry per user.
pub fn record_vote(
    ledger: &mut Vec<LedgerEntry>,
    user_id: &str,
    direction: VoteDirection,
) -> VoteOutcome {
    match ledger.iter().position(|e| e.user_id == user_id) {
        None => {
            ledger.push(LedgerEntry {
                user_id: user_id.to_string(),
                direction,
            });
            VoteOutcome::Cast
        }
        Some(index) if ledger[index].direction == direction => {
            ledger.remove(index);
            VoteOutcome::Retracted
        }
        Some(index) => {
            ledger[index].direction = direction;
            VoteOutcome::Switched
        }
    }
}

/// Net score of a ledger: ups minus downs.
pub fn net_score(ledger: &[LedgerEntry]) -> i64 {
    ledger.iter().map(|e| e.direction.weight()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(VoteDirection::parse("up"), Some(VoteDirection::Up));
        assert_eq!(VoteDirection::parse("down"), Some(VoteDirection::Down));
        assert_eq!(VoteDirection::parse("Up"), None);
        assert_eq!(VoteDirection::parse("sideways"), None);
        assert_eq!(VoteDirection::parse(""), None);
    }

    #[test]
    fn test_first_vote_appends() {
        let mut ledger = Vec::new();
        assert_eq!(record_vote(&mut ledger, "u1", VoteDirection::Up), VoteOutcome::Cast);
        assert_eq!(ledger.len(), 1);
        assert_eq!(net_score(&ledger), 1);
    }

    #[test]
    fn test_same_direction_twice_retracts() {
        let mut ledger = vec![LedgerEntry {
            user_id: "other".into(),
            direction: VoteDirection::Down,
        }];
        let before = ledger.clone();

        record_vote(&mut ledger, "u1", VoteDirection::Up);
        let outcome = record_vote(&mut ledger, "u1", VoteDirection::Up);

        assert_eq!(outcome, VoteOutcome::Retracted);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_opposite_direction_switches() {
        let mut ledger = Vec::new();
        record_vote(&mut ledger, "u1", VoteDirection::Up);
        let outcome = record_vote(&mut ledger, "u1", VoteDirection::Down);

        assert_eq!(outcome, VoteOutcome::Switched);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction, VoteDirection::Down);
        assert_eq!(net_score(&ledger), -1);
    }

    #[test]
    fn test_score_matches_ledger_for_many_users() {
        let mut ledger = Vec::new();
        let votes = [
            ("a", VoteDirection::Up),
            ("b", VoteDirection::Up),
            ("c", VoteDirection::Down),
            ("d", VoteDirection::Up),
            ("b", VoteDirection::Down),
            ("e", VoteDirection::Down),
            ("a", VoteDirection::Up),
        ];
        for (user, direction) in votes {
            record_vote(&mut ledger, user, direction);
        }

        let ups = ledger.iter().filter(|e| e.direction == VoteDirection::Up).count() as i64;
        let downs = ledger.len() as i64 - ups;
        assert_eq!(net_score(&ledger), ups - downs);
        // a retracted, b switched to down
        assert_eq!(net_score(&ledger), -2);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let entry = LedgerEntry {
            user_id: "u1".into(),
            direction: VoteDirection::Down,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["direction"], "down");
    }
}
