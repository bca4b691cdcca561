//! Meeting model: an event that references a topic by name.

use serde::{Deserialize, Serialize};

/// A scheduled or past meeting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    /// Start time in milliseconds since the Unix epoch
    pub date: i64,
    /// Topic name, resolved by lookup rather than by id
    pub topic: String,
    pub leader: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub useful_links: Vec<String>,
    #[serde(rename = "resourcesURL", skip_serializing_if = "Option::is_none")]
    pub resources_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_href: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating or replacing a meeting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRequest {
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub useful_links: Vec<String>,
    #[serde(default, rename = "resourcesURL")]
    pub resources_url: Option<String>,
    #[serde(default)]
    pub meeting_href: Option<String>,
}

/// Validated meeting fields ready to be written.
#[derive(Debug, Clone)]
pub struct MeetingDraft {
    pub date: i64,
    pub topic: String,
    pub leader: String,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub useful_links: Vec<String>,
    pub resources_url: Option<String>,
    pub meeting_href: Option<String>,
}
