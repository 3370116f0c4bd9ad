use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::attribution::Attribution;

/// One email address on the waitlist. Insert-only, unique on email.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub email: String,
    pub attribution: Option<serde_json::Value>,
    pub referer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWaitlistEntry {
    pub email: String,
    pub attribution: Option<serde_json::Value>,
    pub referer: Option<String>,
}

/// Outcome of the conditional waitlist insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created(WaitlistEntry),
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContactMessage {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub kind: String,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubscribeRequest {
    pub email: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub source: Option<String>,
    /// URL of the page the form was submitted from; UTM params and the
    /// landing path are captured from it.
    pub page_url: Option<String>,
    /// Previously stored attribution blob, replayed by the client.
    pub attribution: Option<Attribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeResponse {
    pub duplicate: bool,
    pub message: String,
}

impl SubscribeResponse {
    pub fn created() -> Self {
        Self {
            duplicate: false,
            message: "you're on the list, see you soon".to_string(),
        }
    }

    pub fn duplicate() -> Self {
        Self {
            duplicate: true,
            message: "looks like you're already on our waitlist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactResponse {
    pub message: String,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unspecified,
}

impl Urgency {
    /// SLA string echoed back to the client; anything unrecognized gets the
    /// medium-tier estimate.
    pub fn estimated_response_time(self) -> &'static str {
        match self {
            Self::High => "15 minutes",
            Self::Medium => "2 hours",
            Self::Low => "24 hours",
            Self::Unspecified => "2 hours",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    pub session_id: Option<String>,
    pub reason: Option<String>,
    pub urgency: Option<Urgency>,
    pub user_message: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationResponse {
    pub ticket_id: String,
    pub estimated_response_time: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EscalationStatusQuery {
    pub ticket_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationStatus {
    pub ticket_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    pub message: String,
}
