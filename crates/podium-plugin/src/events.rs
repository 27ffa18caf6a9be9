//! Hook names plugins can subscribe to, and their payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SUBMISSION_CREATED: &str = "submission.created";
pub const SUBMISSION_UPDATED: &str = "submission.updated";
pub const SUBMISSION_STATUS_CHANGED: &str = "submission.status_changed";
pub const SUBMISSION_WITHDRAWN: &str = "submission.withdrawn";
pub const REVIEW_CREATED: &str = "review.created";
pub const REVIEW_UPDATED: &str = "review.updated";
pub const EVENT_CREATED: &str = "event.created";
pub const EVENT_UPDATED: &str = "event.updated";
pub const EVENT_CFP_OPENED: &str = "event.cfp_opened";
pub const EVENT_CFP_CLOSED: &str = "event.cfp_closed";
pub const USER_REGISTERED: &str = "user.registered";
pub const FEDERATION_EVENT_RECEIVED: &str = "federation.event_received";

/// Known hook names that plugins can declare in their manifest.
pub const KNOWN_HOOKS: &[&str] = &[
    SUBMISSION_CREATED,
    SUBMISSION_UPDATED,
    SUBMISSION_STATUS_CHANGED,
    SUBMISSION_WITHDRAWN,
    REVIEW_CREATED,
    REVIEW_UPDATED,
    EVENT_CREATED,
    EVENT_UPDATED,
    EVENT_CFP_OPENED,
    EVENT_CFP_CLOSED,
    USER_REGISTERED,
    FEDERATION_EVENT_RECEIVED,
];

/// Check if a hook name is one the host ever dispatches.
pub fn is_known_hook(name: &str) -> bool {
    KNOWN_HOOKS.contains(&name)
}

/// A hook invocation with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl HookEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Build an event from a typed payload.
    pub fn typed<P: Serialize>(name: &str, payload: &P) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }
}

// ─── Payload types ───────────────────────────────────────────────────

/// Payload for `submission.created`, `submission.updated` and `submission.withdrawn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub submission_id: Uuid,
    pub event_id: Uuid,
    pub speaker_id: Uuid,
    pub title: String,
}

/// Payload for `submission.status_changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatusChangedPayload {
    pub submission_id: Uuid,
    pub event_id: Uuid,
    pub previous_status: String,
    pub status: String,
    pub changed_at: DateTime<Utc>,
}

/// Payload for `review.created` and `review.updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPayload {
    pub review_id: Uuid,
    pub submission_id: Uuid,
    pub reviewer_id: Uuid,
}

/// Payload for the `event.*` hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_id: Uuid,
    pub slug: String,
    pub name: String,
}

/// Payload for `user.registered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisteredPayload {
    pub user_id: Uuid,
    pub email: String,
}

/// Payload for `federation.event_received`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationEventPayload {
    pub source: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hooks_contains_expected() {
        assert!(is_known_hook("submission.created"));
        assert!(is_known_hook("review.updated"));
        assert!(is_known_hook("federation.event_received"));
        assert!(!is_known_hook("submission.deleted"));
        assert!(!is_known_hook("on_track_added"));
    }

    #[test]
    fn test_known_hooks_count() {
        assert_eq!(KNOWN_HOOKS.len(), 12);
    }

    #[test]
    fn test_typed_event_uses_camel_case() {
        let payload = SubmissionPayload {
            submission_id: Uuid::nil(),
            event_id: Uuid::nil(),
            speaker_id: Uuid::nil(),
            title: "Zero-cost abstractions".into(),
        };
        let event = HookEvent::typed(SUBMISSION_CREATED, &payload).unwrap();
        assert_eq!(event.name, "submission.created");
        assert_eq!(event.payload["title"], "Zero-cost abstractions");
        assert!(event.payload.get("submissionId").is_some());
        assert!(event.payload.get("submission_id").is_none());
    }

    #[test]
    fn test_status_changed_payload_deserializes() {
        let json = serde_json::json!({
            "submissionId": Uuid::nil(),
            "eventId": Uuid::nil(),
            "previousStatus": "submitted",
            "status": "accepted",
            "changedAt": "2026-03-01T10:00:00Z",
        });
        let payload: SubmissionStatusChangedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.previous_status, "submitted");
        assert_eq!(payload.status, "accepted");
    }
}
