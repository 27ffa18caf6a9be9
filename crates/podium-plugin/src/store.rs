//! Collaborator interfaces the runtime consumes, and the domain records they carry.
//!
//! The runtime never talks to a database, object store or mail server
//! directly. The embedding application supplies implementations of these
//! traits through [`HostServices`]; [`crate::memory`] has in-process ones.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PluginError;

// ─── Query shape ────────────────────────────────────────────────────────

/// Ordering for `find_many`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

/// A filtered, ordered listing request.
#[derive(Debug, Clone, Default)]
pub struct FindMany<F> {
    pub filter: F,
    pub order: SortOrder,
    pub take: Option<usize>,
}

impl<F> FindMany<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            order: SortOrder::default(),
            take: None,
        }
    }
}

/// Read access to one domain entity.
#[async_trait]
pub trait Repository: Send + Sync {
    type Record: Clone + Send + Sync + 'static;
    /// Unique lookup key (an id, or an id-or-natural-key enum).
    type Unique: Send + Sync;
    type Filter: Default + Send + Sync;

    async fn find_unique(&self, key: &Self::Unique) -> Result<Option<Self::Record>, PluginError>;

    async fn find_many(
        &self,
        query: FindMany<Self::Filter>,
    ) -> Result<Vec<Self::Record>, PluginError>;
}

/// Write access to one domain entity.
#[async_trait]
pub trait WritableRepository: Repository {
    type Create: Send;
    type Update: Send;

    async fn create(&self, data: Self::Create) -> Result<Self::Record, PluginError>;

    /// Returns `None` when no record matches `key`.
    async fn update(
        &self,
        key: &Self::Unique,
        data: Self::Update,
    ) -> Result<Option<Self::Record>, PluginError>;
}

// ─── Submissions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Waitlisted,
    Withdrawn,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Waitlisted => "waitlisted",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "under_review" => Ok(Self::UnderReview),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "waitlisted" => Ok(Self::Waitlisted),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(format!("unknown submission status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub event_id: Uuid,
    pub speaker_id: Uuid,
    pub track_id: Option<Uuid>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub outline: Option<String>,
    pub talk_format: Option<String>,
    pub status: SubmissionStatus,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFilter {
    pub event_id: Option<Uuid>,
    pub status: Option<SubmissionStatus>,
    pub speaker_id: Option<Uuid>,
    pub track_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub event_id: Uuid,
    pub speaker_id: Uuid,
    #[serde(default)]
    pub track_id: Option<Uuid>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub outline: Option<String>,
    #[serde(default)]
    pub talk_format: Option<String>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionUpdate {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub outline: Option<String>,
    pub talk_format: Option<String>,
    pub track_id: Option<Uuid>,
    pub status: Option<SubmissionStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
}

// ─── Reviews ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub reviewer_id: Uuid,
    pub score: Option<i32>,
    pub comment: Option<String>,
    pub recommendation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFilter {
    pub submission_id: Option<Uuid>,
    pub reviewer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub submission_id: Uuid,
    pub reviewer_id: Uuid,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    pub score: Option<i32>,
    pub comment: Option<String>,
    pub recommendation: Option<String>,
}

// ─── Users ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Speaker,
    Reviewer,
    Organizer,
    Admin,
}

/// A user row as the data layer holds it, credentials included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserUnique {
    Id(Uuid),
    Email(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    /// Case-insensitive substring match.
    pub email: Option<String>,
    pub role: Option<UserRole>,
}

// ─── Events ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub cfp_opens_at: Option<DateTime<Utc>>,
    pub cfp_closes_at: Option<DateTime<Utc>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether the call for papers accepts submissions at `now`.
    pub fn is_cfp_open(&self, now: DateTime<Utc>) -> bool {
        let opened = self.cfp_opens_at.is_some_and(|t| t <= now);
        let not_closed = self.cfp_closes_at.map_or(true, |t| now < t);
        opened && not_closed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventUnique {
    Id(Uuid),
    Slug(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Case-insensitive substring match on the event name.
    pub name: Option<String>,
}

// ─── Store aliases ──────────────────────────────────────────────────────

pub type SubmissionStore = dyn WritableRepository<
    Record = Submission,
    Unique = Uuid,
    Filter = SubmissionFilter,
    Create = NewSubmission,
    Update = SubmissionUpdate,
>;

pub type ReviewStore = dyn WritableRepository<
    Record = Review,
    Unique = Uuid,
    Filter = ReviewFilter,
    Create = NewReview,
    Update = ReviewUpdate,
>;

pub type UserStore = dyn Repository<Record = UserRecord, Unique = UserUnique, Filter = UserFilter>;

pub type EventStore = dyn Repository<Record = Event, Unique = EventUnique, Filter = EventFilter>;

// ─── Storage & email ────────────────────────────────────────────────────

/// Object storage. Keys are opaque, slash-separated paths.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), PluginError>;

    /// Returns `None` when the object does not exist.
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError>;

    /// Returns whether an object was removed.
    async fn delete(&self, key: &str) -> Result<bool, PluginError>;

    async fn exists(&self, key: &str) -> Result<bool, PluginError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Set by the runtime for audit, never by the plugin.
    #[serde(default, skip_deserializing)]
    pub sent_by_plugin: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), PluginError>;
}

// ─── Plugin persistence ─────────────────────────────────────────────────

/// Key-value data private to one plugin.
#[async_trait]
pub trait PluginDataStore: Send + Sync {
    async fn get(&self, plugin_id: Uuid, key: &str) -> Result<Option<serde_json::Value>, PluginError>;

    async fn set(&self, plugin_id: Uuid, key: &str, value: serde_json::Value) -> Result<(), PluginError>;

    async fn delete(&self, plugin_id: Uuid, key: &str) -> Result<bool, PluginError>;

    /// Keys in ascending order, optionally restricted to a prefix.
    async fn list_keys(&self, plugin_id: Uuid, prefix: Option<&str>) -> Result<Vec<String>, PluginError>;
}

/// The durable row backing a loaded plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    /// Stored form: password fields encrypted.
    pub config: serde_json::Value,
    pub approved_permissions: Vec<String>,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait PluginRecordStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<PluginRecord>, PluginError>;

    /// Create a disabled record with `{}` config and no approvals.
    async fn create(&self, name: &str, version: &str) -> Result<PluginRecord, PluginError>;

    async fn update_config(&self, id: Uuid, config: serde_json::Value) -> Result<(), PluginError>;

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), PluginError>;

    /// Record the version of the manifest currently loaded.
    async fn set_version(&self, id: Uuid, version: &str) -> Result<(), PluginError>;

    async fn set_approved_permissions(
        &self,
        id: Uuid,
        permissions: Vec<String>,
    ) -> Result<(), PluginError>;
}

// ─── Services bundle ────────────────────────────────────────────────────

/// Every collaborator the runtime needs, shared across plugins.
#[derive(Clone)]
pub struct HostServices {
    pub submissions: Arc<SubmissionStore>,
    pub reviews: Arc<ReviewStore>,
    pub users: Arc<UserStore>,
    pub events: Arc<EventStore>,
    pub storage: Arc<dyn StorageBackend>,
    pub email: Arc<dyn EmailSender>,
    pub plugin_data: Arc<dyn PluginDataStore>,
    pub plugin_records: Arc<dyn PluginRecordStore>,
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
