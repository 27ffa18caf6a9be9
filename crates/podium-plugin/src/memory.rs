//! In-memory collaborator implementations for tests and local development.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PluginError;
use crate::store::{
    EmailMessage, EmailSender, Event, EventFilter, EventStore, EventUnique, FindMany, HostServices,
    NewReview, NewSubmission, PluginDataStore, PluginRecord, PluginRecordStore, Repository,
    Review, ReviewFilter, ReviewStore, ReviewUpdate, SortOrder, StorageBackend, Submission,
    SubmissionFilter, SubmissionStatus, SubmissionStore, SubmissionUpdate, UserFilter, UserRecord,
    UserStore, UserUnique, WritableRepository,
};

fn order_and_take<T>(
    mut rows: Vec<T>,
    order: SortOrder,
    take: Option<usize>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    match order {
        SortOrder::CreatedAtDesc => rows.sort_by_key(|r| std::cmp::Reverse(created_at(r))),
        SortOrder::CreatedAtAsc => rows.sort_by_key(|r| created_at(r)),
    }
    if let Some(n) = take {
        rows.truncate(n);
    }
    rows
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ─── Submissions ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySubmissions {
    rows: RwLock<Vec<Submission>>,
}

impl MemorySubmissions {
    pub async fn insert(&self, submission: Submission) {
        self.rows.write().await.push(submission);
    }
}

#[async_trait]
impl Repository for MemorySubmissions {
    type Record = Submission;
    type Unique = Uuid;
    type Filter = SubmissionFilter;

    async fn find_unique(&self, key: &Uuid) -> Result<Option<Submission>, PluginError> {
        Ok(self.rows.read().await.iter().find(|s| s.id == *key).cloned())
    }

    async fn find_many(
        &self,
        query: FindMany<SubmissionFilter>,
    ) -> Result<Vec<Submission>, PluginError> {
        let f = &query.filter;
        let rows: Vec<Submission> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|s| f.event_id.is_none_or_eq(s.event_id))
            .filter(|s| f.speaker_id.is_none_or_eq(s.speaker_id))
            .filter(|s| f.status.is_none_or_eq(s.status))
            .filter(|s| f.track_id.is_none() || f.track_id == s.track_id)
            .cloned()
            .collect();
        Ok(order_and_take(rows, query.order, query.take, |s| s.created_at))
    }
}

#[async_trait]
impl WritableRepository for MemorySubmissions {
    type Create = NewSubmission;
    type Update = SubmissionUpdate;

    async fn create(&self, data: NewSubmission) -> Result<Submission, PluginError> {
        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            event_id: data.event_id,
            speaker_id: data.speaker_id,
            track_id: data.track_id,
            title: data.title,
            abstract_text: data.abstract_text,
            outline: data.outline,
            talk_format: data.talk_format,
            status: SubmissionStatus::Submitted,
            status_changed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(submission.clone());
        Ok(submission)
    }

    async fn update(
        &self,
        key: &Uuid,
        data: SubmissionUpdate,
    ) -> Result<Option<Submission>, PluginError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|s| s.id == *key) else {
            return Ok(None);
        };
        if let Some(title) = data.title {
            row.title = title;
        }
        if let Some(text) = data.abstract_text {
            row.abstract_text = text;
        }
        if data.outline.is_some() {
            row.outline = data.outline;
        }
        if data.talk_format.is_some() {
            row.talk_format = data.talk_format;
        }
        if data.track_id.is_some() {
            row.track_id = data.track_id;
        }
        if let Some(status) = data.status {
            row.status = status;
        }
        if data.status_changed_at.is_some() {
            row.status_changed_at = data.status_changed_at;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

// Small helper so filters read as one line each.
trait OptionFilterExt<T> {
    fn is_none_or_eq(&self, value: T) -> bool;
}

impl<T: PartialEq + Copy> OptionFilterExt<T> for Option<T> {
    fn is_none_or_eq(&self, value: T) -> bool {
        self.map_or(true, |v| v == value)
    }
}

// ─── Reviews ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryReviews {
    rows: RwLock<Vec<Review>>,
}

#[async_trait]
impl Repository for MemoryReviews {
    type Record = Review;
    type Unique = Uuid;
    type Filter = ReviewFilter;

    async fn find_unique(&self, key: &Uuid) -> Result<Option<Review>, PluginError> {
        Ok(self.rows.read().await.iter().find(|r| r.id == *key).cloned())
    }

    async fn find_many(&self, query: FindMany<ReviewFilter>) -> Result<Vec<Review>, PluginError> {
        let f = &query.filter;
        let rows: Vec<Review> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| f.submission_id.is_none_or_eq(r.submission_id))
            .filter(|r| f.reviewer_id.is_none_or_eq(r.reviewer_id))
            .cloned()
            .collect();
        Ok(order_and_take(rows, query.order, query.take, |r| r.created_at))
    }
}

#[async_trait]
impl WritableRepository for MemoryReviews {
    type Create = NewReview;
    type Update = ReviewUpdate;

    async fn create(&self, data: NewReview) -> Result<Review, PluginError> {
        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(),
            submission_id: data.submission_id,
            reviewer_id: data.reviewer_id,
            score: data.score,
            comment: data.comment,
            recommendation: data.recommendation,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(review.clone());
        Ok(review)
    }

    async fn update(&self, key: &Uuid, data: ReviewUpdate) -> Result<Option<Review>, PluginError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|r| r.id == *key) else {
            return Ok(None);
        };
        if data.score.is_some() {
            row.score = data.score;
        }
        if data.comment.is_some() {
            row.comment = data.comment;
        }
        if data.recommendation.is_some() {
            row.recommendation = data.recommendation;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

// ─── Users ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryUsers {
    rows: RwLock<Vec<UserRecord>>,
}

impl MemoryUsers {
    pub async fn insert(&self, user: UserRecord) {
        self.rows.write().await.push(user);
    }
}

#[async_trait]
impl Repository for MemoryUsers {
    type Record = UserRecord;
    type Unique = UserUnique;
    type Filter = UserFilter;

    async fn find_unique(&self, key: &UserUnique) -> Result<Option<UserRecord>, PluginError> {
        let rows = self.rows.read().await;
        let found = match key {
            UserUnique::Id(id) => rows.iter().find(|u| u.id == *id),
            UserUnique::Email(email) => rows.iter().find(|u| u.email.eq_ignore_ascii_case(email)),
        };
        Ok(found.cloned())
    }

    async fn find_many(&self, query: FindMany<UserFilter>) -> Result<Vec<UserRecord>, PluginError> {
        let f = &query.filter;
        let rows: Vec<UserRecord> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|u| f.email.as_deref().map_or(true, |e| contains_ci(&u.email, e)))
            .filter(|u| f.role.is_none_or_eq(u.role))
            .cloned()
            .collect();
        Ok(order_and_take(rows, query.order, query.take, |u| u.created_at))
    }
}

// ─── Events ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryEvents {
    rows: RwLock<Vec<Event>>,
}

impl MemoryEvents {
    pub async fn insert(&self, event: Event) {
        self.rows.write().await.push(event);
    }
}

#[async_trait]
impl Repository for MemoryEvents {
    type Record = Event;
    type Unique = EventUnique;
    type Filter = EventFilter;

    async fn find_unique(&self, key: &EventUnique) -> Result<Option<Event>, PluginError> {
        let rows = self.rows.read().await;
        let found = match key {
            EventUnique::Id(id) => rows.iter().find(|e| e.id == *id),
            EventUnique::Slug(slug) => rows.iter().find(|e| e.slug == *slug),
        };
        Ok(found.cloned())
    }

    async fn find_many(&self, query: FindMany<EventFilter>) -> Result<Vec<Event>, PluginError> {
        let f = &query.filter;
        let rows: Vec<Event> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|e| f.name.as_deref().map_or(true, |n| contains_ci(&e.name, n)))
            .cloned()
            .collect();
        Ok(order_and_take(rows, query.order, query.take, |e| e.created_at))
    }
}

// ─── Storage ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), PluginError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError> {
        Ok(self.objects.read().await.get(key).map(|o| o.data.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, PluginError> {
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, PluginError> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

// ─── Email ──────────────────────────────────────────────────────────────

/// Records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: RwLock<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl EmailSender for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), PluginError> {
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}

// ─── Plugin data & records ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryPluginData {
    entries: RwLock<BTreeMap<(Uuid, String), serde_json::Value>>,
}

#[async_trait]
impl PluginDataStore for MemoryPluginData {
    async fn get(&self, plugin_id: Uuid, key: &str) -> Result<Option<serde_json::Value>, PluginError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(plugin_id, key.to_string()))
            .cloned())
    }

    async fn set(&self, plugin_id: Uuid, key: &str, value: serde_json::Value) -> Result<(), PluginError> {
        self.entries
            .write()
            .await
            .insert((plugin_id, key.to_string()), value);
        Ok(())
    }

    async fn delete(&self, plugin_id: Uuid, key: &str) -> Result<bool, PluginError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(&(plugin_id, key.to_string()))
            .is_some())
    }

    async fn list_keys(&self, plugin_id: Uuid, prefix: Option<&str>) -> Result<Vec<String>, PluginError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|(id, key)| *id == plugin_id && prefix.map_or(true, |p| key.starts_with(p)))
            .map(|(_, key)| key.clone())
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPluginRecords {
    rows: RwLock<HashMap<String, PluginRecord>>,
}

impl MemoryPluginRecords {
    /// Seed a record, e.g. one an administrator already configured.
    pub async fn insert(&self, record: PluginRecord) {
        self.rows.write().await.insert(record.name.clone(), record);
    }

    async fn modify(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut PluginRecord),
    ) -> Result<(), PluginError> {
        let mut rows = self.rows.write().await;
        let record = rows
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PluginError::Store(format!("plugin record {id} not found")))?;
        apply(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PluginRecordStore for MemoryPluginRecords {
    async fn find_by_name(&self, name: &str) -> Result<Option<PluginRecord>, PluginError> {
        Ok(self.rows.read().await.get(name).cloned())
    }

    async fn create(&self, name: &str, version: &str) -> Result<PluginRecord, PluginError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(name) {
            return Err(PluginError::Store(format!(
                "plugin record '{name}' already exists"
            )));
        }
        let now = Utc::now();
        let record = PluginRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: version.to_string(),
            enabled: false,
            config: serde_json::json!({}),
            approved_permissions: Vec::new(),
            installed_at: now,
            updated_at: now,
        };
        rows.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn update_config(&self, id: Uuid, config: serde_json::Value) -> Result<(), PluginError> {
        self.modify(id, |r| r.config = config).await
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), PluginError> {
        self.modify(id, |r| r.enabled = enabled).await
    }

    async fn set_version(&self, id: Uuid, version: &str) -> Result<(), PluginError> {
        self.modify(id, |r| r.version = version.to_string()).await
    }

    async fn set_approved_permissions(
        &self,
        id: Uuid,
        permissions: Vec<String>,
    ) -> Result<(), PluginError> {
        self.modify(id, |r| r.approved_permissions = permissions).await
    }
}

// ─── Bundle ─────────────────────────────────────────────────────────────

/// Concrete in-memory collaborators, kept typed so tests can seed and inspect them.
#[derive(Debug, Default, Clone)]
pub struct MemoryServices {
    pub submissions: Arc<MemorySubmissions>,
    pub reviews: Arc<MemoryReviews>,
    pub users: Arc<MemoryUsers>,
    pub events: Arc<MemoryEvents>,
    pub storage: Arc<MemoryStorage>,
    pub mailer: Arc<MemoryMailer>,
    pub plugin_data: Arc<MemoryPluginData>,
    pub plugin_records: Arc<MemoryPluginRecords>,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_services(&self) -> HostServices {
        let submissions: Arc<SubmissionStore> = self.submissions.clone();
        let reviews: Arc<ReviewStore> = self.reviews.clone();
        let users: Arc<UserStore> = self.users.clone();
        let events: Arc<EventStore> = self.events.clone();
        HostServices {
            submissions,
            reviews,
            users,
            events,
            storage: self.storage.clone(),
            email: self.mailer.clone(),
            plugin_data: self.plugin_data.clone(),
            plugin_records: self.plugin_records.clone(),
        }
    }
}
