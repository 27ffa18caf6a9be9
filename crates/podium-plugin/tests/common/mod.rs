// Shared test utilities for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use podium_plugin::memory::MemoryServices;
use podium_plugin::store::{PluginRecord, PluginRecordStore, Submission, SubmissionStatus};
use podium_plugin::{Plugin, PluginContext, PluginError, RuntimeConfig, RuntimeHost};
use uuid::Uuid;

pub const TEST_CONFIG_SECRET: &str = "test-config-secret-for-testing-only";

/// A host over fresh in-memory collaborators.
pub fn test_host() -> (RuntimeHost, MemoryServices) {
    test_host_with(RuntimeConfig::with_secret(TEST_CONFIG_SECRET))
}

pub fn test_host_with(config: RuntimeConfig) -> (RuntimeHost, MemoryServices) {
    let memory = MemoryServices::new();
    let host = RuntimeHost::new(config, memory.host_services())
        .expect("host should build with a non-empty secret");
    (host, memory)
}

/// Pre-create an enabled record with the given approvals, as an admin would.
pub async fn approved_record(
    memory: &MemoryServices,
    name: &str,
    approved: &[&str],
) -> PluginRecord {
    let record = memory.plugin_records.create(name, "1.0.0").await.unwrap();
    memory
        .plugin_records
        .set_approved_permissions(record.id, approved.iter().map(|p| p.to_string()).collect())
        .await
        .unwrap();
    memory.plugin_records.set_enabled(record.id, true).await.unwrap();
    memory.plugin_records.find_by_name(name).await.unwrap().unwrap()
}

pub fn submission(title: &str) -> Submission {
    let now = Utc::now();
    Submission {
        id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        speaker_id: Uuid::new_v4(),
        track_id: None,
        title: title.to_string(),
        abstract_text: "How we replaced a nightly batch with a streaming pipeline.".to_string(),
        outline: Some("1. Before\n2. After".to_string()),
        talk_format: Some("talk".to_string()),
        status: SubmissionStatus::Submitted,
        status_changed_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Counts hook deliveries and reads the submission it was told about.
#[derive(Debug, Default)]
pub struct CountingPlugin {
    calls: AtomicUsize,
    seen_titles: std::sync::Mutex<Vec<String>>,
}

impl CountingPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_titles(&self) -> Vec<String> {
        self.seen_titles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for CountingPlugin {
    async fn handle_hook(
        &self,
        _hook: &str,
        payload: &serde_json::Value,
        ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(id) = payload["submissionId"].as_str().and_then(|s| s.parse::<Uuid>().ok()) else {
            return Ok(());
        };
        if let Some(submission) = ctx.submissions()?.get(id).await? {
            self.seen_titles.lock().unwrap().push(submission.title);
        }
        Ok(())
    }
}
