mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{submission, test_host_with, TEST_CONFIG_SECRET};
use podium_plugin::events::SUBMISSION_CREATED;
use podium_plugin::jobs::{AiReviewResult, AI_REVIEW_JOB_TYPE};
use podium_plugin::memory::MemoryServices;
use podium_plugin::store::PluginRecordStore;
use podium_plugin::{
    load_plugins, JobFilter, JobStatus, NewJob, Plugin, PluginCatalog, PluginContext, PluginError,
    RuntimeConfig, RuntimeHost,
};
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLUGIN: &str = "auto-reviewer";

/// Queues an AI review for every new submission.
struct AutoReviewer;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    api_key: String,
    base_url: String,
    model: String,
}

#[async_trait]
impl Plugin for AutoReviewer {
    async fn handle_hook(
        &self,
        _hook: &str,
        payload: &serde_json::Value,
        ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        let settings: Settings = ctx.config_as().await?;
        let job = NewJob::new(
            AI_REVIEW_JOB_TYPE,
            json!({
                "submissionId": payload["submissionId"],
                "provider": {
                    "kind": "openai",
                    "model": settings.model,
                    "apiKey": settings.api_key,
                    "baseUrl": settings.base_url,
                },
                "criteria": ["relevance to the audience"],
            }),
        );
        let id = ctx.jobs()?.enqueue(job).await?;
        ctx.logger().info(&format!("queued ai review {id}"));
        Ok(())
    }
}

fn manifest() -> String {
    json!({
        "name": PLUGIN,
        "displayName": "Auto Reviewer",
        "version": "1.0.0",
        "apiVersion": "1.0",
        "permissions": ["jobs:read", "jobs:write"],
        "hooks": [SUBMISSION_CREATED],
        "configSchema": {
            "type": "object",
            "properties": {
                "apiKey": { "type": "string", "format": "password" },
                "baseUrl": { "type": "string" },
                "model": { "type": "string", "default": "gpt-4o-mini" }
            },
            "required": ["apiKey", "baseUrl"]
        }
    })
    .to_string()
}

/// Load the plugin, then save its config and enable it the way an admin would.
async fn boot(server: &MockServer) -> (RuntimeHost, MemoryServices) {
    let mut config = RuntimeConfig::with_secret(TEST_CONFIG_SECRET);
    config.job_max_attempts = 1;
    let (host, memory) = test_host_with(config);

    let record = memory.plugin_records.create(PLUGIN, "1.0.0").await.unwrap();
    memory
        .plugin_records
        .set_approved_permissions(record.id, vec!["jobs:read".into(), "jobs:write".into()])
        .await
        .unwrap();

    let report = load_plugins(
        &host,
        PluginCatalog::new().with_json(Arc::new(AutoReviewer), manifest()),
    )
    .await;
    assert_eq!(report.loaded, vec![PLUGIN]);

    host.update_plugin_config(
        PLUGIN,
        json!({ "apiKey": "sk-test", "baseUrl": format!("{}/v1", server.uri()) }),
    )
    .await
    .unwrap();
    assert!(host.enable_plugin(PLUGIN).await.unwrap());

    (host, memory)
}

#[tokio::test]
async fn test_ai_review_completes_with_parsed_verdict() {
    let server = MockServer::start().await;
    let verdict = json!({
        "score": 8,
        "recommendation": "accept",
        "summary": "A practical migration story.",
        "strengths": ["concrete numbers"],
        "weaknesses": ["light on failure modes"],
        "suggestions": ["add a rollback section"]
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": format!("```json\n{verdict}\n```") } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (host, memory) = boot(&server).await;
    let talk = submission("From batch to streaming");
    memory.submissions.insert(talk.clone()).await;

    let report = host
        .dispatch(SUBMISSION_CREATED, &json!({ "submissionId": talk.id }))
        .await;
    assert!(report.all_ok(), "{report:?}");

    let jobs = host.queue().list(Some(PLUGIN), &JobFilter::default()).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);

    let worker = host.job_worker().unwrap();
    assert!(worker.run_once().await);

    let job = host.queue().get(jobs[0].id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let result: AiReviewResult = serde_json::from_value(job.result.unwrap()).unwrap();
    assert_eq!(result.submission_id, talk.id);
    assert_eq!(result.score, 8.0);
    assert_eq!(result.recommendation, "accept");
    assert_eq!(result.suggestions, vec!["add a rollback section"]);
    assert_eq!(result.model, "gpt-4o-mini");
}

#[tokio::test]
async fn test_provider_error_fails_job_with_provider_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string(r#"{"error":{"message":"The server had an error"}}"#),
        )
        .mount(&server)
        .await;

    let (host, memory) = boot(&server).await;
    let talk = submission("Doomed");
    memory.submissions.insert(talk.clone()).await;

    host.dispatch(SUBMISSION_CREATED, &json!({ "submissionId": talk.id }))
        .await;
    let id = host.queue().list(Some(PLUGIN), &JobFilter::default()).await[0].id;

    let worker = host.job_worker().unwrap();
    assert!(worker.run_once().await);
    assert!(!worker.run_once().await);

    let job = host.queue().get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("500"), "{error}");
    assert!(error.contains("The server had an error"), "{error}");
    assert!(job.result.is_none());
}

#[tokio::test]
async fn test_missing_submission_fails_without_calling_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (host, _) = boot(&server).await;
    host.dispatch(
        SUBMISSION_CREATED,
        &json!({ "submissionId": uuid::Uuid::new_v4() }),
    )
    .await;

    let worker = host.job_worker().unwrap();
    assert!(worker.run_once().await);
    let job = &host.queue().list(Some(PLUGIN), &JobFilter::default()).await[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("not found"));
}
