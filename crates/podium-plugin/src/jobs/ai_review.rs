//! `ai-review` job handler: asks an LLM provider for a first-pass review.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker::JobHandler;
use super::PluginJob;
use crate::error::PluginError;
use crate::store::{Submission, SubmissionStore};

pub const AI_REVIEW_JOB_TYPE: &str = "ai-review";

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const MAX_ERROR_BODY_LEN: usize = 500;

const SYSTEM_PROMPT: &str = "You are an experienced conference program committee member. \
Review the talk proposal you are given and answer with a single JSON object with the keys \
\"score\" (number from 1 to 10), \"recommendation\" (one of \"strong_accept\", \"accept\", \
\"neutral\", \"reject\", \"strong_reject\"), \"summary\" (string), \"strengths\", \
\"weaknesses\" and \"suggestions\" (arrays of strings). Do not add any other text.";

// ─── Payload ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReviewPayload {
    pub submission_id: Uuid,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// The verdict stored as the job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReviewResult {
    pub submission_id: Uuid,
    pub score: f64,
    pub recommendation: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    recommendation: String,
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

// ─── Response parsing ───────────────────────────────────────────────────

/// Pull the JSON object out of a completion that may wrap it in prose or code fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}

fn parse_verdict(text: &str) -> Result<Verdict, PluginError> {
    let json = extract_json_object(text)
        .ok_or_else(|| PluginError::Provider("completion contains no JSON object".into()))?;
    let verdict: Verdict = serde_json::from_str(json)
        .map_err(|e| PluginError::Provider(format!("completion is not a valid verdict: {e}")))?;
    if !(1.0..=10.0).contains(&verdict.score) {
        return Err(PluginError::Provider(format!(
            "score {} is outside 1-10",
            verdict.score
        )));
    }
    Ok(verdict)
}

fn build_prompt(submission: &Submission, criteria: &[String]) -> String {
    let mut prompt = format!(
        "Title: {}\n\nAbstract:\n{}\n",
        submission.title, submission.abstract_text
    );
    if let Some(ref outline) = submission.outline {
        prompt.push_str(&format!("\nOutline:\n{outline}\n"));
    }
    if let Some(ref format) = submission.talk_format {
        prompt.push_str(&format!("\nFormat: {format}\n"));
    }
    if !criteria.is_empty() {
        prompt.push_str("\nJudge it against these criteria:\n");
        for c in criteria {
            prompt.push_str(&format!("- {c}\n"));
        }
    }
    prompt
}

fn endpoint(settings: &ProviderSettings, path: &str) -> Result<url::Url, PluginError> {
    let base = settings.base_url.as_deref().unwrap_or(match settings.kind {
        ProviderKind::Openai => OPENAI_DEFAULT_BASE,
        ProviderKind::Anthropic => ANTHROPIC_DEFAULT_BASE,
    });
    let url = url::Url::parse(&format!("{}/{path}", base.trim_end_matches('/')))
        .map_err(|e| PluginError::InvalidJob(format!("invalid provider base URL: {e}")))?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(PluginError::InvalidJob(format!(
            "provider URL scheme '{other}' is not allowed"
        ))),
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LEN {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{cut}…")
    } else {
        body.to_string()
    }
}

// ─── Handler ────────────────────────────────────────────────────────────

pub struct AiReviewHandler {
    submissions: Arc<SubmissionStore>,
    client: reqwest::Client,
}

impl AiReviewHandler {
    pub fn new(submissions: Arc<SubmissionStore>, timeout: Duration) -> Result<Self, PluginError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Podium/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            submissions,
            client,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        provider: ProviderKind,
    ) -> Result<serde_json::Value, PluginError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PluginError::Timeout(format!("{} request timed out", provider.as_str()))
            } else {
                PluginError::Http(format!("{} request failed: {e}", provider.as_str()))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = format!(
                "{} returned {status}: {}",
                provider.as_str(),
                truncate_body(&body)
            );
            return Err(
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    PluginError::ProviderUnavailable(message)
                } else {
                    PluginError::Provider(message)
                },
            );
        }

        resp.json()
            .await
            .map_err(|e| PluginError::Provider(format!("invalid response body: {e}")))
    }

    async fn complete_openai(
        &self,
        settings: &ProviderSettings,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, PluginError> {
        let url = endpoint(settings, "chat/completions")?;
        let body = serde_json::json!({
            "model": settings.model,
            "max_tokens": max_tokens,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });
        let request = self
            .client
            .post(url)
            .bearer_auth(&settings.api_key)
            .json(&body);
        let json = self.send(request, ProviderKind::Openai).await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PluginError::Provider("openai response has no message content".into()))
    }

    async fn complete_anthropic(
        &self,
        settings: &ProviderSettings,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, PluginError> {
        let url = endpoint(settings, "messages")?;
        let body = serde_json::json!({
            "model": settings.model,
            "max_tokens": max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(url)
            .header("x-api-key", &settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let json = self.send(request, ProviderKind::Anthropic).await?;

        json["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .map(str::to_string)
            .ok_or_else(|| PluginError::Provider("anthropic response has no text block".into()))
    }
}

#[async_trait]
impl JobHandler for AiReviewHandler {
    fn job_type(&self) -> &str {
        AI_REVIEW_JOB_TYPE
    }

    async fn run(&self, job: &PluginJob) -> Result<serde_json::Value, PluginError> {
        let payload: AiReviewPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| PluginError::InvalidJob(format!("invalid ai-review payload: {e}")))?;

        let submission = self
            .submissions
            .find_unique(&payload.submission_id)
            .await?
            .ok_or_else(|| {
                PluginError::InvalidJob(format!("submission {} not found", payload.submission_id))
            })?;

        let prompt = build_prompt(&submission, &payload.criteria);
        let max_tokens = payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let provider = &payload.provider;

        tracing::debug!(
            job_id = %job.id,
            plugin = %job.plugin_name,
            provider = provider.kind.as_str(),
            model = %provider.model,
            "requesting ai review"
        );

        let text = match provider.kind {
            ProviderKind::Openai => self.complete_openai(provider, &prompt, max_tokens).await?,
            ProviderKind::Anthropic => {
                self.complete_anthropic(provider, &prompt, max_tokens).await?
            }
        };
        let verdict = parse_verdict(&text)?;

        let result = AiReviewResult {
            submission_id: submission.id,
            score: verdict.score,
            recommendation: verdict.recommendation,
            summary: verdict.summary,
            strengths: verdict.strengths,
            weaknesses: verdict.weaknesses,
            suggestions: verdict.suggestions,
            model: provider.model.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }
}
