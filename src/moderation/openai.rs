//! `OpenAI` moderation endpoint client

use super::{ModerationError, Moderator, Verdict};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MODERATION_MODEL: &str = "omni-moderation-latest";

pub struct OpenAiModerator {
    client: Client,
    api_key: String,
    url: String,
}

impl OpenAiModerator {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ModerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ModerationError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: format!("{}/moderations", base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    model: &'static str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
}

fn verdict_from(response: ModerationResponse) -> Result<Verdict, ModerationError> {
    let first = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ModerationError::Malformed("empty results".to_string()))?;
    Ok(if first.flagged {
        Verdict::flagged(None)
    } else {
        Verdict::clear()
    })
}

#[async_trait]
impl Moderator for OpenAiModerator {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ModerationRequest {
                model: MODERATION_MODEL,
                input: text,
            })
            .send()
            .await
            .map_err(|e| ModerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModerationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::Malformed(e.to_string()))?;
        verdict_from(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_reads_first_result() {
        let body: ModerationResponse = serde_json::from_str(
            r#"{"id":"modr-1","model":"omni-moderation-latest","results":[{"flagged":true,"categories":{}}]}"#,
        )
        .unwrap();
        assert_eq!(verdict_from(body).unwrap(), Verdict::flagged(None));
    }

    #[test]
    fn test_empty_results_are_malformed() {
        let body: ModerationResponse = serde_json::from_str(r#"{"results":[]}"#).unwrap();
        assert!(matches!(
            verdict_from(body),
            Err(ModerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_url_joins_base() {
        let moderator = OpenAiModerator::new("key", "https://api.example.test/v1/").unwrap();
        assert_eq!(moderator.url, "https://api.example.test/v1/moderations");
    }
}
