use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::types::{QaResponse, QaState, QA_HISTORY_LIMIT};

const SYSTEM_PROMPT: &str = "You answer questions about the source files and excerpts provided below. \
Cite file paths when you rely on them. If the context does not contain the answer, say so.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaAnswer {
    pub answer: String,
    pub exchange_id: String,
    pub channel: String,
}

#[async_trait]
pub trait QaBackend: Send + Sync {
    async fn submit(&self, context: &str, prompt: &str, channel: &str) -> Result<QaAnswer>;
}

/// QA over an OpenAI-compatible chat completions endpoint. The channel picks the model.
pub struct QaClient {
    client: reqwest::Client,
    base_url: String,
    default_channel: String,
    api_key: Option<String>,
}

impl QaClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let default_channel =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-8b".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            default_channel,
            api_key,
        })
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        completions_endpoint(&self.base_url)
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

fn parse_completion(json: &serde_json::Value, channel: &str) -> Result<QaAnswer> {
    if let Some(message) = json["error"]["message"].as_str() {
        bail!("QA backend error: {}", message);
    }
    let answer = json["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .context("QA response has no answer")?
        .to_string();
    Ok(QaAnswer {
        answer,
        exchange_id: json["id"].as_str().unwrap_or_default().to_string(),
        channel: json["model"].as_str().unwrap_or(channel).to_string(),
    })
}

#[async_trait]
impl QaBackend for QaClient {
    async fn submit(&self, context: &str, prompt: &str, channel: &str) -> Result<QaAnswer> {
        let channel = if channel.is_empty() {
            self.default_channel.as_str()
        } else {
            channel
        };
        let messages = vec![
            Message {
                role: "system".to_string(),
                content: format!("{}\n\n{}", SYSTEM_PROMPT, context),
            },
            Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ];
        let body = serde_json::json!({
            "model": channel,
            "messages": messages,
            "temperature": 0.2,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("QA request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read QA response")?;
        let json: serde_json::Value = match serde_json::from_str(&text) {
            Ok(json) => json,
            Err(_) if !status.is_success() => bail!("QA backend returned {}", status),
            Err(e) => return Err(e).context("Failed to parse QA JSON"),
        };
        if !status.is_success() && json["error"].is_null() {
            bail!("QA backend returned {}", status);
        }
        parse_completion(&json, channel)
    }
}

/// Mark a submission as in flight and remember its prompt.
pub fn begin_submission(qa: &mut QaState, prompt: &str, channel: &str) {
    qa.prompt = prompt.to_string();
    qa.channel = channel.to_string();
    qa.is_submitting = true;
    if qa.history.first().map(String::as_str) != Some(prompt) {
        qa.history.insert(0, prompt.to_string());
        qa.history.truncate(QA_HISTORY_LIMIT);
    }
}

/// Store the outcome. Errors are kept verbatim for display.
pub fn record_exchange(qa: &mut QaState, result: &Result<QaAnswer>) {
    qa.is_submitting = false;
    qa.last_response = Some(match result {
        Ok(answer) => QaResponse {
            answer: Some(answer.answer.clone()),
            exchange_id: Some(answer.exchange_id.clone()),
            channel: Some(answer.channel.clone()),
            error: None,
        },
        Err(e) => QaResponse {
            error: Some(format!("{:#}", e)),
            ..Default::default()
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            completions_endpoint("http://localhost:1234/v1/"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("https://api.example.com"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("https://x/v1/chat/completions"),
            "https://x/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "id": "chatcmpl-42",
            "model": "qwen/qwen3-8b",
            "choices": [{"message": {"role": "assistant", "content": "It parses."}}]
        });
        let answer = parse_completion(&json, "fallback").unwrap();
        assert_eq!(answer.answer, "It parses.");
        assert_eq!(answer.exchange_id, "chatcmpl-42");
        assert_eq!(answer.channel, "qwen/qwen3-8b");

        let err = serde_json::json!({"error": {"message": "model not loaded"}});
        assert!(parse_completion(&err, "x")
            .unwrap_err()
            .to_string()
            .contains("model not loaded"));
        assert!(parse_completion(&serde_json::json!({"choices": []}), "x").is_err());
    }

    #[test]
    fn test_history_is_capped_newest_first() {
        let mut qa = QaState::default();
        for i in 0..25 {
            begin_submission(&mut qa, &format!("q{}", i), "main");
        }
        begin_submission(&mut qa, "q24", "main");
        assert_eq!(qa.history.len(), QA_HISTORY_LIMIT);
        assert_eq!(qa.history[0], "q24");
        assert_eq!(qa.history[1], "q23");
        assert_eq!(qa.history.last().unwrap(), "q5");
        assert!(qa.is_submitting);
    }

    #[test]
    fn test_record_exchange_success_and_error() {
        let mut qa = QaState::default();
        begin_submission(&mut qa, "why?", "main");
        record_exchange(
            &mut qa,
            &Ok(QaAnswer {
                answer: "because".to_string(),
                exchange_id: "ex1".to_string(),
                channel: "main".to_string(),
            }),
        );
        assert!(!qa.is_submitting);
        assert_eq!(qa.last_response.as_ref().unwrap().answer.as_deref(), Some("because"));

        record_exchange(&mut qa, &Err(anyhow::anyhow!("backend down")));
        let last = qa.last_response.unwrap();
        assert_eq!(last.error.as_deref(), Some("backend down"));
        assert!(last.answer.is_none());
    }
}
