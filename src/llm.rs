//! OpenAI-compatible chat completion client.
//!
//! The model is only used to turn finished evidence paths into questions and
//! answers; nothing in scoring or walking depends on it. Requests are single
//! shot: a failed call is reported to the caller, never retried here.

use std::time::Duration;

use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Something that completes a single-turn prompt.
pub trait ChatModel: Sync {
    fn complete(&self, prompt: &str, temperature: f64) -> Result<String, LlmError>;
}

/// Client for a `/chat/completions` endpoint (vLLM, llama.cpp server, OpenAI).
pub struct OpenAiClient {
    config: LlmConfig,
    agent: ureq::Agent,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false,
        });

        let resp = self
            .agent
            .post(&self.url())
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => LlmError::Status {
                    code,
                    body: resp.into_string().unwrap_or_default(),
                },
                other => LlmError::RequestFailed {
                    message: other.to_string(),
                },
            })?;

        let json: Value = resp.into_json().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
        parse_completion(&json)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub fn parse_completion(json: &Value) -> Result<String, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError {
            message: "missing 'choices[0].message.content' field".into(),
        })?
        .trim();
    if content.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(content.to_string())
}
