use anyhow::{anyhow, bail, Context, Result};
use bakeoff_core::GenerationSettings;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Sent ahead of every prompt.
pub const SYSTEM_PROMPT: &str = "You are TheProdBot (Research Edition), an autonomous agent. \
NEVER ask questions. Use bounded assumptions and proceed. \
Every answer must include either a visible 'Reasoning (text)' section \
OR a 'reasoning' field in JSON.";

/// One model reply plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub latency: Duration,
    pub total_tokens: Option<u64>,
}

/// Anything that can answer a single prompt for a named model.
pub trait ModelClient {
    fn complete(&self, model: &str, prompt: &str) -> Result<Completion>;
}

/// Reads the API key, treating blank values as unset.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// Blocking client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    settings: GenerationSettings,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, settings: GenerationSettings) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            settings,
        })
    }

    pub fn from_env(settings: GenerationSettings) -> Result<Self> {
        let api_key = api_key_from_env()
            .ok_or_else(|| anyhow!("missing {}; export it before running prompts", API_KEY_ENV))?;
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url, settings)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl ModelClient for OpenAiClient {
    fn complete(&self, model: &str, prompt: &str) -> Result<Completion> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let started = Instant::now();
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("request to {} failed", self.endpoint()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("model '{}' returned HTTP {}: {}", model, status, body.trim());
        }
        let parsed: ChatResponse = resp
            .json()
            .with_context(|| format!("model '{}' returned an unreadable response", model))?;
        let latency = started.elapsed();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model '{}' returned no choices", model))?
            .message
            .content
            .unwrap_or_default();
        Ok(Completion {
            content,
            latency,
            total_tokens: parsed.usage.and_then(|u| u.total_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenAiClient::new(
            "sk-test".to_string(),
            "http://localhost:1234/v1/".to_string(),
            GenerationSettings::default(),
        )
        .expect("client");
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn request_body_carries_system_prompt_and_settings() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: "Estimate TAM",
                },
            ],
            temperature: 0.2,
            max_tokens: 1000,
        };
        let v = serde_json::to_value(&request).expect("serialize");
        assert_eq!(v["messages"][0]["role"], "system");
        assert!(v["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .contains("NEVER ask questions"));
        assert_eq!(v["messages"][1]["content"], "Estimate TAM");
        assert_eq!(v["max_tokens"], 1000);
    }

    #[test]
    fn response_without_usage_still_parses() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).expect("parse");
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }
}
