use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::retry::{is_retryable_http_error, is_retryable_network_error, Permanent};
use super::Advisor;
use crate::ledger::LedgerRecord;
use crate::outcome::{symbols, Outcome, Side};
use crate::session::Feedback;

const SYSTEM_PROMPT: &str = "You analyse baccarat shoes. Reply with exactly one word: Player or Banker.";

/// Chat-completions client for the reasoning service.
pub struct ChatAdvisor {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatAdvisor {
    pub fn new(base: &str, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let mut base = base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .with_context(|| format!("bad advisor base url {}", base))?;
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint,
            api_key,
            model,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// User message: the shoe so far plus how earlier calls turned out.
pub fn build_prompt(history: &[Outcome], performance: &[LedgerRecord]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Results so far, oldest first (P = Player, B = Banker, T = Tie):\n");
    if history.is_empty() {
        prompt.push_str("(none yet)\n");
    } else {
        prompt.push_str(&symbols(history));
        prompt.push('\n');
    }

    let wins = performance.iter().filter(|r| r.feedback == Feedback::Win).count();
    prompt.push_str(&format!(
        "\nYour earlier recommendations ({} of {} correct):\n",
        wins,
        performance.len()
    ));
    if performance.is_empty() {
        prompt.push_str("(none yet)\n");
    }
    for record in performance {
        prompt.push_str("- ");
        prompt.push_str(&record.describe());
        prompt.push('\n');
    }
    prompt.push_str("\nTake your own track record into account. Which side wins the next hand?");
    prompt
}

fn parse_reply(body: &str) -> Result<Side> {
    let resp: ChatResponse = serde_json::from_str(body).context("malformed advisor response")?;
    let content = resp
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or_else(|| anyhow!("advisor response has no choices"))?;
    Side::from_reply(content).ok_or_else(|| anyhow!("advisor reply names no side: {:?}", content))
}

#[async_trait]
impl Advisor for ChatAdvisor {
    async fn recommend(&self, history: &[Outcome], performance: &[LedgerRecord]) -> Result<Side> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system".into(), content: SYSTEM_PROMPT.into() },
                ChatMessage { role: "user".into(), content: build_prompt(history, performance) },
            ],
            temperature: 0.2,
            max_tokens: 8,
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if is_retryable_network_error(&e) {
                    anyhow!(e)
                } else {
                    anyhow::Error::new(Permanent(e.to_string()))
                }
            })?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let msg = format!("advisor http {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
            if is_retryable_http_error(status.as_u16()) {
                return Err(anyhow!(msg));
            }
            return Err(anyhow::Error::new(Permanent(msg)));
        }
        parse_reply(&body)
    }
}
