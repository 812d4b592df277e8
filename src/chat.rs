use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::State;
use crate::error::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer questions strictly based on the \
provided text fragments. Do not add any external information or assumptions. If the answer is \
not contained in the fragments, respond that you don't know.";

/// Answer-synthesis capability: turns retrieved context fragments and a
/// question into an answer string. Callers only invoke it with a non-empty
/// context; an empty context is handled upstream as the explicit
/// no-relevant-fragments outcome.
pub trait AnswerProvider {
    fn synthesize(&self, context: &[String], question: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

/// Chat-completions client used for answer synthesis.
pub struct HttpAnswerProvider {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl HttpAnswerProvider {
    pub fn new(state: &State) -> Result<Self> {
        Self::with_endpoint(
            &state.chat_endpoint,
            &state.chat_model,
            state.max_answer_tokens,
            Duration::from_secs(state.request_timeout_secs),
        )
    }

    pub fn with_endpoint(
        endpoint: &str,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Gateway(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }
}

impl AnswerProvider for HttpAnswerProvider {
    fn synthesize(&self, context: &[String], question: &str) -> Result<String> {
        let joined = context.join("\n\n---\n\n");
        let user_prompt = format!(
            "Context:\n{}\n\nQuestion: {}\nAnswer concisely:",
            joined, question
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| Error::Gateway(format!("chat request failed: {}", err)))?
            .error_for_status()
            .map_err(|err| Error::Gateway(format!("chat endpoint rejected the request: {}", err)))?;

        let body: ChatResponse = response
            .json()
            .map_err(|err| Error::Gateway(format!("malformed chat response: {}", err)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Gateway("chat response contained no choices".to_string()))?;
        Ok(choice.message.content.trim().to_string())
    }
}
