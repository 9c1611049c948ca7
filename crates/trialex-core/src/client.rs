//! Client for the hosted extraction model (Anthropic Messages API).

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

/// Fixed instruction describing the twelve-field schema.
pub const SYSTEM_PROMPT: &str = r#"You are a research paper data extractor. Your task is to extract specific information and return it ONLY as a JSON object, with no additional text or explanation.

Extract exactly these fields:
1. First author last name
2. Publication year
3. Journal name
4. Country of corresponding author
5. Funding source (ONLY use: Industry/Non-industry/Combined/No funding/Not reported)
6. Author financial conflicts of interest
7. Main eligibility criteria
8. Country(ies) of participants
9. N included
10. N (%) females/women
11. Trial arm names
12. Group descriptions

Return ONLY this JSON structure with no other text:
{
    "first_author": "",
    "pub_year": "",
    "journal": "",
    "corresponding_author_country": "",
    "funding_source": "",
    "conflicts": "",
    "eligibility_criteria": "",
    "participant_countries": "",
    "n_included": "",
    "females_percentage": "",
    "trial_arms": "",
    "group_descriptions": ""
}

If you cannot find information for a field, use "Not reported" as the value. Do not include any explanatory text outside the JSON structure."#;

/// Output token cap for every extraction request.
pub const MAX_TOKENS: u32 = 1500;

/// Sampling temperature for every extraction request.
pub const TEMPERATURE: f32 = 0.0;

/// Documents are cut to this many characters before sending.
pub const MAX_INPUT_CHARS: usize = 50_000;

/// Prefix of the user message; the (truncated) document text follows it.
pub const USER_PREFIX: &str =
    "Extract the requested information from this paper and return it ONLY as a JSON object: ";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to decode API response: {0}")]
    Decode(String),
    #[error("API response contained no text block")]
    EmptyResponse,
}

impl ModelError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::Api { status: 429, .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ModelError::Api { status: 401 | 403, .. })
    }
}

/// A model that turns a system instruction plus user content into text.
pub trait ModelBackend {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Send one non-streaming request and return the text of the response.
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + 'a>>;
}

/// Keep at most `max_chars` characters of `text`.
///
/// Returns the prefix and whether anything was cut. Counts Unicode scalar
/// values, so the cut never splits a character.
pub fn truncate_document(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Build the user message for a document.
pub fn user_message(document: &str, max_chars: usize) -> String {
    let (prefix, _) = truncate_document(document, max_chars);
    format!("{USER_PREFIX}{prefix}")
}

#[derive(Debug, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Request body for `POST /v1/messages`.
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: &'a str,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    api_version: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        }
    }

    /// Build the request body without sending it.
    pub fn build_request<'a>(&'a self, system: &'a str, user: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        }
    }

    async fn send(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let request = self.build_request(system, user);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| ModelError::Decode(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "model usage"
            );
        }

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or(ModelError::EmptyResponse)
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ModelBackend for AnthropicClient {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + 'a>> {
        Box::pin(self.send(system, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_text_is_untouched() {
        let (out, cut) = truncate_document("abc", 10);
        assert_eq!(out, "abc");
        assert!(!cut);
    }

    #[test]
    fn truncate_exact_length_is_not_a_cut() {
        let (out, cut) = truncate_document("abcde", 5);
        assert_eq!(out, "abcde");
        assert!(!cut);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ééééé";
        let (out, cut) = truncate_document(text, 3);
        assert_eq!(out, "ééé");
        assert!(cut);
    }

    #[test]
    fn request_payload_never_contains_text_past_limit() {
        let config = Config::default();
        let client = AnthropicClient::new("key", &config);
        let document = format!("{}{}", "a".repeat(50_000), "TAIL_MARKER");
        let user = user_message(&document, MAX_INPUT_CHARS);
        let body = serde_json::to_string(&client.build_request(SYSTEM_PROMPT, &user)).unwrap();

        assert!(!body.contains("TAIL_MARKER"));
        assert!(body.contains(&"a".repeat(50_000)));
        assert!(body.contains("\"temperature\":0.0"));
        assert!(body.contains("\"max_tokens\":1500"));
        assert!(body.contains("\"role\":\"user\""));
    }

    #[test]
    fn user_message_starts_with_fixed_prefix() {
        let msg = user_message("paper text", 50_000);
        assert_eq!(
            msg,
            "Extract the requested information from this paper and return it ONLY as a JSON object: paper text"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = AnthropicClient::new("sk-secret", &Config::default());
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn error_classification() {
        let rate = ModelError::Api {
            status: 429,
            body: String::new(),
        };
        assert!(rate.is_rate_limited());
        assert!(!rate.is_auth());
        let auth = ModelError::Api {
            status: 401,
            body: String::new(),
        };
        assert!(auth.is_auth());
    }
}
