
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::GenerationConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions about PDF documents. \
Use the provided context to answer the user's question accurately and concisely. \
If the answer isn't in the context, say so. Always cite page numbers when referencing information.";

/// A source of generated answers grounded in retrieved context.
pub trait AnswerProvider: Send + Sync {
    fn generate(&self, question: &str, context: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// HTTP client for a `generateContent`-style language model endpoint.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    base_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

impl GenerationClient {
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid generation provider URL: {}", config.base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            agent,
        })
    }

    fn request_answer(&self, prompt: String) -> Result<String> {
        let mut url = self
            .base_url
            .join(&format!("/v1beta/models/{}:generateContent", self.model))
            .context("Failed to build generation URL")?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("Generation request failed: {e}"))?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        extract_answer(response)
    }
}

impl AnswerProvider for GenerationClient {
    #[inline]
    fn generate(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        debug!("Requesting answer, prompt length: {}", prompt.len());
        self.request_answer(prompt)
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\nContext from the document:\n{context}\n\nUser Question:\n{question}")
}

fn extract_answer(response: GenerateResponse) -> Result<String> {
    let text = response
        .candidates
        .and_then(|mut candidates| {
            if candidates.is_empty() {
                None
            } else {
                candidates.swap_remove(0).content
            }
        })
        .and_then(|content| content.parts)
        .and_then(|mut parts| {
            if parts.is_empty() {
                None
            } else {
                parts.swap_remove(0).text
            }
        });

    match text {
        Some(answer) if !answer.is_empty() => Ok(answer),
        _ => bail!("Generation response contained no answer text"),
    }
}
