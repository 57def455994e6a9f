#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ExtractionConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// A source of extracted text for a binary document.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, content: &[u8], file_name: &str) -> Result<String>;
}

/// Clock seam for the poll loop, so tests run without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the OS clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdSleeper;

impl Sleeper for StdSleeper {
    #[inline]
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shape of an extraction-service upload response, resolved exactly once at
/// this boundary and never re-sniffed downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    /// The service returned the extracted content inline.
    Direct(String),
    /// The service returned per-page content.
    Pages(Vec<String>),
    /// The service queued an asynchronous parse job.
    Job(String),
}

/// Observed state of an asynchronous parse job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
    markdown: Option<String>,
    text: Option<String>,
    pages: Option<Vec<PagePayload>>,
}

#[derive(Debug, Deserialize)]
struct PagePayload {
    text: Option<String>,
    markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResultResponse {
    markdown: String,
}

/// HTTP client for the document parsing service.
///
/// Uploads a file and resolves the response into an [`ExtractionResult`];
/// asynchronous jobs are polled on a fixed interval until they succeed,
/// fail, or exhaust the attempt budget.
#[derive(Clone)]
pub struct ParseClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
    poll_interval: Duration,
    max_poll_attempts: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl ParseClient {
    #[inline]
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid extraction service URL: {}", config.base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            agent,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_attempts: config.max_poll_attempts,
            sleeper: Arc::new(StdSleeper),
        })
    }

    #[inline]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Upload a file and classify the service's response.
    fn upload(&self, content: &[u8], file_name: &str) -> Result<ExtractionResult> {
        let mut url = self
            .base_url
            .join("/api/v1/parsing/upload")
            .context("Failed to build upload URL")?;
        url.query_pairs_mut().append_pair("file_name", file_name);

        info!(
            "Uploading {} ({} bytes) for text extraction",
            file_name,
            content.len()
        );

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .send(content)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("Extraction upload failed: {e}"))?;

        let response: UploadResponse = serde_json::from_str(&response_text)
            .context("Failed to parse extraction upload response")?;

        classify_upload(response)
    }

    /// Poll a parse job until it reaches a terminal state.
    ///
    /// A transient request failure is tolerated and retried on the next
    /// interval; exhausting all attempts is a terminal timeout.
    fn poll_job(&self, job_id: &str) -> Result<String> {
        let status_url = self
            .base_url
            .join(&format!("/api/v1/parsing/job/{job_id}"))
            .context("Failed to build job status URL")?;

        for attempt in 1..=self.max_poll_attempts {
            debug!(
                "Polling attempt {}/{} for job {}",
                attempt, self.max_poll_attempts, job_id
            );

            let status_text = match self
                .agent
                .get(status_url.as_str())
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
            {
                Ok(text) => text,
                Err(e) => {
                    warn!("Poll attempt {attempt} failed to get job status: {e}");
                    self.sleeper.sleep(self.poll_interval);
                    continue;
                }
            };

            let status: JobStatusResponse = serde_json::from_str(&status_text)
                .context("Failed to parse job status response")?;

            match job_state(&status) {
                JobState::Succeeded => {
                    info!("Parse job {job_id} complete, fetching result");
                    return self.fetch_result(job_id);
                }
                JobState::Failed(message) => {
                    bail!("Parsing job failed: {message}");
                }
                JobState::Pending => {
                    self.sleeper.sleep(self.poll_interval);
                }
            }
        }

        bail!(
            "Parsing timed out after {} attempts",
            self.max_poll_attempts
        )
    }

    fn fetch_result(&self, job_id: &str) -> Result<String> {
        let result_url = self
            .base_url
            .join(&format!("/api/v1/parsing/job/{job_id}/result/markdown"))
            .context("Failed to build job result URL")?;

        let response_text = self
            .agent
            .get(result_url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("Failed to fetch job result: {e}"))?;

        let result: JobResultResponse =
            serde_json::from_str(&response_text).context("Failed to parse job result response")?;

        debug!("Fetched parse result, length: {}", result.markdown.len());
        Ok(result.markdown)
    }

    fn resolve(&self, result: ExtractionResult) -> Result<String> {
        match result {
            ExtractionResult::Direct(text) => Ok(text),
            ExtractionResult::Pages(pages) => Ok(pages.join("\n\n")),
            ExtractionResult::Job(job_id) => self.poll_job(&job_id),
        }
    }
}

impl TextExtractor for ParseClient {
    #[inline]
    fn extract(&self, content: &[u8], file_name: &str) -> Result<String> {
        let result = self.upload(content, file_name)?;
        self.resolve(result)
    }
}

fn classify_upload(response: UploadResponse) -> Result<ExtractionResult> {
    if let Some(id) = response.id {
        debug!("Extraction service queued parse job {id}");
        return Ok(ExtractionResult::Job(id));
    }
    if let Some(markdown) = response.markdown {
        return Ok(ExtractionResult::Direct(markdown));
    }
    if let Some(text) = response.text {
        return Ok(ExtractionResult::Direct(text));
    }
    if let Some(pages) = response.pages {
        let pages = pages
            .into_iter()
            .map(|page| page.text.or(page.markdown).unwrap_or_default())
            .collect();
        return Ok(ExtractionResult::Pages(pages));
    }
    bail!("No content found in extraction service response")
}

fn job_state(status: &JobStatusResponse) -> JobState {
    match status.status.as_str() {
        "SUCCESS" => JobState::Succeeded,
        "FAILED" | "ERROR" => JobState::Failed(
            status
                .message
                .clone()
                .unwrap_or_else(|| "Unknown extraction service error".to_string()),
        ),
        _ => JobState::Pending,
    }
}
