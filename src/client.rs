use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::export::WatermarkRequest;

/// Hosted backend used when nothing else is configured.
pub const PROD_BACKEND: &str = "https://online-tool-backend.onrender.com";
/// Backend assumed when running against a local development server.
pub const LOCAL_BACKEND: &str = "http://localhost:3000";

const WATERMARK_PATH: &str = "/api/watermark";

/// Attempts beyond the first request.
const EXPORT_RETRIES: u32 = 2;
/// Base backoff; the wait grows linearly with the attempt number.
const BACKOFF_STEP: Duration = Duration::from_millis(400);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Pick the backend base URL. An explicit override wins, then the local
/// server when requested, then the hosted backend. Trailing slashes are
/// trimmed so path joins stay predictable.
pub fn resolve_base_url(override_url: Option<&str>, local: bool) -> Result<String> {
    if let Some(raw) = override_url {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("backend override is empty");
        }
        url::Url::parse(trimmed)
            .with_context(|| format!("invalid backend URL '{trimmed}'"))?;
        return Ok(trimmed.to_string());
    }
    Ok(if local { LOCAL_BACKEND } else { PROD_BACKEND }.to_string())
}

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_STEP * (attempt + 1)
}

/// The converted image returned by the backend.
#[derive(Debug)]
pub struct ExportedFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct BackendClient {
    base_url: String,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the watermark request, retrying transient failures with a short
    /// linear backoff. Client errors from the backend fail immediately with
    /// its diagnostic headers included.
    pub fn export(&self, request: &WatermarkRequest) -> Result<ExportedFile> {
        let endpoint = format!("{}{}", self.base_url, WATERMARK_PATH);
        let mut last_err = None;

        for attempt in 0..=EXPORT_RETRIES {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(attempt - 1));
                eprintln!("retrying export (attempt {} of {})", attempt + 1, EXPORT_RETRIES + 1);
            }
            match self.try_export(&endpoint, request) {
                Ok(done) => return Ok(done),
                Err(err) if err.retryable => last_err = Some(err.error),
                Err(err) => return Err(err.error),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("export failed")))
            .with_context(|| format!("export to {endpoint} failed after {} attempts", EXPORT_RETRIES + 1))
    }

    fn try_export(&self, endpoint: &str, request: &WatermarkRequest) -> Result<ExportedFile, ExportAttemptError> {
        let response = self
            .http
            .post(endpoint)
            .json(request)
            .send()
            .map_err(|err| ExportAttemptError {
                retryable: true,
                error: anyhow::Error::new(err).context("request could not be sent"),
            })?;

        let status = response.status();
        if status.is_success() {
            let filename = response
                .headers()
                .get(reqwest::header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_disposition);
            let bytes = response
                .bytes()
                .map_err(|err| ExportAttemptError {
                    retryable: true,
                    error: anyhow::Error::new(err).context("failed to read response body"),
                })?
                .to_vec();
            return Ok(ExportedFile { filename, bytes });
        }

        // The backend annotates failures with diagnostic headers; surface
        // them so a converter-side rejection is explainable.
        let mut detail = String::new();
        for header in ["x-diag", "allow"] {
            if let Some(value) = response.headers().get(header).and_then(|v| v.to_str().ok()) {
                detail.push_str(&format!(" [{header}: {value}]"));
            }
        }
        let body = response.text().unwrap_or_default();
        let snippet = body.chars().take(200).collect::<String>();

        Err(ExportAttemptError {
            retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            error: anyhow::anyhow!("backend returned {status}{detail}: {snippet}"),
        })
    }
}

struct ExportAttemptError {
    retryable: bool,
    error: anyhow::Error,
}

/// Pull the suggested filename out of a Content-Disposition header, with or
/// without quotes around the value.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let (_, after) = header.split_once("filename=")?;
    let after = after.trim();
    let name = if let Some(stripped) = after.strip_prefix('"') {
        stripped.split('"').next()?
    } else {
        after.split(';').next()?.trim()
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
