//! Command-line counterpart of the browser download button: fetch the grading
//! text for a session, then turn it into a PDF through the render endpoint.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{document::DEFAULT_TITLE, payload::RenderPayload};

/// Logo the report download button has always sent.
pub const DEFAULT_LOGO_URL: &str = "https://images.squarespace-cdn.com/content/v1/647f7a4eb3767045e27d868d/455997f1-844a-4426-86dc-9973fac5e8e6/New+Logo.png?format=1500w";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Missing sessionId")]
    MissingSessionId,
    #[error("Grading text was empty.")]
    EmptyGrading,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Service(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub grading_base: Url,
    pub pdf_service: Url,
    pub title: String,
    pub logo_url: String,
}

impl ClientConfig {
    pub fn new(grading_base: Url, pdf_service: Url) -> Self {
        Self {
            grading_base,
            pdf_service,
            title: DEFAULT_TITLE.to_string(),
            logo_url: DEFAULT_LOGO_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradingResponse {
    #[serde(default)]
    grading_text: Option<String>,
}

#[derive(Deserialize)]
struct ServiceError {
    error: Option<String>,
}

/// A rendered report ready to be written out.
#[derive(Debug)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct ReportClient {
    http: Client,
    config: ClientConfig,
}

impl ReportClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn grading_url(&self, session_id: &str) -> Result<Url, ClientError> {
        let mut url = self.config.grading_base.join("api/get-grading")?;
        url.query_pairs_mut()
            .append_pair("sessionId", session_id)
            .append_pair("force", "1");
        Ok(url)
    }

    pub async fn fetch_grading_text(&self, session_id: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .get(self.grading_url(session_id)?)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let grading: GradingResponse = response.json().await?;
        let text = grading.grading_text.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ClientError::EmptyGrading);
        }
        Ok(text)
    }

    pub async fn render_pdf(&self, payload: &RenderPayload) -> Result<Vec<u8>, ClientError> {
        let response = self
            .http
            .post(self.config.pdf_service.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ServiceError>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("PDF service error (HTTP {})", status.as_u16()));
            return Err(ClientError::Service(message));
        }

        Ok(response.bytes().await?.to_vec())
    }

    pub async fn download(&self, session_id: &str) -> Result<Download, ClientError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ClientError::MissingSessionId);
        }

        let filename = format!("grading-{session_id}.pdf");
        let markdown = self.fetch_grading_text(session_id).await?;
        let payload = RenderPayload {
            title: Some(self.config.title.clone()),
            logo_url: Some(self.config.logo_url.clone()).filter(|url| !url.is_empty()),
            filename: Some(filename.clone()),
            markdown: Some(markdown),
            html: None,
        };

        let bytes = self.render_pdf(&payload).await?;
        Ok(Download { filename, bytes })
    }
}
