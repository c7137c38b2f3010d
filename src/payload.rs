use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{self, DEFAULT_TITLE};

pub const DEFAULT_FILENAME: &str = "consultation-feedback.pdf";
pub const MAX_MARKDOWN_CHARS: usize = 200_000;
pub const MAX_HTML_CHARS: usize = 400_000;

/// JSON body accepted by the render endpoint.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Caller-trusted markup, used verbatim.
    Html(String),
    Markdown(String),
}

impl Content {
    pub fn into_body_html(self) -> String {
        match self {
            Content::Html(html) => html,
            Content::Markdown(markdown) => document::markdown_to_body(&markdown),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub title: String,
    pub logo_url: String,
    pub filename: String,
    pub content: Content,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Missing 'html' or 'markdown' in request body")]
    MissingContent,
    #[error("Payload too large: {field} exceeds {limit} characters")]
    TooLarge { field: &'static str, limit: usize },
    #[error("Invalid JSON body: {0}")]
    Malformed(String),
}

impl RenderPayload {
    pub fn from_json(body: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(body).map_err(|err| PayloadError::Malformed(err.to_string()))
    }

    /// Applies defaults and per-field size limits. Non-empty `html` wins over
    /// `markdown`, and only the field actually used is size-checked.
    pub fn validate(self) -> Result<RenderRequest, PayloadError> {
        let content = match (non_empty(self.html), non_empty(self.markdown)) {
            (Some(html), _) => {
                check_len("html", &html, MAX_HTML_CHARS)?;
                Content::Html(html)
            }
            (None, Some(markdown)) => {
                check_len("markdown", &markdown, MAX_MARKDOWN_CHARS)?;
                Content::Markdown(markdown)
            }
            (None, None) => return Err(PayloadError::MissingContent),
        };

        Ok(RenderRequest {
            title: non_empty(self.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            logo_url: non_empty(self.logo_url).unwrap_or_default(),
            filename: non_empty(self.filename)
                .map(|name| sanitize_filename(&name))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            content,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn check_len(field: &'static str, value: &str, limit: usize) -> Result<(), PayloadError> {
    // Cheap byte check first; a string never has more chars than bytes.
    if value.len() > limit && value.chars().count() > limit {
        return Err(PayloadError::TooLarge { field, limit });
    }
    Ok(())
}

/// Drops characters that could break out of a header value or name a path.
/// Non-ASCII text is kept; see [`RenderRequest::content_disposition`].
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_control() && !matches!(ch, '"' | '\\' | '/'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect()
}

impl RenderRequest {
    /// `attachment` disposition for the requested filename. Non-ASCII names get
    /// an ASCII `filename` plus the exact name as RFC 6266 `filename*`.
    pub fn content_disposition(&self) -> String {
        let fallback = ascii_fallback(&self.filename);
        if fallback == self.filename {
            format!("attachment; filename=\"{fallback}\"")
        } else {
            format!(
                "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
                urlencoding::encode(&self.filename)
            )
        }
    }
}
