use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use dotenv::dotenv;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
    payload::{MAX_HTML_CHARS, MAX_MARKDOWN_CHARS},
    pipeline::WaitPolicy,
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ALLOWED_ORIGINS: &str = "https://www.scarevision.ai,https://scarevision.ai";
const DEFAULT_LOAD_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_SETTLE_MS: u64 = 250;
const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 20_000;

/// Longest JSON spelling of one char: a `\uXXXX\uXXXX` surrogate pair.
const JSON_ESCAPE_BYTES_PER_CHAR: usize = 12;
/// Room for `title`, `logoUrl`, `filename` and the JSON framing.
const METADATA_BYTES: usize = 64 * 1024;
/// Byte ceiling that still admits both content fields at their char limits
/// when every char arrives escaped.
pub const DEFAULT_MAX_BODY_BYTES: usize =
    (MAX_HTML_CHARS + MAX_MARKDOWN_CHARS) * JSON_ESCAPE_BYTES_PER_CHAR + METADATA_BYTES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Browser launch settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChromeSettings {
    pub executable: Option<PathBuf>,
    pub library_path: Option<String>,
    pub no_sandbox: bool,
    pub launch_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub wait: WaitPolicy,
    pub load_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub log_format: LogFormat,
    pub render: RenderSettings,
    pub chrome: ChromeSettings,
}

impl AppConfig {
    /// Reads `.env` (if any) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;
        let addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::invalid("HOST", err.to_string()))?;

        let allowed_origins = parse_origins(
            &var("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
        )?;

        let settle = Duration::from_millis(parse_or(
            var("RENDER_SETTLE_MS"),
            "RENDER_SETTLE_MS",
            DEFAULT_SETTLE_MS,
        )?);
        let wait = match var("RENDER_WAIT") {
            None => WaitPolicy::NetworkIdle,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "networkidle" | "network-idle" => WaitPolicy::NetworkIdle,
                "load" => WaitPolicy::Load { settle },
                other => {
                    return Err(ConfigError::invalid(
                        "RENDER_WAIT",
                        format!("expected `networkidle` or `load`, got `{other}`"),
                    ));
                }
            },
        };
        let load_timeout = Duration::from_millis(parse_or(
            var("RENDER_LOAD_TIMEOUT_MS"),
            "RENDER_LOAD_TIMEOUT_MS",
            DEFAULT_LOAD_TIMEOUT_MS,
        )?);
        if load_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "RENDER_LOAD_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }

        let launch_timeout = Duration::from_millis(parse_or(
            var("RENDER_LAUNCH_TIMEOUT_MS"),
            "RENDER_LAUNCH_TIMEOUT_MS",
            DEFAULT_LAUNCH_TIMEOUT_MS,
        )?);

        let no_sandbox = match var("CHROME_NO_SANDBOX") {
            None => false,
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid("CHROME_NO_SANDBOX", raw.clone()))?,
        };

        let log_format = match var("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => raw
                .parse()
                .map_err(|err: String| ConfigError::invalid("LOG_FORMAT", err))?,
        };

        Ok(AppConfig {
            addr,
            allowed_origins,
            max_body_bytes: parse_or(var("MAX_BODY_BYTES"), "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            log_format,
            render: RenderSettings { wait, load_timeout },
            chrome: ChromeSettings {
                executable: var("CHROME_EXECUTABLE").map(PathBuf::from),
                library_path: var("CHROME_LIBRARY_PATH"),
                no_sandbox,
                launch_timeout,
            },
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(key, err.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Normalises each entry to its serialized origin (`scheme://host[:port]`).
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let url = Url::parse(entry)
                .map_err(|err| ConfigError::invalid("ALLOWED_ORIGINS", format!("{entry}: {err}")))?;
            let origin = url.origin();
            if !origin.is_tuple() {
                return Err(ConfigError::invalid(
                    "ALLOWED_ORIGINS",
                    format!("{entry} has no usable origin"),
                ));
            }
            Ok(origin.ascii_serialization())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).expect("defaults are valid");

        assert_eq!(config.addr.port(), 3000);
        assert_eq!(
            config.allowed_origins,
            vec!["https://www.scarevision.ai", "https://scarevision.ai"]
        );
        assert_eq!(config.render.wait, WaitPolicy::NetworkIdle);
        assert_eq!(config.render.load_timeout, Duration::from_secs(15));
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.max_body_bytes >= MAX_HTML_CHARS * JSON_ESCAPE_BYTES_PER_CHAR);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert!(!config.chrome.no_sandbox);
        assert!(config.chrome.executable.is_none());
    }

    #[test]
    fn load_policy_picks_up_settle_delay() {
        let config = config_from(&[("RENDER_WAIT", "load"), ("RENDER_SETTLE_MS", "500")])
            .expect("valid config");

        assert_eq!(
            config.render.wait,
            WaitPolicy::Load {
                settle: Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn origins_are_normalised() {
        let config = config_from(&[(
            "ALLOWED_ORIGINS",
            " https://Example.com/path , http://localhost:5173 ",
        )])
        .expect("valid config");

        assert_eq!(
            config.allowed_origins,
            vec!["https://example.com", "http://localhost:5173"]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("RENDER_WAIT", "domcontentloaded")]).is_err());
        assert!(config_from(&[("RENDER_LOAD_TIMEOUT_MS", "0")]).is_err());
        assert!(config_from(&[("CHROME_NO_SANDBOX", "maybe")]).is_err());
        assert!(config_from(&[("ALLOWED_ORIGINS", "not a url")]).is_err());
        assert!(config_from(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn chrome_settings_are_read_once_into_launch_config() {
        let config = config_from(&[
            ("CHROME_EXECUTABLE", "/opt/chromium/chrome"),
            ("CHROME_LIBRARY_PATH", "/opt/chromium/lib"),
            ("CHROME_NO_SANDBOX", "true"),
        ])
        .expect("valid config");

        assert_eq!(
            config.chrome.executable,
            Some(PathBuf::from("/opt/chromium/chrome"))
        );
        assert_eq!(config.chrome.library_path.as_deref(), Some("/opt/chromium/lib"));
        assert!(config.chrome.no_sandbox);
    }
}
