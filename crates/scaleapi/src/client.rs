//! Shared HTTP plumbing.
//!
//! One [`ureq::Agent`] per client, with a global deadline per call. HTTP
//! status codes are not turned into transport errors so that error bodies
//! can be read and their messages surfaced as-is.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use ureq::http::Response;

/// Default API base used when nothing is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api/v1";

/// Default deadline for one call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

static PATH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:@-]+$").expect("path segment pattern is valid"));

/// Connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// API base URL, including any path prefix such as `/api/v1`.
    pub base_url: String,
    /// Deadline for a whole call, connect through body.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Blocking client for the scaling API.
#[derive(Debug, Clone)]
pub struct Client {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL without a trailing slash.
    api_base: String,
}

impl Client {
    /// Create a client from settings.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_base: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client with a custom API base and default timeout (for testing).
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self::new(&Config {
            base_url: api_base.into(),
            ..Config::default()
        })
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build a URL from a fixed route and path parameters.
    ///
    /// Parameters are checked rather than percent-encoded; anything outside
    /// the safe set is rejected.
    pub(crate) fn url(&self, route: &str, params: &[&str]) -> Result<String> {
        let mut url = format!("{}/{}", self.api_base, route.trim_matches('/'));
        for param in params {
            url.push('/');
            url.push_str(segment(param)?);
        }
        Ok(url)
    }

    pub(crate) fn get(&self, url: &str, folder: Option<&str>) -> Result<Value> {
        log::debug!("GET {url}");
        let mut request = self.agent.get(url).header("Accept", "application/json");
        if let Some(folder) = folder {
            request = request.query("folder", folder);
        }
        read(request.call()?)
    }

    pub(crate) fn delete(&self, url: &str, folder: Option<&str>) -> Result<Value> {
        log::debug!("DELETE {url}");
        let mut request = self.agent.delete(url).header("Accept", "application/json");
        if let Some(folder) = folder {
            request = request.query("folder", folder);
        }
        read(request.call()?)
    }

    pub(crate) fn put<B: Serialize>(&self, url: &str, folder: Option<&str>, body: &B) -> Result<Value> {
        log::debug!("PUT {url}");
        let mut request = self.agent.put(url).header("Accept", "application/json");
        if let Some(folder) = folder {
            request = request.query("folder", folder);
        }
        read(request.send_json(body)?)
    }

    pub(crate) fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<Value> {
        log::debug!("POST {url}");
        let request = self.agent.post(url).header("Accept", "application/json");
        read(request.send_json(body)?)
    }

    /// POST and return the raw status and parsed body, without unwrapping.
    pub(crate) fn post_raw<B: Serialize>(&self, url: &str, body: &B) -> Result<(u16, Option<Value>)> {
        log::debug!("POST {url}");
        let request = self.agent.post(url).header("Accept", "application/json");
        let (status, text) = into_text(request.send_json(body)?)?;
        Ok((status, serde_json::from_str(&text).ok()))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// Check one path parameter.
pub(crate) fn segment(value: &str) -> Result<&str> {
    if PATH_SEGMENT.is_match(value) {
        Ok(value)
    } else {
        Err(Error::InvalidSegment(value.to_string()))
    }
}

/// Decode a typed payload out of an unwrapped response.
pub(crate) fn parse<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn into_text(mut response: Response<ureq::Body>) -> Result<(u16, String)> {
    let status = response.status().as_u16();
    let text = response.body_mut().read_to_string()?;
    log::trace!("HTTP {status}: {text}");
    Ok((status, text))
}

fn read(response: Response<ureq::Body>) -> Result<Value> {
    let (status, text) = into_text(response)?;
    decode(status, &text)
}

/// Unwrap a response body.
///
/// Success envelopes `{success: true, data}` yield `data`; bodies without an
/// envelope yield themselves. Non-2xx statuses and `{success: false}`
/// bodies become [`Error::Remote`] carrying the server's message.
pub(crate) fn decode(status: u16, body: &str) -> Result<Value> {
    let ok = (200..300).contains(&status);
    let value = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => value,
            Err(_) if !ok => {
                return Err(Error::Remote {
                    status,
                    code: None,
                    message: format!("HTTP {status}: {}", body.trim()),
                });
            }
            Err(e) => return Err(e.into()),
        }
    };

    let refused = value.get("success").and_then(Value::as_bool) == Some(false);
    if !ok || refused {
        return Err(remote_error(status, &value));
    }

    match value {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

/// Extract `{error: "..."}` or `{error: {code, message}}`.
pub(crate) fn remote_error(status: u16, value: &Value) -> Error {
    let (code, message) = match value.get("error") {
        Some(Value::String(message)) => (None, Some(message.clone())),
        Some(Value::Object(detail)) => (
            detail.get("code").and_then(Value::as_str).map(str::to_string),
            detail.get("message").and_then(Value::as_str).map(str::to_string),
        ),
        _ => (None, None),
    };
    let message = message
        .or_else(|| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {status}"));

    Error::Remote {
        status,
        code,
        message,
    }
}
