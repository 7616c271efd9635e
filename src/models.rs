use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Length of a check id as issued by the check handlers.
pub const CHECK_ID_LEN: usize = 20;

/// Error message carried by an outcome whose timer fired first.
pub const TIMEOUT_MESSAGE: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    #[default]
    Down,
}

impl<'de> Deserialize<'de> for Status {
    // Anything but "up" is treated as down.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("up") => Status::Up,
            _ => Status::Down,
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Up => f.write_str("up"),
            Status::Down => f.write_str("down"),
        }
    }
}

/// A monitored endpoint as persisted in the `checks` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    pub url: String,
    pub method: String,
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub state: Status,
    /// Epoch milliseconds of the last evaluation, `None` if never probed.
    #[serde(default, deserialize_with = "lenient_millis")]
    pub last_checked: Option<i64>,
    /// Fields owned by other handlers (e.g. `userPhone`), written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(last_checked_from(&Value::deserialize(deserializer)?))
}

/// Follows JavaScript truthiness: `false`, `null`, `0`, `NaN` and `""` mean never
/// probed. Any other value counts as probed; when it carries no usable
/// timestamp it reads as `Some(0)`.
fn last_checked_from(value: &Value) -> Option<i64> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) => match n.as_i64() {
            Some(0) => None,
            Some(millis) => Some(millis),
            None => n.as_f64().filter(|f| *f != 0.0 && !f.is_nan()).map(|f| f as i64),
        },
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.trim().parse().unwrap_or(0)),
        Value::Bool(true) | Value::Array(_) | Value::Object(_) => Some(0),
    }
}

pub fn is_check_id(id: &str) -> bool {
    id.len() == CHECK_ID_LEN
        && id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidCheck {
    #[error("id must be {CHECK_ID_LEN} lowercase alphanumeric characters, got {0:?}")]
    Id(String),
    #[error("url {0:?} is not a valid http(s) url")]
    Url(String),
    #[error("method {0:?} is not a valid http method")]
    Method(String),
    #[error("successCodes must not be empty")]
    NoSuccessCodes,
    #[error("timeoutSeconds must be at least 1")]
    Timeout,
}

impl Check {
    pub fn new(id: impl Into<String>, url: impl Into<String>, method: impl Into<String>, success_codes: Vec<u16>, timeout_seconds: u64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            method: method.into(),
            success_codes,
            timeout_seconds,
            state: Status::Down,
            last_checked: None,
            extra: Map::new(),
        }
    }

    pub fn has_been_checked(&self) -> bool {
        self.last_checked.is_some()
    }

    pub fn validate(&self) -> Result<(), InvalidCheck> {
        if !is_check_id(&self.id) {
            return Err(InvalidCheck::Id(self.id.clone()));
        }
        match reqwest::Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            _ => return Err(InvalidCheck::Url(self.url.clone())),
        }
        if reqwest::Method::from_bytes(self.method.to_uppercase().as_bytes()).is_err() {
            return Err(InvalidCheck::Method(self.method.clone()));
        }
        if self.success_codes.is_empty() {
            return Err(InvalidCheck::NoSuccessCodes);
        }
        if self.timeout_seconds == 0 {
            return Err(InvalidCheck::Timeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub message: String,
}

/// Result of one probe: either a response code or an error, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub error: Option<OutcomeError>,
    pub response_code: Option<u16>,
}

impl Outcome {
    pub fn response(code: u16) -> Self {
        Self { error: None, response_code: Some(code) }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(OutcomeError { message: message.into() }),
            response_code: None,
        }
    }

    pub fn timeout() -> Self {
        Self::failure(TIMEOUT_MESSAGE)
    }

    pub fn is_timeout(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.message == TIMEOUT_MESSAGE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub state: Status,
    pub alert: bool,
}

/// One line of a log segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub check: Check,
    pub outcome: Outcome,
    pub state: Status,
    pub alert: bool,
    pub time: i64,
}

impl LogEntry {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
