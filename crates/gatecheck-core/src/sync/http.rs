//! HTTP client for the hosted check-in endpoint

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::endpoint::{CheckInEndpoint, PushError, PushResult, ScanReplay};
use crate::models::{CheckInStatus, Classification};

/// Bounded per-push request timeout; an elapsed timeout is a transport
/// error, never an invalid ticket
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Error codes the server uses for terminal outcomes delivered on non-2xx
/// responses. Matched structurally, never by message text.
const CODE_ALREADY_CHECKED_IN: &str = "already_checked_in";
const CODE_TICKET_NOT_FOUND: &str = "ticket_not_found";
const CODE_TICKET_NOT_ACTIVE: &str = "ticket_not_active";

/// `reqwest`-backed implementation of `CheckInEndpoint`
#[derive(Clone)]
pub struct HttpCheckInEndpoint {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpCheckInEndpoint {
    /// Create a client for the given base URL with the default timeout
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_PUSH_TIMEOUT)
    }

    /// Create a client with an explicit per-push timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let endpoint = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::InvalidInput(e.to_string()))?;
        Ok(Self { endpoint, client })
    }
}

impl CheckInEndpoint for HttpCheckInEndpoint {
    async fn push(&self, replay: &ScanReplay) -> PushResult {
        let url = format!("{}/api/v1/check-ins", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(replay)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PushError::Timeout
                } else {
                    PushError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let payload = response
                .json::<ScanResponse>()
                .await
                .map_err(|e| PushError::InvalidPayload(e.to_string()))?;
            return payload.try_into();
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(status, &body);

        // Terminal outcomes the server signals via error responses still
        // settle the record; only genuine failures surface as errors.
        match code.as_str() {
            CODE_ALREADY_CHECKED_IN => Ok(Classification {
                status: CheckInStatus::Duplicate,
                attendee_name: None,
                ticket_tier: None,
            }),
            CODE_TICKET_NOT_FOUND | CODE_TICKET_NOT_ACTIVE => Ok(Classification::invalid()),
            _ => Err(PushError::Server {
                status: status.as_u16(),
                code,
                message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanResponse {
    status: String,
    attendee_name: Option<String>,
    ticket_tier: Option<String>,
}

impl TryFrom<ScanResponse> for Classification {
    type Error = PushError;

    fn try_from(value: ScanResponse) -> PushResult {
        let status: CheckInStatus = value
            .status
            .parse()
            .map_err(PushError::InvalidPayload)?;
        Ok(Self {
            status,
            attendee_name: value.attendee_name,
            ticket_tier: value.ticket_tier,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

fn parse_error_body(status: StatusCode, body: &str) -> (String, String) {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        let code = payload
            .code
            .or(payload.error)
            .unwrap_or_else(|| format!("http_{}", status.as_u16()));
        let message = payload
            .message
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return (code, message.trim().to_string());
    }

    let trimmed = body.trim();
    let message = if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    };
    (format!("http_{}", status.as_u16()), message)
}

fn normalize_base_url(raw: String) -> crate::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::InvalidInput(
            "endpoint URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(crate::Error::InvalidInput(
            "endpoint URL must include http:// or https://".to_string(),
        ))
    }
}
