//! HTTP plumbing shared by the provider adapters.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::StatusCode;

use super::ProviderError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Status and body of a completed request.
#[derive(Debug)]
pub(super) struct RawResponse {
    pub(super) status: StatusCode,
    pub(super) body: String,
}

impl RawResponse {
    /// Returns the body when the status matches, otherwise a status error
    /// carrying the raw body.
    pub(super) fn require(self, expected: StatusCode) -> Result<String, ProviderError> {
        if self.status == expected {
            Ok(self.body)
        } else {
            Err(ProviderError::Status {
                status: self.status.as_u16(),
                body: self.body,
            })
        }
    }
}

/// Sends a prepared request and reads the full body.
pub(super) async fn send(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<RawResponse, ProviderError> {
    let transport = |err: reqwest::Error| ProviderError::Transport {
        url: url.to_owned(),
        message: err.to_string(),
    };
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    Ok(RawResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_passes_matching_status() {
        let response = RawResponse {
            status: StatusCode::OK,
            body: "{}".to_owned(),
        };
        assert_eq!(response.require(StatusCode::OK), Ok("{}".to_owned()));
    }

    #[test]
    fn require_surfaces_raw_body() {
        let response = RawResponse {
            status: StatusCode::UNAUTHORIZED,
            body: "Invalid API key".to_owned(),
        };
        match response.require(StatusCode::OK) {
            Err(err) => assert_eq!(err.to_string(), "Invalid API key"),
            Ok(body) => panic!("status mismatch should fail, got body {body}"),
        }
    }
}
