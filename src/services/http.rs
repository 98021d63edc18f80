//! Shared HTTP client construction and response classification.

use anyhow::Result;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::retry::ServiceFault;
use crate::TARGET_WEB_REQUEST;

const USER_AGENT: &str = concat!("enricher/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body carried into a fault message.
const MAX_ERROR_BODY: usize = 200;

/// Create the client shared by every HTTP adapter.
pub fn create_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    debug!(target: TARGET_WEB_REQUEST, "Creating HTTP client with {:?} timeout", request_timeout);

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .gzip(true)
        .timeout(request_timeout)
        .redirect(reqwest::redirect::Policy::default())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
}

/// Map a non-success status to a fault.
pub fn classify_status(status: StatusCode, body: &str) -> ServiceFault {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ServiceFault::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceFault::Unauthorized,
        s if s.is_server_error() => ServiceFault::Unavailable(format!("{}: {}", s, message)),
        s => ServiceFault::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// Map a transport error; `limit` is the timeout the request ran under.
pub fn classify_transport(err: reqwest::Error, limit: Duration) -> ServiceFault {
    if err.is_timeout() {
        ServiceFault::Timeout(limit)
    } else if err.is_decode() {
        ServiceFault::Malformed(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status, &err.to_string())
    } else {
        ServiceFault::Network(err.to_string())
    }
}

/// Send a prepared request and decode a successful JSON body.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    limit: Duration,
) -> Result<T, ServiceFault> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(e, limit))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(e, limit))?;

    if !status.is_success() {
        debug!(target: TARGET_WEB_REQUEST, "Request returned {}", status);
        return Err(classify_status(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| ServiceFault::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ServiceFault::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            ServiceFault::Unauthorized
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, ""),
            ServiceFault::Unauthorized
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, " missing "),
            ServiceFault::Rejected {
                status: 404,
                message: "missing".to_string()
            }
        );

        let fault = classify_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(fault, ServiceFault::Unavailable(_)));
        assert!(fault.is_retryable());
    }

    #[test]
    fn test_long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        match classify_status(StatusCode::BAD_REQUEST, &body) {
            ServiceFault::Rejected { message, .. } => assert_eq!(message.len(), MAX_ERROR_BODY),
            other => panic!("unexpected fault {:?}", other),
        }
    }

    #[test]
    fn test_client_builds() {
        assert!(create_http_client(Duration::from_secs(5)).is_ok());
    }
}
