// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Delivery of encoded payloads to the events intake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::payload::{HttpVerb, LogEvent};

/// Default per-request timeout for the bundled HTTP dispatcher.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("event intake returned {0}")]
    Status(StatusCode),
}

/// Accepts an encoded payload and attempts to deliver it.
///
/// Called at most once per flushed batch. Failures are reported to the
/// caller, which logs and discards the payload — implementations must not
/// retry internally on the engine's behalf.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, payload: &LogEvent) -> Result<(), DispatchError>;
}

/// HTTP dispatcher: one attempt per payload, bounded request timeout,
/// non-2xx statuses reported as [`DispatchError::Status`].
#[derive(Debug, Clone)]
pub struct HttpEventDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpEventDispatcher {
    fn default() -> Self {
        HttpEventDispatcher {
            client: reqwest::Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        HttpEventDispatcher {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl EventDispatcher for HttpEventDispatcher {
    async fn dispatch(&self, payload: &LogEvent) -> Result<(), DispatchError> {
        let mut request = match payload.http_verb {
            HttpVerb::Get => self.client.get(&payload.url),
            HttpVerb::Post => self.client.post(&payload.url),
        };
        request = request.timeout(self.timeout);
        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }

        let response = request.body(payload.body.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status));
        }

        debug!("delivered payload to {}", payload.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn json_headers() -> HashMap<String, String> {
        HashMap::from([("content-type".to_string(), "application/json".to_string())])
    }

    #[tokio::test]
    async fn test_dispatch_posts_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/events")
            .match_header("content-type", "application/json")
            .match_body(r#"{"account_id":"account-1"}"#)
            .with_status(200)
            .create_async()
            .await;

        let payload = LogEvent::new(
            format!("{}/v1/events", server.url()),
            HttpVerb::Post,
            json_headers(),
            r#"{"account_id":"account-1"}"#,
        );

        let result = HttpEventDispatcher::new().dispatch(&payload).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dispatch_uses_get_for_get_payloads() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/events")
            .with_status(200)
            .create_async()
            .await;

        let payload = LogEvent::new(
            format!("{}/v1/events", server.url()),
            HttpVerb::Get,
            HashMap::new(),
            "",
        );

        let result = HttpEventDispatcher::new().dispatch(&payload).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dispatch_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/events")
            .with_status(500)
            .create_async()
            .await;

        let payload = LogEvent::new(
            format!("{}/v1/events", server.url()),
            HttpVerb::Post,
            json_headers(),
            "{}",
        );

        let result = HttpEventDispatcher::new().dispatch(&payload).await;

        assert!(matches!(
            result,
            Err(DispatchError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_reports_connection_errors() {
        // Nothing is listening on this port.
        let payload = LogEvent::new(
            "http://127.0.0.1:9/v1/events",
            HttpVerb::Post,
            json_headers(),
            "{}",
        );

        let result = HttpEventDispatcher::with_timeout(Duration::from_millis(500))
            .dispatch(&payload)
            .await;

        assert!(matches!(result, Err(DispatchError::Request(_))));
    }
}
