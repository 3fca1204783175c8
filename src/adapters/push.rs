use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::error::EngineResult;
use crate::render::{RenderedMessage, TemplateKind};

use super::{Adapter, AdapterOutcome};

#[derive(Debug, Clone)]
pub struct PushProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Wire shape downstream push filters key on (spec §6): `type` and
/// `episode_id` are stable fields, not adapter-internal detail. The
/// recipient device is addressed via the request path, not the body.
#[derive(Serialize)]
struct PushPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    episode_id: &'a str,
    title: &'a str,
    body: &'a str,
}

/// HTTP push-notification adapter. Stateless: each `send` is a single
/// `bearer_auth` JSON POST against the configured provider endpoint.
#[derive(Clone)]
pub struct PushAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl PushAdapter {
    pub fn new(config: &PushProviderConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(crate::error::EngineError::Request)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Adapter for PushAdapter {
    async fn send(
        &self,
        channel_address: &str,
        message: &RenderedMessage,
        kind: TemplateKind,
        episode_id: &str,
    ) -> AdapterOutcome {
        if channel_address.trim().is_empty() {
            return AdapterOutcome::InvalidAddress;
        }

        let payload = PushPayload {
            kind: kind.wire_type(),
            episode_id,
            title: &message.subject,
            body: &message.body_text,
        };

        let response = match self
            .client
            .post(format!("{}/{channel_address}", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return if e.is_timeout() || e.is_connect() {
                    AdapterOutcome::TransientFail {
                        reason: e.to_string(),
                    }
                } else {
                    AdapterOutcome::ProviderReject {
                        reason: e.to_string(),
                    }
                }
            }
        };

        classify_status(response.status(), &response.text().await.unwrap_or_default())
    }
}

/// Status-code classification (spec §4.A): 4xx other than 408/429 is a
/// terminal provider rejection (bad token,
/// unregistered device); 408/429/5xx and network failures are transient.
fn classify_status(status: StatusCode, body: &str) -> AdapterOutcome {
    if status.is_success() {
        return AdapterOutcome::Sent {
            provider_msg_id: body.trim().to_string(),
        };
    }

    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return AdapterOutcome::InvalidAddress;
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return AdapterOutcome::TransientFail {
            reason: format!("http {status}: {body}"),
        };
    }

    AdapterOutcome::ProviderReject {
        reason: format!("http {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_invalid_address() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "gone"),
            AdapterOutcome::InvalidAddress
        );
    }

    #[test]
    fn rate_limited_is_transient() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            AdapterOutcome::TransientFail { .. }
        ));
    }

    #[test]
    fn bad_request_is_terminal_reject() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "malformed"),
            AdapterOutcome::ProviderReject { .. }
        ));
    }

    #[test]
    fn success_carries_body_as_provider_id() {
        assert_eq!(
            classify_status(StatusCode::OK, "msg-123"),
            AdapterOutcome::Sent {
                provider_msg_id: "msg-123".to_string()
            }
        );
    }
}
