//! HTTP client for the remote screening service. Every request body is an
//! encrypted envelope; screening applies a fail-open policy, so a service
//! outage never turns into a dead phone line.

use std::time::Duration;

use serde::Serialize;
use warden_core::protocol::{HeartbeatPayload, ScreenRequest, ScreenResponse, ScreeningDecision};
use warden_core::{CodecError, EncryptedEnvelope, PayloadCodec};

/// Bound on any single request: a stalled service must not starve the modem
/// read path for long.
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ScreeningClient {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    auth_token: String,
    codec: PayloadCodec,
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("envelope: {0}")]
    Codec(#[from] CodecError),
    #[error("verdict: {0}")]
    Verdict(#[from] serde_json::Error),
}

impl ScreeningClient {
    pub fn new(
        base_url: impl Into<String>,
        device_id: impl Into<String>,
        auth_token: impl Into<String>,
        codec: PayloadCodec,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device_id: device_id.into(),
            auth_token: auth_token.into(),
            codec,
        })
    }

    /// Send one liveness report. Success is the HTTP outcome alone; the
    /// response is decrypted for the log and nothing else. Never raises.
    pub async fn heartbeat(&self, payload: &HeartbeatPayload) -> bool {
        match self.post_encrypted("heartbeat", payload).await {
            Ok(response) => {
                match self.open_response(response).await {
                    Ok(body) => tracing::debug!(%body, "heartbeat acknowledged"),
                    Err(err) => {
                        tracing::debug!(error = %err, "heartbeat response not decodable")
                    }
                }
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "heartbeat failed");
                false
            }
        }
    }

    /// Ask the service whether `number` may ring through. Fail-open: any
    /// failure on this path yields an allow decision.
    pub async fn screen_call(&self, number: &str) -> ScreeningDecision {
        let request = ScreenRequest {
            phone_number: number.to_string(),
            timestamp: chrono::Utc::now(),
        };
        match self.try_screen(&request).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(number = %number, error = %err, "screening unavailable, allowing call");
                ScreeningDecision {
                    phone_number: number.to_string(),
                    allow: true,
                    metadata: serde_json::Value::Null,
                }
            }
        }
    }

    async fn try_screen(&self, request: &ScreenRequest) -> Result<ScreeningDecision, RequestError> {
        let response = self.post_encrypted("screen", request).await?;
        let body = self.open_response(response).await?;
        let verdict: ScreenResponse = serde_json::from_value(body.clone())?;
        Ok(ScreeningDecision {
            phone_number: request.phone_number.clone(),
            allow: verdict.allows(),
            metadata: body,
        })
    }

    async fn post_encrypted<T: Serialize>(
        &self,
        leaf: &str,
        payload: &T,
    ) -> Result<reqwest::Response, RequestError> {
        let envelope = self.codec.seal(payload)?;
        let response = self
            .http
            .post(self.endpoint(leaf))
            .bearer_auth(&self.auth_token)
            .json(&envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    async fn open_response(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, RequestError> {
        let envelope: EncryptedEnvelope = response.json().await?;
        Ok(self.codec.open(&envelope)?)
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!("{}/api/devices/{}/{}", self.base_url, self.device_id, leaf)
    }
}
