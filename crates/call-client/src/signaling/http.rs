//! HTTP implementation of [`SignalingChannel`].

use super::SignalingChannel;
use crate::errors::ClientError;
use common::protocol::{
    ErrorResponse, JoinRequest, JoinResponse, LeaveRequest, PingRequest, PollQuery, PollResponse,
    RelayRequest, RelayResponse, RoomState,
};
use common::types::UserType;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Connect timeout for gateway requests in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Signaling gateway client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    client: Client,
    base_url: String,
}

impl HttpSignalingClient {
    /// Create a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a gateway response to its body or a `ClientError`.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(|e| {
                warn!(target: "call.signaling", error = %e, "Failed to decode gateway response");
                ClientError::Decode(e.to_string())
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| format!("{}: {}", e.error, e.details))
            .unwrap_or(body);
        warn!(target: "call.signaling", status = %status, message = %message, "Gateway rejected request");
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn transport_error(e: &reqwest::Error) -> ClientError {
        debug!(target: "call.signaling", error = %e, "Gateway request failed");
        ClientError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl SignalingChannel for HttpSignalingClient {
    #[instrument(skip(self), fields(room_id = %room_id, user_id = %user_id))]
    async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        user_type: &UserType,
    ) -> Result<RoomState, ClientError> {
        let response = self
            .client
            .post(self.url("/api/join"))
            .json(&JoinRequest::new(room_id, user_id, user_type))
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let body: JoinResponse = Self::handle_response(response).await?;
        Ok(body.room_state)
    }

    #[instrument(skip(self), fields(room_id = %room_id, user_id = %user_id))]
    async fn leave(&self, room_id: &str, user_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/leave"))
            .json(&LeaveRequest::new(room_id, user_id))
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let _: serde_json::Value = Self::handle_response(response).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn relay(&self, request: RelayRequest) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/api/message"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let body: RelayResponse = Self::handle_response(response).await?;
        Ok(body.message_id)
    }

    async fn poll(
        &self,
        room_id: &str,
        user_id: &str,
        since: i64,
    ) -> Result<PollResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/api/poll"))
            .query(&PollQuery::new(room_id, user_id, since))
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        Self::handle_response(response).await
    }

    async fn ping(&self, user_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/ping"))
            .json(&PingRequest {
                user_id: Some(user_id.to_string()),
            })
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let _: serde_json::Value = Self::handle_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use common::types::MessageType;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpSignalingClient {
        HttpSignalingClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_join_returns_room_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/join"))
            .and(body_json(json!({ "roomId": "R1", "userId": "bob", "userType": "callee" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "roomState": {
                    "roomId": "R1",
                    "users": [{ "userId": "alice", "userType": "caller" }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = client_for(&server)
            .join("R1", "bob", &UserType::Callee)
            .await
            .unwrap();
        assert_eq!(state.room_id, "R1");
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.users[0].user_type, UserType::Caller);
    }

    #[tokio::test]
    async fn test_relay_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/message"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "messageId": "m-42" })),
            )
            .mount(&server)
            .await;

        let request = RelayRequest::new("R1", "alice", &MessageType::Offer).to("bob");
        let id = client_for(&server).relay(request).await.unwrap();
        assert_eq!(id, "m-42");
    }

    #[tokio::test]
    async fn test_poll_sends_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/poll"))
            .and(query_param("roomId", "R1"))
            .and(query_param("since", "17"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{
                    "id": "m-1",
                    "roomId": "R1",
                    "type": "answer",
                    "from": "bob",
                    "data": {},
                    "timestamp": 18
                }],
                "timestamp": 20
            })))
            .mount(&server)
            .await;

        let page = client_for(&server).poll("R1", "alice", 17).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].message_type, MessageType::Answer);
        assert_eq!(page.timestamp, 20);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/message"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "Room not found",
                "details": "Room R9 does not exist"
            })))
            .mount(&server)
            .await;

        let request = RelayRequest::new("R9", "alice", &MessageType::Offer);
        let err = client_for(&server).relay(request).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        match err {
            ClientError::Rejected { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Room not found: Room R9 does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server).ping("alice").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let client = HttpSignalingClient::new("http://127.0.0.1:1", Duration::from_millis(500))
            .unwrap();
        let err = client.ping("alice").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/poll"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).poll("R1", "alice", 0).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
