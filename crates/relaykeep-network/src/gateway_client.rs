//! 메시징 플랫폼 게이트웨이 클라이언트.
//!
//! `PlatformClient` / `PlatformClientFactory` 포트 구현.
//! 사용자 세션 자격증명을 Bearer 토큰으로 실어 게이트웨이 REST 엔드포인트를 호출한다.
//!
//! | 작업 | 요청 |
//! |---|---|
//! | connect | `POST /v1/session/connect` |
//! | disconnect | `POST /v1/session/disconnect` |
//! | is_authorized | `GET /v1/session/authorization` → `{"authorized": bool}` |
//! | call | `POST /v1/methods/{method}` (JSON params) |
//!
//! 게이트웨이가 303으로 다른 엔드포인트를 지정하면 엔드포인트를 교체하고
//! `Migration` 에러를 반환한다. 다음 connect는 새 엔드포인트로 간다.

use async_trait::async_trait;
use parking_lot::RwLock;
use relaykeep_core::config::GatewayConfig;
use relaykeep_core::error::CoreError;
use relaykeep_core::models::session::SessionCredential;
use relaykeep_core::ports::platform::{AuthorizationStatus, PlatformClient, PlatformClientFactory};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error_mapping::{map_status_error, map_transport_error, ResponseHints};

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationResponse {
    authorized: bool,
}

/// 게이트웨이 클라이언트: 사용자 한 명의 연결
pub struct HttpPlatformClient {
    http: reqwest::Client,
    user_id: String,
    credential: SessionCredential,
    endpoint: RwLock<String>,
    connected: AtomicBool,
}

impl HttpPlatformClient {
    /// 새 클라이언트 생성 (연결하지 않음)
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        user_id: &str,
        credential: SessionCredential,
    ) -> Self {
        Self {
            http,
            user_id: user_id.to_string(),
            credential,
            endpoint: RwLock::new(base_url.trim_end_matches('/').to_string()),
            connected: AtomicBool::new(false),
        }
    }

    /// 현재 엔드포인트
    pub fn endpoint(&self) -> String {
        self.endpoint.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.read(), path)
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(
        &self,
        operation: &str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let hints = ResponseHints::from_headers(resp.headers());
        let text = resp.text().await.unwrap_or_else(|e| {
            tracing::warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        let err = map_status_error(operation, status.as_u16(), &hints, &text);
        if let CoreError::Migration { endpoint } = &err {
            info!(
                "엔드포인트 이전: user_id={}, {} → {}",
                self.user_id,
                self.endpoint(),
                endpoint
            );
            *self.endpoint.write() = endpoint.trim_end_matches('/').to_string();
            self.connected.store(false, Ordering::SeqCst);
        }
        Err(err)
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn connect(&self) -> Result<(), CoreError> {
        debug!("게이트웨이 연결: user_id={}", self.user_id);

        let resp = self
            .http
            .post(self.url("/v1/session/connect"))
            .bearer_auth(self.credential.expose())
            .send()
            .await
            .map_err(|e| map_transport_error("connect", e))?;

        let resp = self.check_response("connect", resp).await?;

        // 본문이 비어 있어도 연결 자체는 성공
        let body: Option<ConnectResponse> = resp.json().await.ok();
        if let Some(endpoint) = body.and_then(|b| b.endpoint) {
            *self.endpoint.write() = endpoint.trim_end_matches('/').to_string();
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CoreError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let resp = self
            .http
            .post(self.url("/v1/session/disconnect"))
            .bearer_auth(self.credential.expose())
            .send()
            .await
            .map_err(|e| map_transport_error("disconnect", e))?;

        self.check_response("disconnect", resp).await?;
        debug!("게이트웨이 연결 종료: user_id={}", self.user_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<AuthorizationStatus, CoreError> {
        let resp = self
            .http
            .get(self.url("/v1/session/authorization"))
            .bearer_auth(self.credential.expose())
            .send()
            .await
            .map_err(|e| map_transport_error("authorize", e))?;

        match self.check_response("authorize", resp).await {
            Ok(resp) => {
                let body: AuthorizationResponse = resp
                    .json()
                    .await
                    .map_err(|e| CoreError::Internal(format!("인증 응답 파싱 실패: {e}")))?;
                Ok(AuthorizationStatus::from(body.authorized))
            }
            Err(CoreError::Auth(_)) => Ok(AuthorizationStatus::Unauthorized),
            Err(e) => Err(e),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::Network(format!("{method}: 연결되지 않음")));
        }

        let resp = self
            .http
            .post(self.url(&format!("/v1/methods/{method}")))
            .bearer_auth(self.credential.expose())
            .json(&params)
            .send()
            .await
            .map_err(|e| map_transport_error(method, e))?;

        let resp = self.check_response(method, resp).await?;
        resp.json()
            .await
            .map_err(|e| CoreError::Internal(format!("{method} 응답 파싱 실패: {e}")))
    }
}

/// 게이트웨이 클라이언트 팩토리
///
/// reqwest 클라이언트(커넥션 풀)는 팩토리 단위로 공유한다.
pub struct HttpPlatformClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPlatformClientFactory {
    /// 새 팩토리 생성
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 게이트웨이 설정으로 생성
    pub fn from_config(config: &GatewayConfig) -> Result<Self, CoreError> {
        Self::new(&config.base_url, config.request_timeout())
    }
}

impl PlatformClientFactory for HttpPlatformClientFactory {
    fn create(
        &self,
        user_id: &str,
        credential: &SessionCredential,
    ) -> Result<Arc<dyn PlatformClient>, CoreError> {
        Ok(Arc::new(HttpPlatformClient::new(
            self.http.clone(),
            &self.base_url,
            user_id,
            credential.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaykeep_core::testing::credential;

    fn client_for(url: &str) -> Arc<dyn PlatformClient> {
        let factory = HttpPlatformClientFactory::new(url, Duration::from_secs(5)).unwrap();
        factory.create("u1", &credential(1)).unwrap()
    }

    #[tokio::test]
    async fn connect_and_check_authorization() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/v1/session/connect")
            .match_header(
                "authorization",
                format!("Bearer {}", credential(1).expose()).as_str(),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;
        let auth = server
            .mock("GET", "/v1/session/authorization")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"authorized":true}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(
            client.is_authorized().await.unwrap(),
            AuthorizationStatus::Authorized
        );

        connect.assert_async().await;
        auth.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_status_is_a_value_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _auth = server
            .mock("GET", "/v1/session/authorization")
            .with_status(401)
            .with_body(r#"{"error":"AUTH_KEY_UNREGISTERED"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        assert_eq!(
            client.is_authorized().await.unwrap(),
            AuthorizationStatus::Unauthorized
        );
    }

    #[tokio::test]
    async fn flood_wait_maps_to_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _connect = server
            .mock("POST", "/v1/session/connect")
            .with_status(420)
            .with_body(r#"{"error":"FLOOD_WAIT","retry_after":321}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimit { retry_after_secs: 321 }));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn migration_switches_endpoint_for_next_connect() {
        let mut old_dc = mockito::Server::new_async().await;
        let mut new_dc = mockito::Server::new_async().await;

        let _moved = old_dc
            .mock("POST", "/v1/session/connect")
            .with_status(303)
            .with_header("location", &new_dc.url())
            .create_async()
            .await;
        let accepted = new_dc
            .mock("POST", "/v1/session/connect")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&old_dc.url());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, CoreError::Migration { .. }));

        client.connect().await.unwrap();
        assert!(client.is_connected());
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn call_forwards_params() {
        let mut server = mockito::Server::new_async().await;
        let _connect = server
            .mock("POST", "/v1/session/connect")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let send = server
            .mock("POST", "/v1/methods/send_message")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"chat_id": 7, "text": "hi"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message_id": 99}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client.connect().await.unwrap();
        let result = client
            .call("send_message", serde_json::json!({"chat_id": 7, "text": "hi"}))
            .await
            .unwrap();

        assert_eq!(result["message_id"], 99);
        send.assert_async().await;
    }

    #[tokio::test]
    async fn call_requires_connection() {
        let client = client_for("http://127.0.0.1:1");
        let err = client
            .call("get_history", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        // 도달 불가 URL이어도 연결 전이면 요청하지 않는다
        let client = client_for("http://127.0.0.1:1");
        client.disconnect().await.unwrap();
    }
}
