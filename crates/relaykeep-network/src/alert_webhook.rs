//! 운영 알림 웹훅 (`AlertCallback` 포트 구현).
//!
//! 모니터 알림을 JSON으로 지정 URL에 POST한다.

use async_trait::async_trait;
use relaykeep_core::error::CoreError;
use relaykeep_core::models::health::Alert;
use relaykeep_core::ports::alert::AlertCallback;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error_mapping::{map_status_error, map_transport_error, ResponseHints};

/// 웹훅 요청 본문
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    source: &'static str,
    #[serde(flatten)]
    alert: &'a Alert,
}

/// 웹훅 알림 콜백
pub struct WebhookAlertCallback {
    http: reqwest::Client,
    url: String,
}

impl WebhookAlertCallback {
    /// 새 웹훅 콜백 생성
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertCallback for WebhookAlertCallback {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), CoreError> {
        let payload = WebhookPayload {
            source: "relaykeep",
            alert,
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error("alert_webhook", e))?;

        let status = resp.status();
        if !status.is_success() {
            let hints = ResponseHints::from_headers(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(map_status_error("alert_webhook", status.as_u16(), &hints, &text));
        }

        debug!(
            "웹훅 알림 전송: {} user_id={}",
            alert.alert_type.as_str(),
            alert.user_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaykeep_core::models::connection::details;
    use relaykeep_core::models::health::AlertType;

    fn alert() -> Alert {
        Alert {
            alert_type: AlertType::LongFloodWait,
            user_id: "u7".into(),
            message: "flood wait 600s".into(),
            timestamp: chrono::Utc::now(),
            details: details([("seconds", serde_json::json!(600))]),
        }
    }

    #[tokio::test]
    async fn posts_alert_json() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hooks/ops")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "source": "relaykeep",
                "alert_type": "long_flood_wait",
                "user_id": "u7",
                "details": {"seconds": 600}
            })))
            .with_status(204)
            .create_async()
            .await;

        let callback =
            WebhookAlertCallback::new(&format!("{}/hooks/ops", server.url()), Duration::from_secs(5))
                .unwrap();
        callback.on_alert(&alert()).await.unwrap();

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _hook = server
            .mock("POST", "/hooks/ops")
            .with_status(500)
            .with_body("down")
            .create_async()
            .await;

        let callback =
            WebhookAlertCallback::new(&format!("{}/hooks/ops", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = callback.on_alert(&alert()).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
    }
}
