//! # relaykeep-network
//!
//! 네트워크 어댑터.
//! 메시징 플랫폼 게이트웨이(HTTP)에 대한 `PlatformClient` 구현과
//! 운영 알림 웹훅(`AlertCallback` 구현)을 제공한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use relaykeep_network::gateway_client::HttpPlatformClientFactory;
//! use relaykeep_network::alert_webhook::WebhookAlertCallback;
//! ```

pub mod alert_webhook;
pub mod error_mapping;
pub mod gateway_client;
