//! 연결 이벤트/메트릭 모델.
//!
//! 이벤트는 불변이며 모니터의 사용자별 링 버퍼에 append-only로 쌓인다.
//! 메트릭은 이벤트로부터 누적되며 모니터만 갱신한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 이벤트 상세 (키-값)
pub type EventDetails = BTreeMap<String, serde_json::Value>;

/// 연결 이벤트 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventType {
    /// 연결 시도
    ConnectAttempt,
    /// 연결 성공
    ConnectSuccess,
    /// 연결 실패
    ConnectFailed,
    /// 연결 종료
    Disconnect,
    /// 재연결
    Reconnect,
    /// 작업 에러
    Error,
    /// 플랫폼 레이트 리밋
    FloodWait,
    /// 파사드 작업 시작/완료 (`operation`, `phase` 상세, 메트릭 영향 없음)
    Operation,
}

impl ConnectionEventType {
    /// 로그/리포트용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEventType::ConnectAttempt => "connect_attempt",
            ConnectionEventType::ConnectSuccess => "connect_success",
            ConnectionEventType::ConnectFailed => "connect_failed",
            ConnectionEventType::Disconnect => "disconnect",
            ConnectionEventType::Reconnect => "reconnect",
            ConnectionEventType::Error => "error",
            ConnectionEventType::FloodWait => "flood_wait",
            ConnectionEventType::Operation => "operation",
        }
    }
}

impl fmt::Display for ConnectionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 연결 이벤트 (불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// 사용자 ID
    pub user_id: String,
    /// 이벤트 유형
    pub event_type: ConnectionEventType,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 상세
    #[serde(default)]
    pub details: EventDetails,
}

impl ConnectionEvent {
    /// 현재 시각으로 이벤트 생성
    pub fn now(user_id: &str, event_type: ConnectionEventType, details: EventDetails) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_type,
            timestamp: Utc::now(),
            details,
        }
    }

    /// 이벤트를 남긴 파사드 작업 이름 (`operation` 상세)
    pub fn operation(&self) -> Option<&str> {
        self.details.get("operation").and_then(|v| v.as_str())
    }

    /// flood wait 이벤트의 대기 시간 (`seconds` 상세)
    pub fn wait_seconds(&self) -> Option<u64> {
        self.details.get("seconds").and_then(|v| v.as_u64())
    }
}

/// 상세 맵 생성 헬퍼
///
/// ```rust,ignore
/// let details = details([("reason", json!("no_session"))]);
/// ```
pub fn details<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> EventDetails {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// 사용자별 연결 메트릭
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionMetrics {
    /// 연결 시도 수
    pub total_connections: u64,
    /// 연결 성공 수
    pub successful_connections: u64,
    /// 연결 실패 수
    pub failed_connections: u64,
    /// 재연결 수
    pub total_reconnections: u64,
    /// 에러 수
    pub total_errors: u64,
    /// flood wait 수
    pub total_flood_waits: u64,
    /// 마지막 연결 성공 시각
    pub last_connection_time: Option<DateTime<Utc>>,
    /// 마지막 에러 시각
    pub last_error_time: Option<DateTime<Utc>>,
    /// 평균 연결 유지 시간 (초, 이동 평균)
    pub average_connection_duration: f64,
    /// 평균에 반영된 종료된 연결 수
    pub completed_connections: u64,
    /// 현재 연결 시작 시각
    pub current_connection_start: Option<DateTime<Utc>>,
}

impl ConnectionMetrics {
    /// 연결 성공률 (시도가 없으면 None)
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_connections == 0 {
            return None;
        }
        Some(self.successful_connections as f64 / self.total_connections as f64)
    }

    /// 현재 연결 중 여부
    pub fn is_connected(&self) -> bool {
        self.current_connection_start.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionEventType::FloodWait).unwrap();
        assert_eq!(json, "\"flood_wait\"");
        assert_eq!(ConnectionEventType::ConnectAttempt.to_string(), "connect_attempt");
    }

    #[test]
    fn wait_seconds_reads_detail() {
        let event = ConnectionEvent::now(
            "u1",
            ConnectionEventType::FloodWait,
            details([("seconds", json!(420))]),
        );
        assert_eq!(event.wait_seconds(), Some(420));

        let plain = ConnectionEvent::now("u1", ConnectionEventType::Error, EventDetails::new());
        assert_eq!(plain.wait_seconds(), None);
    }

    #[test]
    fn success_rate_needs_attempts() {
        let mut metrics = ConnectionMetrics::default();
        assert_eq!(metrics.success_rate(), None);

        metrics.total_connections = 4;
        metrics.successful_connections = 3;
        assert_eq!(metrics.success_rate(), Some(0.75));
    }
}
