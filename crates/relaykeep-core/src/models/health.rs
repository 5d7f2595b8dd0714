//! 헬스 리포트 / 알림 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::{ConnectionEvent, EventDetails};

/// 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// 짧은 시간 내 에러 다발
    HighErrorRate,
    /// 긴 flood wait
    LongFloodWait,
}

impl AlertType {
    /// 알림 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighErrorRate => "high_error_rate",
            AlertType::LongFloodWait => "long_flood_wait",
        }
    }
}

/// 모니터가 발생시키는 알림
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 종류
    pub alert_type: AlertType,
    /// 대상 사용자
    pub user_id: String,
    /// 사람이 읽을 메시지
    pub message: String,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 상세
    #[serde(default)]
    pub details: EventDetails,
}

/// 전역 집계 (롤업 루프가 갱신)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GlobalStats {
    /// 추적 중인 사용자 수
    pub total_users: usize,
    /// 현재 연결 중인 사용자 수
    pub active_connections: usize,
    /// 최근 1시간 에러 이벤트 수
    pub errors_last_hour: usize,
    /// 최근 1시간 flood wait 이벤트 수
    pub flood_waits_last_hour: usize,
    /// 시도가 있는 사용자들의 평균 성공률
    pub average_success_rate: f64,
    /// 마지막 롤업 시각
    pub last_rollup: Option<DateTime<Utc>>,
}

/// 헬스 리포트 요약
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthSummary {
    /// 추적 중인 사용자 수
    pub total_users: usize,
    /// 현재 연결 중인 사용자 수
    pub active_connections: usize,
    /// 버퍼에 남아 있는 이벤트 수
    pub total_events: usize,
    /// 누적 에러 수
    pub total_errors: u64,
    /// 누적 flood wait 수
    pub total_flood_waits: u64,
    /// 문제 사용자 수
    pub problematic_users: usize,
}

/// 성공률이 임계값 미만인 사용자
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblematicUser {
    /// 사용자 ID
    pub user_id: String,
    /// 연결 성공률
    pub success_rate: f64,
    /// 연결 시도 수
    pub total_connections: u64,
    /// 연결 실패 수
    pub failed_connections: u64,
    /// 에러 수
    pub total_errors: u64,
}

/// 헬스 리포트
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    /// 요약
    pub summary: HealthSummary,
    /// 최근 에러 이벤트 (최신순, 최대 10개)
    pub recent_errors: Vec<ConnectionEvent>,
    /// 최근 flood wait 이벤트 (최신순, 최대 10개)
    pub recent_flood_waits: Vec<ConnectionEvent>,
    /// 문제 사용자
    pub problematic_users: Vec<ProblematicUser>,
    /// 마지막 롤업 결과
    pub global_stats: GlobalStats,
    /// 리포트 생성 시각
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_names() {
        assert_eq!(AlertType::HighErrorRate.as_str(), "high_error_rate");
        assert_eq!(
            serde_json::to_string(&AlertType::LongFloodWait).unwrap(),
            "\"long_flood_wait\""
        );
    }
}
