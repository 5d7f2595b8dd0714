//! 애플리케이션 설정 구조체.
//!
//! 풀 크기, 헬스 체크/롤업 주기, 재검증 간격, 알림 임계값, 저장소 경로,
//! 게이트웨이 주소 등 런타임 설정을 정의한다. [`crate::config_manager::ConfigManager`]가
//! JSON 파일로 로드/저장한다.
//!
//! 모든 주기·임계값은 기본값일 뿐 고정 계약이 아니다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 연결 풀 설정
    #[serde(default)]
    pub pool: PoolConfig,
    /// 세션 매니저 설정
    #[serde(default)]
    pub session: SessionConfig,
    /// 연결 모니터 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// 세션 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 메시징 플랫폼 게이트웨이 설정
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// 알림 전달 설정
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self::default()
    }
}

// ============================================================
// 연결 풀 설정
// ============================================================

/// 연결 풀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 동시에 유지할 최대 핸들 수
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 헬스 체크 주기 (초)
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// 이 시간 이상 사용되지 않은 핸들은 헬스 체크에서 제거 (초)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// connect / 인증 확인 / disconnect 타임아웃 (초)
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// flood wait 상한 (초). 플랫폼이 더 긴 대기를 요구해도 이 값으로 자른다
    #[serde(default = "default_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            health_check_interval_secs: default_health_check_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            max_flood_wait_secs: default_max_flood_wait_secs(),
        }
    }
}

impl PoolConfig {
    /// 헬스 체크 주기
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// 유휴 핸들 컷오프
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// 네트워크 작업 타임아웃
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// flood wait 상한
    pub fn max_flood_wait(&self) -> Duration {
        Duration::from_secs(self.max_flood_wait_secs)
    }
}

fn default_max_connections() -> usize {
    100
}

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_max_flood_wait_secs() -> u64 {
    86_400
}

// ============================================================
// 세션 매니저 설정
// ============================================================

/// 세션 매니저 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 캐시된 세션을 다시 로드하기까지의 간격 (초)
    #[serde(default = "default_revalidation_interval_secs")]
    pub revalidation_interval_secs: u64,
    /// 이 횟수만큼 연속 검증 실패하면 정리 대상
    #[serde(default = "default_max_validation_attempts")]
    pub max_validation_attempts: u32,
    /// 검증용 임시 연결 타임아웃 (초)
    #[serde(default = "default_operation_timeout_secs")]
    pub validation_timeout_secs: u64,
    /// 세션 문자열 최소 길이
    #[serde(default = "default_min_credential_len")]
    pub min_credential_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revalidation_interval_secs: default_revalidation_interval_secs(),
            max_validation_attempts: default_max_validation_attempts(),
            validation_timeout_secs: default_operation_timeout_secs(),
            min_credential_len: default_min_credential_len(),
        }
    }
}

impl SessionConfig {
    /// 재검증 간격
    pub fn revalidation_interval(&self) -> Duration {
        Duration::from_secs(self.revalidation_interval_secs)
    }

    /// 검증 타임아웃
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

fn default_revalidation_interval_secs() -> u64 {
    3600
}

fn default_max_validation_attempts() -> u32 {
    3
}

fn default_min_credential_len() -> usize {
    32
}

// ============================================================
// 연결 모니터 설정
// ============================================================

/// 연결 모니터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 사용자별 이벤트 링 버퍼 크기
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    /// 전역 집계 롤업 주기 (초)
    #[serde(default = "default_rollup_interval_secs")]
    pub rollup_interval_secs: u64,
    /// high_error_rate 알림 임계값 (에러 수)
    #[serde(default = "default_error_alert_threshold")]
    pub error_alert_threshold: usize,
    /// high_error_rate 집계 윈도우 (초)
    #[serde(default = "default_error_alert_window_secs")]
    pub error_alert_window_secs: u64,
    /// long_flood_wait 알림 임계값 (초)
    #[serde(default = "default_long_flood_wait_secs")]
    pub long_flood_wait_secs: u64,
    /// 이 성공률 미만이면 문제 사용자로 분류
    #[serde(default = "default_problematic_success_rate")]
    pub problematic_success_rate: f64,
    /// 헬스 리포트에 포함할 최근 이벤트 수
    #[serde(default = "default_recent_events_limit")]
    pub recent_events_limit: usize,
    /// 마지막 이벤트 후 이 시간(초)이 지나고 연결 중이 아닌 사용자는 롤업에서 제거
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            rollup_interval_secs: default_rollup_interval_secs(),
            error_alert_threshold: default_error_alert_threshold(),
            error_alert_window_secs: default_error_alert_window_secs(),
            long_flood_wait_secs: default_long_flood_wait_secs(),
            problematic_success_rate: default_problematic_success_rate(),
            recent_events_limit: default_recent_events_limit(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl MonitorConfig {
    /// 롤업 주기
    pub fn rollup_interval(&self) -> Duration {
        Duration::from_secs(self.rollup_interval_secs)
    }

    /// 사용자 이벤트/메트릭 보존 기간
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_event_buffer_size() -> usize {
    1000
}

fn default_rollup_interval_secs() -> u64 {
    60
}

fn default_error_alert_threshold() -> usize {
    5
}

fn default_error_alert_window_secs() -> u64 {
    600
}

fn default_long_flood_wait_secs() -> u64 {
    300
}

fn default_problematic_success_rate() -> f64 {
    0.8
}

fn default_recent_events_limit() -> usize {
    10
}

fn default_retention_secs() -> u64 {
    86_400
}

// ============================================================
// 저장소 설정
// ============================================================

/// 세션 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite 파일 경로 (None이면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// 암호화 키(base64, 32바이트)를 읽을 환경 변수 이름
    #[serde(default = "default_encryption_key_env")]
    pub encryption_key_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            encryption_key_env: default_encryption_key_env(),
        }
    }
}

fn default_encryption_key_env() -> String {
    "RELAYKEEP_SESSION_KEY".to_string()
}

// ============================================================
// 게이트웨이 설정
// ============================================================

/// 메시징 플랫폼 게이트웨이 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// 게이트웨이 기본 URL
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// HTTP 요청 타임아웃 (초)
    #[serde(default = "default_operation_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            request_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_string()
}

// ============================================================
// 알림 설정
// ============================================================

/// 알림 전달 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    /// 운영 알림 웹훅 URL (없으면 로그로만 남김)
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default_config();
        assert_eq!(config.pool.health_check_interval(), Duration::from_secs(60));
        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(3600));
        assert_eq!(config.pool.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.session.revalidation_interval_secs, 3600);
        assert_eq!(config.session.max_validation_attempts, 3);
        assert_eq!(config.monitor.error_alert_threshold, 5);
        assert_eq!(config.monitor.error_alert_window_secs, 600);
        assert_eq!(config.monitor.long_flood_wait_secs, 300);
        assert_eq!(config.monitor.event_buffer_size, 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "pool": { "max_connections": 7 }, "alerts": { "webhook_url": "http://ops" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pool.max_connections, 7);
        assert_eq!(config.pool.health_check_interval_secs, 60);
        assert_eq!(config.session.min_credential_len, 32);
        assert_eq!(config.alerts.webhook_url.as_deref(), Some("http://ops"));
        assert_eq!(config.storage.encryption_key_env, "RELAYKEEP_SESSION_KEY");
    }

    #[test]
    fn empty_json_is_default() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pool.max_connections, 100);
        assert_eq!(config.gateway.base_url, "http://localhost:8080");
    }
}
