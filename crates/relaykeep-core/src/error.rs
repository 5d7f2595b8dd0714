//! relaykeep 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 자체 실패를 `CoreError`로 매핑해서 반환한다.
//! 풀/세션/모니터는 [`CoreError::class`]로 에러를 분류하고 분류별 정책을 적용한다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (세션 폐기, 자격증명 만료 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Session")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (연결 실패, 연결 끊김)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 플랫폼 레이트 리밋 (flood wait)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 플랫폼이 다른 엔드포인트로 재연결을 요구함
    #[error("엔드포인트 이전 요구: {endpoint}")]
    Migration {
        /// 새 엔드포인트
        endpoint: String,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 네트워크 작업 타임아웃
    #[error("{operation} 타임아웃: {timeout_ms}ms 초과")]
    Timeout {
        /// 작업 이름 (connect, authorize, ...)
        operation: String,
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 암호화/복호화 실패
    #[error("암호화 에러: {0}")]
    Crypto(String),

    /// 저장소 실패
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

/// 에러 분류: 분류마다 풀/세션/모니터의 처리 정책이 고정되어 있다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 레이트 리밋. 핸들 자체는 유효하다.
    RateLimited {
        /// 대기 시간 (초)
        seconds: u64,
    },
    /// 현재 자격증명으로는 복구 불가
    AuthorizationInvalid,
    /// 엔드포인트 이전. 다음 연결 시 복구 가능
    TransportMigration,
    /// 미분류
    Generic,
}

impl ErrorClass {
    /// 모니터 이벤트 상세에 기록되는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited { .. } => "rate_limited",
            ErrorClass::AuthorizationInvalid => "authorization_invalid",
            ErrorClass::TransportMigration => "transport_migration",
            ErrorClass::Generic => "generic",
        }
    }
}

impl CoreError {
    /// 에러 분류
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::RateLimit { retry_after_secs } => ErrorClass::RateLimited {
                seconds: *retry_after_secs,
            },
            CoreError::Auth(_) => ErrorClass::AuthorizationInvalid,
            CoreError::Migration { .. } => ErrorClass::TransportMigration,
            _ => ErrorClass::Generic,
        }
    }

    /// 인증 계열 에러 여부 (세션 폐기 대상)
    pub fn is_authorization(&self) -> bool {
        self.class() == ErrorClass::AuthorizationInvalid
    }

    /// 타임아웃 에러 생성 헬퍼
    pub fn timeout(operation: &str, timeout: std::time::Duration) -> Self {
        CoreError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}
