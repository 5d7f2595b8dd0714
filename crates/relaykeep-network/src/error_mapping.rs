//! 게이트웨이 HTTP 응답 → `CoreError` 매핑.
//!
//! 401/403 → `Auth`, 420/429 → `RateLimit`, 303 → `Migration`, 503 → `ServiceUnavailable`.

use relaykeep_core::error::CoreError;
use serde::Deserialize;

/// Retry-After가 없을 때 기본 대기 시간 (초)
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 게이트웨이가 알려준 대기 시간의 상한 (초, 1일)
pub const MAX_RETRY_AFTER_SECS: u64 = 86_400;

/// 게이트웨이 에러 본문
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retry_after: Option<u64>,
    #[serde(default)]
    endpoint: Option<String>,
}

/// 응답 헤더 중 매핑에 필요한 값
#[derive(Debug, Default, Clone)]
pub struct ResponseHints {
    /// `Retry-After` 헤더
    pub retry_after: Option<String>,
    /// `Location` 헤더
    pub location: Option<String>,
}

impl ResponseHints {
    /// reqwest 헤더에서 추출
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let get = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        Self {
            retry_after: get(reqwest::header::RETRY_AFTER),
            location: get(reqwest::header::LOCATION),
        }
    }
}

/// 실패 상태 코드를 에러로 변환
pub fn map_status_error(operation: &str, status: u16, hints: &ResponseHints, body: &str) -> CoreError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.error.clone().unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => CoreError::Auth(format!("{operation}: {message}")),
        404 => CoreError::NotFound {
            resource_type: operation.to_string(),
            id: message,
        },
        420 | 429 => CoreError::RateLimit {
            retry_after_secs: parsed
                .retry_after
                .or_else(|| hints.retry_after.as_deref().and_then(|v| v.trim().parse().ok()))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                .min(MAX_RETRY_AFTER_SECS),
        },
        303 | 307 | 308 => match parsed.endpoint.or_else(|| hints.location.clone()) {
            Some(endpoint) => CoreError::Migration { endpoint },
            None => CoreError::Network(format!("{operation}: 이전 대상 엔드포인트 없음")),
        },
        503 => CoreError::ServiceUnavailable(format!("{operation}: {message}")),
        400 | 422 => CoreError::Validation {
            field: "gateway_request".to_string(),
            message: format!("{operation}: {message}"),
        },
        _ => CoreError::Network(format!("{operation}: HTTP {status}: {message}")),
    }
}

/// reqwest 전송 실패 매핑
pub fn map_transport_error(operation: &str, err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::Network(format!("{operation}: 요청 타임아웃: {err}"))
    } else {
        CoreError::Network(format!("{operation}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_unauthorized_to_auth_error() {
        let err = map_status_error("connect", 401, &ResponseHints::default(), "");
        assert!(matches!(err, CoreError::Auth(_)));
    }

    #[test]
    fn rate_limit_prefers_body_seconds() {
        let hints = ResponseHints {
            retry_after: Some("12".into()),
            location: None,
        };
        let err = map_status_error("call", 420, &hints, r#"{"error":"FLOOD_WAIT","retry_after":37}"#);
        assert!(matches!(err, CoreError::RateLimit { retry_after_secs: 37 }));
    }

    #[test]
    fn rate_limit_falls_back_to_header_then_default() {
        let hints = ResponseHints {
            retry_after: Some("12".into()),
            location: None,
        };
        let err = map_status_error("call", 429, &hints, "slow down");
        assert!(matches!(err, CoreError::RateLimit { retry_after_secs: 12 }));

        let err = map_status_error("call", 429, &ResponseHints::default(), "");
        assert!(matches!(
            err,
            CoreError::RateLimit {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        ));
    }

    #[test]
    fn oversized_retry_after_is_capped() {
        let hints = ResponseHints {
            retry_after: Some(u64::MAX.to_string()),
            location: None,
        };
        let err = map_status_error("call", 429, &hints, "");
        assert!(matches!(
            err,
            CoreError::RateLimit {
                retry_after_secs: MAX_RETRY_AFTER_SECS
            }
        ));

        let body = format!(r#"{{"retry_after":{}}}"#, u64::MAX);
        let err = map_status_error("call", 420, &ResponseHints::default(), &body);
        assert!(matches!(
            err,
            CoreError::RateLimit {
                retry_after_secs: MAX_RETRY_AFTER_SECS
            }
        ));
    }

    #[test]
    fn see_other_maps_to_migration() {
        let hints = ResponseHints {
            retry_after: None,
            location: Some("http://dc4.gateway".into()),
        };
        match map_status_error("connect", 303, &hints, "") {
            CoreError::Migration { endpoint } => assert_eq!(endpoint, "http://dc4.gateway"),
            other => panic!("expected migration, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_network_error() {
        let err = map_status_error("call", 500, &ResponseHints::default(), "boom");
        assert!(matches!(err, CoreError::Network(_)));
    }
}
