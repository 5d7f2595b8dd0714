//! 클라이언트를 내줄 수 없는 경우.

use relaykeep_core::error::{CoreError, ErrorClass};
use thiserror::Error;

/// 클라이언트 사용 불가 사유
///
/// 예상 가능한 결과이므로 호출자가 경우별로 처리한다.
#[derive(Debug, Error)]
pub enum Unavailable {
    /// 저장된 세션 없음
    #[error("세션 없음")]
    NoSession,

    /// flood wait 중
    #[error("flood wait 중, {remaining_secs}초 남음")]
    FloodWait {
        /// 남은 대기 시간 (초, 올림)
        remaining_secs: u64,
    },

    /// 자격증명이 인증되지 않음
    #[error("세션이 인증되지 않음")]
    Unauthorized,

    /// 연결 실패
    #[error("연결 실패: {0}")]
    ConnectFailed(#[source] CoreError),

    /// 종료 중
    #[error("종료 중")]
    ShuttingDown,
}

impl Unavailable {
    /// 연결 실패 원인의 에러 분류 (연결 실패가 아니면 None)
    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            Unavailable::ConnectFailed(e) => Some(e.class()),
            Unavailable::Unauthorized => Some(ErrorClass::AuthorizationInvalid),
            _ => None,
        }
    }

    /// 재인증 없이는 복구되지 않는 결과인지
    pub fn requires_reauthorization(&self) -> bool {
        self.error_class() == Some(ErrorClass::AuthorizationInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connect_failures() {
        let rate = Unavailable::ConnectFailed(CoreError::RateLimit {
            retry_after_secs: 30,
        });
        assert_eq!(rate.error_class(), Some(ErrorClass::RateLimited { seconds: 30 }));
        assert!(!rate.requires_reauthorization());

        let auth = Unavailable::ConnectFailed(CoreError::Auth("revoked".into()));
        assert!(auth.requires_reauthorization());
        assert!(Unavailable::Unauthorized.requires_reauthorization());
        assert_eq!(Unavailable::NoSession.error_class(), None);
    }
}
