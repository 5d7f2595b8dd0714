//! 메시징 플랫폼 클라이언트 포트.
//!
//! 구현: `relaykeep-network` crate (HTTP 게이트웨이)
//!
//! 플랫폼 프로토콜 자체는 불투명하다. 코어가 직접 쓰는 기능은
//! connect / disconnect / 인증 확인뿐이고, 나머지 작업은 [`PlatformClient::call`]로
//! 그대로 전달된다.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::session::SessionCredential;

/// 인증 확인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// 인증됨
    Authorized,
    /// 자격증명이 더 이상 유효하지 않음
    Unauthorized,
}

impl From<bool> for AuthorizationStatus {
    fn from(authorized: bool) -> Self {
        if authorized {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Unauthorized
        }
    }
}

/// 사용자 한 명의 인증된 플랫폼 연결
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// 트랜스포트 연결
    async fn connect(&self) -> Result<(), CoreError>;

    /// 트랜스포트 종료
    async fn disconnect(&self) -> Result<(), CoreError>;

    /// 트랜스포트가 열려 있는지
    fn is_connected(&self) -> bool;

    /// 현재 자격증명이 인증된 상태인지
    ///
    /// 미인증은 `Ok(Unauthorized)`, 네트워크 실패 등은 `Err`.
    async fn is_authorized(&self) -> Result<AuthorizationStatus, CoreError>;

    /// 비즈니스 작업 전달 (메시지 전송, 히스토리 조회 등)
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError>;
}

/// 세션 자격증명으로 클라이언트를 만드는 팩토리
pub trait PlatformClientFactory: Send + Sync {
    /// 새 클라이언트 생성 (아직 연결하지 않음)
    fn create(
        &self,
        user_id: &str,
        credential: &SessionCredential,
    ) -> Result<Arc<dyn PlatformClient>, CoreError>;
}
