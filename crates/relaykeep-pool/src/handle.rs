//! 연결 핸들 / 임대.

use chrono::{DateTime, Utc};
use relaykeep_core::error::CoreError;
use relaykeep_core::ports::platform::PlatformClient;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// 사용자 한 명의 인증된 연결 (풀 내부 항목)
///
/// 플랫폼 클라이언트는 이 핸들이 단독 소유한다. 외부에는 [`ClientLease`]로만 노출된다.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// 풀 내 고유 ID (교체 감지용)
    pub handle_id: u64,
    /// 사용자 ID
    pub user_id: String,
    pub(crate) client: Arc<dyn PlatformClient>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 사용 시각
    pub last_used_at: Instant,
    /// 정상 여부
    pub is_healthy: bool,
    /// 마지막 에러
    pub last_error: Option<String>,
    /// flood wait 종료 시각
    pub flood_wait_until: Option<Instant>,
}

impl ConnectionHandle {
    pub(crate) fn new(handle_id: u64, user_id: &str, client: Arc<dyn PlatformClient>) -> Self {
        Self {
            handle_id,
            user_id: user_id.to_string(),
            client,
            created_at: Utc::now(),
            last_used_at: Instant::now(),
            is_healthy: true,
            last_error: None,
            flood_wait_until: None,
        }
    }

    /// `now` 기준 flood wait 중인지
    pub fn is_flood_waiting(&self, now: Instant) -> bool {
        self.flood_wait_until.is_some_and(|until| until > now)
    }

    /// 트랜스포트가 열려 있는지
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("handle_id", &self.handle_id)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("is_healthy", &self.is_healthy)
            .field("last_error", &self.last_error)
            .field("flood_wait_until", &self.flood_wait_until)
            .finish()
    }
}

/// 임대가 어떻게 만들어졌는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOrigin {
    /// 기존 핸들 재사용
    Reused,
    /// 끊긴 트랜스포트를 재연결해 재사용
    Reconnected,
    /// 새 핸들 생성
    Created,
}

/// 호출자에게 빌려주는 클라이언트 접근
///
/// 비즈니스 작업(`call`)만 전달하고, 연결 수명은 풀이 관리한다.
#[derive(Clone)]
pub struct ClientLease {
    user_id: String,
    handle_id: u64,
    origin: LeaseOrigin,
    client: Arc<dyn PlatformClient>,
}

impl ClientLease {
    pub(crate) fn new(handle: &ConnectionHandle, origin: LeaseOrigin) -> Self {
        Self {
            user_id: handle.user_id.clone(),
            handle_id: handle.handle_id,
            origin,
            client: handle.client.clone(),
        }
    }

    /// 사용자 ID
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 핸들 ID
    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// 생성 경로
    pub fn origin(&self) -> LeaseOrigin {
        self.origin
    }

    /// 트랜스포트가 열려 있는지
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// 플랫폼 작업 전달
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        self.client.call(method, params).await
    }
}

impl fmt::Debug for ClientLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLease")
            .field("user_id", &self.user_id)
            .field("handle_id", &self.handle_id)
            .field("origin", &self.origin)
            .finish()
    }
}
