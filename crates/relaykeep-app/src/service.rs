//! 라이프사이클 파사드.
//!
//! 세션 매니저, 연결 풀, 연결 모니터를 하나의 API로 묶는다.
//! 비즈니스 워커는 플랫폼 작업 전에 [`LifecycleService::get_client`]를 호출하고,
//! 작업이 실패하면 [`LifecycleService::handle_client_error`]로 알린다.
//!
//! 사용자 단위 호출은 위임 전에 시작 이벤트를, 끝난 뒤 결과 이벤트를 남긴다.
//! 모든 이벤트에는 `operation` 상세가 붙는다. 실패는 호출자에게 돌려주기 전에
//! 모니터 이벤트로 먼저 기록된다.

use relaykeep_core::config::AppConfig;
use relaykeep_core::error::{CoreError, ErrorClass};
use relaykeep_core::models::connection::{details, ConnectionEventType, EventDetails};
use relaykeep_core::models::health::{GlobalStats, HealthReport, HealthSummary};
use relaykeep_core::models::session::SessionCacheStats;
use relaykeep_core::ports::cipher::CredentialCipher;
use relaykeep_core::ports::platform::PlatformClientFactory;
use relaykeep_core::ports::session_store::SessionStore;
use relaykeep_monitor::ConnectionMonitor;
use relaykeep_pool::{ClientLease, ConnectionPool, LeaseOrigin, PoolStats, Unavailable};
use relaykeep_session::SessionManager;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const OP_GET_CLIENT: &str = "get_client";
const OP_DISCONNECT: &str = "disconnect_client";
const OP_HANDLE_ERROR: &str = "handle_client_error";
const OP_STORE: &str = "store_session";
const OP_REMOVE: &str = "remove_session";
const OP_VALIDATE: &str = "validate_session";

/// 서비스 상태 (대시보드용)
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// 연결 풀
    pub pool: PoolStats,
    /// 세션 캐시
    pub sessions: SessionCacheStats,
    /// 모니터 요약
    pub monitor: HealthSummary,
    /// 마지막 롤업
    pub global: GlobalStats,
}

/// 라이프사이클 파사드
pub struct LifecycleService {
    sessions: Arc<SessionManager>,
    pool: Arc<ConnectionPool>,
    monitor: Arc<ConnectionMonitor>,
}

impl LifecycleService {
    /// 구성 요소로 생성
    pub fn new(
        sessions: Arc<SessionManager>,
        pool: Arc<ConnectionPool>,
        monitor: Arc<ConnectionMonitor>,
    ) -> Self {
        Self {
            sessions,
            pool,
            monitor,
        }
    }

    /// 설정과 포트 구현으로 전체 구성
    pub fn build(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        cipher: Arc<dyn CredentialCipher>,
        factory: Arc<dyn PlatformClientFactory>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            config.session.clone(),
            store,
            cipher,
            factory.clone(),
        ));
        let pool = Arc::new(ConnectionPool::new(config.pool.clone(), factory));
        let monitor = Arc::new(ConnectionMonitor::new(config.monitor.clone()));
        Self::new(sessions, pool, monitor)
    }

    /// 모니터 (알림 콜백 등록용)
    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// 연결 풀
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// 세션 매니저
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    async fn record(
        &self,
        user_id: &str,
        operation: &str,
        event_type: ConnectionEventType,
        mut details: EventDetails,
    ) {
        details.insert("operation".to_string(), json!(operation));
        self.monitor
            .record_connection_event(user_id, event_type, details)
            .await;
    }

    async fn begin(&self, user_id: &str, operation: &str) {
        self.record(
            user_id,
            operation,
            ConnectionEventType::Operation,
            details([("phase", json!("start"))]),
        )
        .await;
    }

    async fn finish(&self, user_id: &str, operation: &str) {
        self.record(
            user_id,
            operation,
            ConnectionEventType::Operation,
            details([("phase", json!("ok"))]),
        )
        .await;
    }

    async fn fail(&self, user_id: &str, operation: &str, reason: &str, error: Option<&CoreError>) {
        let mut failure = details([("reason", json!(reason))]);
        if let Some(e) = error {
            failure.insert("error".to_string(), json!(e.to_string()));
        }
        self.record(user_id, operation, ConnectionEventType::Error, failure)
            .await;
    }

    /// 플랫폼 작업용 클라이언트 획득
    ///
    /// 세션이 없으면 플랫폼에 접속하지 않고 `Unavailable::NoSession`.
    pub async fn get_client(&self, user_id: &str) -> Result<ClientLease, Unavailable> {
        self.record(
            user_id,
            OP_GET_CLIENT,
            ConnectionEventType::ConnectAttempt,
            EventDetails::new(),
        )
        .await;

        let credential = match self.sessions.get_session(user_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                self.record(
                    user_id,
                    OP_GET_CLIENT,
                    ConnectionEventType::ConnectFailed,
                    details([("reason", json!("no_session"))]),
                )
                .await;
                return Err(Unavailable::NoSession);
            }
            Err(e) => {
                warn!("세션 로드 실패: user_id={user_id}, {e}");
                self.record(
                    user_id,
                    OP_GET_CLIENT,
                    ConnectionEventType::ConnectFailed,
                    details([("reason", json!("session_error")), ("error", json!(e.to_string()))]),
                )
                .await;
                return Err(Unavailable::ConnectFailed(e));
            }
        };

        match self.pool.get_connection(user_id, &credential).await {
            Ok(lease) => {
                if lease.origin() == LeaseOrigin::Reconnected {
                    self.record(
                        user_id,
                        OP_GET_CLIENT,
                        ConnectionEventType::Reconnect,
                        EventDetails::new(),
                    )
                    .await;
                }
                self.record(
                    user_id,
                    OP_GET_CLIENT,
                    ConnectionEventType::ConnectSuccess,
                    details([
                        ("handle_id", json!(lease.handle_id())),
                        ("origin", json!(format!("{:?}", lease.origin()).to_lowercase())),
                    ]),
                )
                .await;
                Ok(lease)
            }
            Err(unavailable) => {
                self.record_unavailable(user_id, &unavailable).await;
                if unavailable.requires_reauthorization() {
                    self.drop_session(user_id).await;
                }
                Err(unavailable)
            }
        }
    }

    async fn record_unavailable(&self, user_id: &str, unavailable: &Unavailable) {
        let reason = match unavailable {
            Unavailable::NoSession => "no_session",
            Unavailable::FloodWait { .. } => "flood_wait",
            Unavailable::Unauthorized => "unauthorized",
            Unavailable::ConnectFailed(_) => "connect_failed",
            Unavailable::ShuttingDown => "shutting_down",
        };
        let mut failure = details([
            ("reason", json!(reason)),
            ("error", json!(unavailable.to_string())),
        ]);
        if let Some(class) = unavailable.error_class() {
            failure.insert("class".to_string(), json!(class.as_str()));
        }
        if let Unavailable::FloodWait { remaining_secs } = unavailable {
            failure.insert("remaining_secs".to_string(), json!(remaining_secs));
        }
        self.record(user_id, OP_GET_CLIENT, ConnectionEventType::ConnectFailed, failure)
            .await;

        // 연결 단계에서 받은 레이트 리밋
        if let Some(ErrorClass::RateLimited { seconds }) = unavailable.error_class() {
            self.record(
                user_id,
                OP_GET_CLIENT,
                ConnectionEventType::FloodWait,
                details([("seconds", json!(seconds)), ("source", json!("connect"))]),
            )
            .await;
        }
    }

    /// 인증이 무효화된 세션 삭제 (다음 get_client는 재인증 필요)
    async fn drop_session(&self, user_id: &str) {
        match self.sessions.remove_session(user_id).await {
            Ok(()) => info!("인증 무효로 세션 삭제: user_id={user_id}"),
            Err(e) => warn!("인증 무효 세션 삭제 실패: user_id={user_id}, {e}"),
        }
    }

    /// 작업 종료 후 연결 해제. 핸들이 있었으면 true
    pub async fn disconnect_client(&self, user_id: &str) -> bool {
        self.begin(user_id, OP_DISCONNECT).await;
        let removed = self.pool.remove_connection(user_id).await;
        self.record(
            user_id,
            OP_DISCONNECT,
            ConnectionEventType::Disconnect,
            details([("had_handle", json!(removed))]),
        )
        .await;
        removed
    }

    /// 플랫폼 작업 실패 보고
    ///
    /// 이벤트를 먼저 기록하고 풀에 분류를 맡긴다. 인증 무효면 세션도 삭제한다.
    /// 풀 처리가 끝나면 분류 결과를 결과 이벤트로 남긴다.
    pub async fn handle_client_error(&self, user_id: &str, error: &CoreError) -> ErrorClass {
        let class = error.class();
        match class {
            ErrorClass::RateLimited { seconds } => {
                self.record(
                    user_id,
                    OP_HANDLE_ERROR,
                    ConnectionEventType::FloodWait,
                    details([("seconds", json!(seconds)), ("error", json!(error.to_string()))]),
                )
                .await;
            }
            _ => {
                self.record(
                    user_id,
                    OP_HANDLE_ERROR,
                    ConnectionEventType::Error,
                    details([
                        ("class", json!(class.as_str())),
                        ("error", json!(error.to_string())),
                    ]),
                )
                .await;
            }
        }

        self.pool.handle_error(user_id, error).await;

        if class == ErrorClass::AuthorizationInvalid {
            self.drop_session(user_id).await;
            self.record(
                user_id,
                OP_HANDLE_ERROR,
                ConnectionEventType::Disconnect,
                details([("reason", json!(class.as_str()))]),
            )
            .await;
        }
        self.record(
            user_id,
            OP_HANDLE_ERROR,
            ConnectionEventType::Operation,
            details([("phase", json!("ok")), ("class", json!(class.as_str()))]),
        )
        .await;
        class
    }

    /// 세션 저장 (형식 오류는 `CoreError::Validation`)
    pub async fn store_user_session(&self, user_id: &str, credential: &str) -> Result<(), CoreError> {
        self.begin(user_id, OP_STORE).await;
        match self.sessions.store_session(user_id, credential).await {
            Ok(()) => {
                self.finish(user_id, OP_STORE).await;
                Ok(())
            }
            Err(e) => {
                self.fail(user_id, OP_STORE, "store_failed", Some(&e)).await;
                Err(e)
            }
        }
    }

    /// 세션 삭제 (열린 연결도 닫는다)
    pub async fn remove_user_session(&self, user_id: &str) -> Result<(), CoreError> {
        self.begin(user_id, OP_REMOVE).await;
        if self.pool.remove_connection(user_id).await {
            self.record(
                user_id,
                OP_REMOVE,
                ConnectionEventType::Disconnect,
                details([("reason", json!("session_removed"))]),
            )
            .await;
        }
        match self.sessions.remove_session(user_id).await {
            Ok(()) => {
                self.finish(user_id, OP_REMOVE).await;
                Ok(())
            }
            Err(e) => {
                self.fail(user_id, OP_REMOVE, "remove_failed", Some(&e)).await;
                Err(e)
            }
        }
    }

    /// 저장된 세션 검증
    pub async fn validate_user_session(&self, user_id: &str) -> bool {
        self.begin(user_id, OP_VALIDATE).await;
        let credential = match self.sessions.get_session(user_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                warn!("검증할 세션 없음: user_id={user_id}");
                self.fail(user_id, OP_VALIDATE, "no_session", None).await;
                return false;
            }
            Err(e) => {
                self.fail(user_id, OP_VALIDATE, "session_error", Some(&e)).await;
                return false;
            }
        };

        let valid = self.sessions.validate_session(user_id, &credential).await;
        if valid {
            self.finish(user_id, OP_VALIDATE).await;
        } else {
            self.fail(user_id, OP_VALIDATE, "invalid", None).await;
        }
        valid
    }

    /// 서비스 상태
    pub fn get_service_stats(&self) -> ServiceStats {
        let report = self.monitor.get_health_report();
        ServiceStats {
            pool: self.pool.get_stats(),
            sessions: self.sessions.stats(),
            monitor: report.summary,
            global: report.global_stats,
        }
    }

    /// 헬스 리포트
    pub fn get_health_report(&self) -> HealthReport {
        self.monitor.get_health_report()
    }

    /// 검증 실패가 누적된 세션 정리
    pub async fn cleanup_invalid_sessions(&self) -> usize {
        self.sessions.cleanup_invalid_sessions().await
    }

    /// 백그라운드 루프 시작 (헬스 체크, 롤업)
    pub fn start(&self) {
        self.pool.start();
        self.monitor.start();
        info!("라이프사이클 서비스 시작");
    }

    /// 종료: 풀 드레인 → 루프 정지
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.monitor.shutdown().await;
        info!("라이프사이클 서비스 종료");
    }
}
