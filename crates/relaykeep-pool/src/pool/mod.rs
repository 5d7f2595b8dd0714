//! 연결 풀.
//!
//! 사용자별 인증 클라이언트 핸들을 최대 하나씩 캐시한다.
//!
//! # 잠금
//! - `handles`: 핸들 테이블. 메모리 갱신 동안만 잡고, 네트워크 호출 중에는 잡지 않는다.
//! - 사용자별 `tokio::sync::Mutex`: 같은 사용자의 풀 작업을 직렬화한다.
//!   동시에 들어온 `get_connection`은 먼저 들어온 호출이 만든 핸들을 재사용한다.
//!
//! 핸들 상태 변경은 항상 `handle_id`를 확인한 뒤 반영한다. 잠금을 놓은 사이
//! 다른 경로에서 교체·축출된 핸들을 덮어쓰지 않기 위함이다.
//!
//! # 모듈 구조
//! - `health_check`: 백그라운드 헬스 체크 루프

mod health_check;

pub use health_check::HealthCheckSummary;

use futures::future::join_all;
use parking_lot::Mutex;
use relaykeep_core::config::PoolConfig;
use relaykeep_core::error::{CoreError, ErrorClass};
use relaykeep_core::models::session::SessionCredential;
use relaykeep_core::ports::platform::{AuthorizationStatus, PlatformClient, PlatformClientFactory};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::Unavailable;
use crate::handle::{ClientLease, ConnectionHandle, LeaseOrigin};

/// 누적 카운터
#[derive(Default)]
struct Counters {
    created: AtomicU64,
    reused: AtomicU64,
    reconnected: AtomicU64,
    evicted: AtomicU64,
    removed: AtomicU64,
    failed: AtomicU64,
    flood_wait_rejections: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolTotals {
        PoolTotals {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            reconnected: self.reconnected.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            flood_wait_rejections: self.flood_wait_rejections.load(Ordering::Relaxed),
        }
    }
}

/// 풀 누적 통계
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PoolTotals {
    /// 생성된 핸들 수
    pub created: u64,
    /// 재사용 수
    pub reused: u64,
    /// 재연결 후 재사용 수
    pub reconnected: u64,
    /// 용량/헬스 체크로 축출된 수
    pub evicted: u64,
    /// 명시적으로 제거된 수
    pub removed: u64,
    /// 생성 실패 수
    pub failed: u64,
    /// flood wait로 거절된 요청 수
    pub flood_wait_rejections: u64,
}

/// 풀 상태
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    /// 현재 핸들 수
    pub current: usize,
    /// 정상 핸들 수
    pub healthy: usize,
    /// flood wait 중인 핸들 수
    pub flood_waiting: usize,
    /// 최대 핸들 수
    pub max_connections: usize,
    /// 누적 통계
    pub totals: PoolTotals,
}

/// 연결 풀
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn PlatformClientFactory>,
    handles: Mutex<HashMap<String, ConnectionHandle>>,
    user_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    next_handle_id: AtomicU64,
    closing: AtomicBool,
    counters: Counters,
    shutdown_tx: watch::Sender<bool>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// 새 풀 생성 (헬스 체크 루프는 [`ConnectionPool::start`]로 시작)
    pub fn new(config: PoolConfig, factory: Arc<dyn PlatformClientFactory>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        debug!(
            "연결 풀 생성: max_connections={}, health_check={}s, idle_timeout={}s",
            config.max_connections, config.health_check_interval_secs, config.idle_timeout_secs
        );
        Self {
            config,
            factory,
            handles: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            counters: Counters::default(),
            shutdown_tx,
            health_task: Mutex::new(None),
        }
    }

    fn max_connections(&self) -> usize {
        self.config.max_connections.max(1)
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// 사용자별 직렬화 잠금
    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.user_locks
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// 클라이언트 획득
    ///
    /// 정상 핸들이 있으면 재사용하고(끊긴 트랜스포트는 재연결), 없으면 새로 만든다.
    /// flood wait 중이면 기다리지 않고 바로 `Unavailable::FloodWait`를 반환한다.
    pub async fn get_connection(
        &self,
        user_id: &str,
        credential: &SessionCredential,
    ) -> Result<ClientLease, Unavailable> {
        if self.is_closing() {
            return Err(Unavailable::ShuttingDown);
        }

        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock().await;

        if self.is_closing() {
            return Err(Unavailable::ShuttingDown);
        }

        let existing = self.handles.lock().get(user_id).cloned();
        if let Some(handle) = existing {
            let now = Instant::now();
            if let Some(until) = handle.flood_wait_until.filter(|until| *until > now) {
                let remaining = until.duration_since(now);
                let remaining_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                Counters::bump(&self.counters.flood_wait_rejections);
                debug!("flood wait 중: user_id={user_id}, {remaining_secs}초 남음");
                return Err(Unavailable::FloodWait { remaining_secs });
            }

            if handle.is_healthy {
                if let Some(lease) = self.try_reuse(&handle).await {
                    return Ok(lease);
                }
            } else {
                debug!(
                    "비정상 핸들 폐기: user_id={user_id}, last_error={:?}",
                    handle.last_error
                );
            }
            self.discard(&handle).await;
        }

        self.create(user_id, credential).await
    }

    /// 기존 핸들 재사용 시도. 재사용할 수 없으면 None
    async fn try_reuse(&self, handle: &ConnectionHandle) -> Option<ClientLease> {
        let user_id = handle.user_id.as_str();
        let limit = self.config.operation_timeout();
        let mut origin = LeaseOrigin::Reused;

        if !handle.client.is_connected() {
            match timeout(limit, handle.client.connect()).await {
                Ok(Ok(())) => {
                    debug!("트랜스포트 재연결: user_id={user_id}");
                    origin = LeaseOrigin::Reconnected;
                }
                Ok(Err(e)) => {
                    warn!("재연결 실패: user_id={user_id}, {e}");
                    return None;
                }
                Err(_) => {
                    warn!("재연결 타임아웃: user_id={user_id}");
                    return None;
                }
            }
        }

        match timeout(limit, handle.client.is_authorized()).await {
            Ok(Ok(AuthorizationStatus::Authorized)) => {}
            Ok(Ok(AuthorizationStatus::Unauthorized)) => {
                info!("재사용 핸들 인증 만료: user_id={user_id}");
                return None;
            }
            Ok(Err(e)) => {
                warn!("재사용 핸들 인증 확인 실패: user_id={user_id}, {e}");
                return None;
            }
            Err(_) => {
                warn!("재사용 핸들 인증 확인 타임아웃: user_id={user_id}");
                return None;
            }
        }

        let mut handles = self.handles.lock();
        match handles.get_mut(user_id) {
            Some(current) if current.handle_id == handle.handle_id => {
                current.last_used_at = Instant::now();
                current.flood_wait_until = None;
                current.is_healthy = true;
                current.last_error = None;
                match origin {
                    LeaseOrigin::Reconnected => Counters::bump(&self.counters.reconnected),
                    _ => Counters::bump(&self.counters.reused),
                }
                Some(ClientLease::new(current, origin))
            }
            // 확인하는 사이 축출됨
            _ => None,
        }
    }

    /// 새 핸들 생성
    async fn create(
        &self,
        user_id: &str,
        credential: &SessionCredential,
    ) -> Result<ClientLease, Unavailable> {
        let limit = self.config.operation_timeout();

        let client = self.factory.create(user_id, credential).map_err(|e| {
            Counters::bump(&self.counters.failed);
            Unavailable::ConnectFailed(e)
        })?;

        let connected = match timeout(limit, client.connect()).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::timeout("connect", limit)),
        };
        if let Err(e) = connected {
            warn!("연결 실패: user_id={user_id}, {e}");
            Counters::bump(&self.counters.failed);
            self.close_client(user_id, client.as_ref()).await;
            return Err(Unavailable::ConnectFailed(e));
        }

        let status = match timeout(limit, client.is_authorized()).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::timeout("authorize", limit)),
        };
        match status {
            Ok(AuthorizationStatus::Authorized) => {}
            Ok(AuthorizationStatus::Unauthorized) => {
                info!("새 연결 인증 안 됨: user_id={user_id}");
                Counters::bump(&self.counters.failed);
                self.close_client(user_id, client.as_ref()).await;
                return Err(Unavailable::Unauthorized);
            }
            Err(e) => {
                warn!("새 연결 인증 확인 실패: user_id={user_id}, {e}");
                Counters::bump(&self.counters.failed);
                self.close_client(user_id, client.as_ref()).await;
                return Err(Unavailable::ConnectFailed(e));
            }
        }

        let handle_id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        let handle = ConnectionHandle::new(handle_id, user_id, client.clone());
        let lease = ClientLease::new(&handle, LeaseOrigin::Created);

        let mut to_close = Vec::new();
        let inserted = {
            let mut handles = self.handles.lock();
            if self.is_closing() {
                false
            } else {
                if !handles.contains_key(user_id) && handles.len() >= self.max_connections() {
                    if let Some(victim) = select_victim(&handles) {
                        if let Some(evicted) = handles.remove(&victim) {
                            to_close.push(evicted);
                        }
                    }
                }
                if let Some(replaced) = handles.insert(user_id.to_string(), handle) {
                    to_close.push(replaced);
                }
                true
            }
        };

        for old in &to_close {
            if old.user_id != user_id {
                Counters::bump(&self.counters.evicted);
                info!(
                    "용량 초과로 축출: user_id={}, healthy={}",
                    old.user_id, old.is_healthy
                );
            }
        }
        join_all(
            to_close
                .iter()
                .map(|old| self.close_client(&old.user_id, old.client.as_ref())),
        )
        .await;

        if !inserted {
            self.close_client(user_id, client.as_ref()).await;
            return Err(Unavailable::ShuttingDown);
        }

        Counters::bump(&self.counters.created);
        info!("새 연결 생성: user_id={user_id}, handle_id={handle_id}");
        Ok(lease)
    }

    /// 테이블에서 핸들을 빼고(같은 핸들일 때만) 트랜스포트를 닫는다
    async fn discard(&self, handle: &ConnectionHandle) {
        let removed = {
            let mut handles = self.handles.lock();
            match handles.get(&handle.user_id) {
                Some(current) if current.handle_id == handle.handle_id => {
                    handles.remove(&handle.user_id)
                }
                _ => None,
            }
        };
        if let Some(removed) = removed {
            self.close_client(&removed.user_id, removed.client.as_ref())
                .await;
        }
    }

    /// 트랜스포트 종료 (타임아웃 적용, 실패는 로그만)
    async fn close_client(&self, user_id: &str, client: &dyn PlatformClient) {
        if !client.is_connected() {
            return;
        }
        let limit = self.config.operation_timeout();
        match timeout(limit, client.disconnect()).await {
            Ok(Ok(())) => debug!("트랜스포트 종료: user_id={user_id}"),
            Ok(Err(e)) => warn!("트랜스포트 종료 실패: user_id={user_id}, {e}"),
            Err(_) => warn!("트랜스포트 종료 타임아웃: user_id={user_id}"),
        }
    }

    /// 핸들 제거 (없어도 안전). 제거했으면 true
    pub async fn remove_connection(&self, user_id: &str) -> bool {
        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock().await;

        let removed = self.handles.lock().remove(user_id);
        match removed {
            Some(handle) => {
                self.close_client(user_id, handle.client.as_ref()).await;
                Counters::bump(&self.counters.removed);
                info!("연결 제거: user_id={user_id}");
                true
            }
            None => false,
        }
    }

    /// 에러 분류 후 핸들 상태 반영
    ///
    /// - 레이트 리밋: `flood_wait_until` 설정 (핸들은 유효)
    /// - 인증 무효: 핸들 제거
    /// - 그 외: 비정상 표시 (다음 헬스 체크나 `get_connection`에서 복구/교체)
    pub async fn handle_error(&self, user_id: &str, error: &CoreError) -> ErrorClass {
        let class = error.class();
        match class {
            ErrorClass::RateLimited { seconds } => {
                let until = self.flood_wait_deadline(seconds);
                let found = self.update_handle(user_id, |handle| {
                    handle.flood_wait_until = Some(until);
                    handle.last_error = Some(error.to_string());
                });
                info!("flood wait 설정: user_id={user_id}, {seconds}초, handle={found}");
            }
            ErrorClass::AuthorizationInvalid => {
                self.remove_connection(user_id).await;
            }
            ErrorClass::TransportMigration | ErrorClass::Generic => {
                let found = self.update_handle(user_id, |handle| {
                    handle.is_healthy = false;
                    handle.last_error = Some(error.to_string());
                });
                debug!(
                    "핸들 비정상 표시: user_id={user_id}, class={}, handle={found}",
                    class.as_str()
                );
            }
        }
        class
    }

    /// flood wait 종료 시각 (상한 적용)
    fn flood_wait_deadline(&self, seconds: u64) -> Instant {
        let cap = self.config.max_flood_wait();
        let wait = std::time::Duration::from_secs(seconds).min(cap);
        let now = Instant::now();
        now.checked_add(wait)
            .or_else(|| now.checked_add(cap))
            .unwrap_or(now)
    }

    fn update_handle(&self, user_id: &str, f: impl FnOnce(&mut ConnectionHandle)) -> bool {
        match self.handles.lock().get_mut(user_id) {
            Some(handle) => {
                f(handle);
                true
            }
            None => false,
        }
    }

    /// 풀 상태
    pub fn get_stats(&self) -> PoolStats {
        let now = Instant::now();
        let handles = self.handles.lock();
        PoolStats {
            current: handles.len(),
            healthy: handles.values().filter(|h| h.is_healthy).count(),
            flood_waiting: handles.values().filter(|h| h.is_flood_waiting(now)).count(),
            max_connections: self.max_connections(),
            totals: self.counters.snapshot(),
        }
    }

    /// 사용자 핸들 스냅샷 (진단용)
    pub fn handle(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.handles.lock().get(user_id).cloned()
    }

    /// 헬스 체크 루프 시작 (이미 실행 중이면 무시)
    pub fn start(self: &Arc<Self>) {
        if self.is_closing() {
            warn!("종료 중인 풀은 시작할 수 없음");
            return;
        }
        let mut task = self.health_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(health_check::spawn_loop(
            Arc::downgrade(self),
            self.config.health_check_interval(),
            self.shutdown_tx.subscribe(),
        ));
        info!(
            "헬스 체크 루프 시작: {}초 주기",
            self.config.health_check_interval_secs
        );
    }

    /// 풀 종료
    ///
    /// 새 항목 수락 중단 → 모든 핸들 종료 → 헬스 체크 루프 정지/대기 순서로 진행한다.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);

        let drained: Vec<ConnectionHandle> =
            self.handles.lock().drain().map(|(_, handle)| handle).collect();
        let count = drained.len();

        // 진행 중인 같은 사용자 작업(헬스 체크 점검 등)이 끝난 뒤 닫는다
        join_all(drained.iter().map(|handle| async move {
            let user_lock = self.user_lock(&handle.user_id);
            let _guard = user_lock.lock().await;
            self.close_client(&handle.user_id, handle.client.as_ref())
                .await;
        }))
        .await;

        let _ = self.shutdown_tx.send(true);
        let task = self.health_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("헬스 체크 태스크 종료 대기 실패: {e}");
            }
        }

        info!("연결 풀 종료: 핸들 {count}개 닫음");
    }
}

/// 축출 대상: 비정상 핸들 우선, 그다음 가장 오래 사용되지 않은 핸들
fn select_victim(handles: &HashMap<String, ConnectionHandle>) -> Option<String> {
    handles
        .values()
        .min_by_key(|h| (h.is_healthy, h.last_used_at))
        .map(|h| h.user_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaykeep_core::testing::{credential, StubFailure, StubPlatform};
    use std::time::Duration;

    fn pool_with(platform: &StubPlatform, max_connections: usize) -> ConnectionPool {
        let config = PoolConfig {
            max_connections,
            ..PoolConfig::default()
        };
        ConnectionPool::new(config, Arc::new(platform.clone()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_transport() {
        let platform = StubPlatform::new();
        platform.set_connect_delay(Duration::from_millis(50));
        let pool = Arc::new(pool_with(&platform, 10));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.get_connection("u1", &credential(1)).await })
            })
            .collect();

        let mut handle_ids = Vec::new();
        for task in tasks {
            handle_ids.push(task.await.unwrap().unwrap().handle_id());
        }

        assert_eq!(platform.created(), 1);
        assert_eq!(platform.created_for("u1"), 1);
        handle_ids.dedup();
        assert_eq!(handle_ids.len(), 1);
        assert_eq!(pool.get_stats().totals.reused, 7);
    }

    #[tokio::test]
    async fn healthy_handle_is_reused() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);

        let first = pool.get_connection("u1", &credential(1)).await.unwrap();
        let second = pool.get_connection("u1", &credential(1)).await.unwrap();

        assert_eq!(first.origin(), LeaseOrigin::Created);
        assert_eq!(second.origin(), LeaseOrigin::Reused);
        assert_eq!(first.handle_id(), second.handle_id());
        assert_eq!(platform.created(), 1);
    }

    #[tokio::test]
    async fn dropped_transport_is_reconnected() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);

        pool.get_connection("u1", &credential(1)).await.unwrap();
        platform.drop_transport("u1");

        let lease = pool.get_connection("u1", &credential(1)).await.unwrap();
        assert_eq!(lease.origin(), LeaseOrigin::Reconnected);
        assert!(lease.is_connected());
        assert_eq!(platform.created(), 1);
        assert_eq!(platform.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_rate_limit_is_capped() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);
        pool.get_connection("u1", &credential(1)).await.unwrap();

        let class = pool
            .handle_error(
                "u1",
                &CoreError::RateLimit {
                    retry_after_secs: u64::MAX,
                },
            )
            .await;
        assert_eq!(class, ErrorClass::RateLimited { seconds: u64::MAX });

        match pool.get_connection("u1", &credential(1)).await {
            Err(Unavailable::FloodWait { remaining_secs }) => {
                assert_eq!(remaining_secs, PoolConfig::default().max_flood_wait_secs)
            }
            other => panic!("expected flood wait, got {other:?}"),
        }

        tokio::time::advance(PoolConfig::default().max_flood_wait() + Duration::from_secs(1)).await;
        let lease = pool.get_connection("u1", &credential(1)).await.unwrap();
        assert_eq!(lease.origin(), LeaseOrigin::Reused);
    }

    #[tokio::test(start_paused = true)]
    async fn flood_wait_rejects_until_deadline() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);
        pool.get_connection("u1", &credential(1)).await.unwrap();

        let class = pool
            .handle_error("u1", &CoreError::RateLimit { retry_after_secs: 10 })
            .await;
        assert_eq!(class, ErrorClass::RateLimited { seconds: 10 });

        tokio::time::advance(Duration::from_secs(5)).await;
        match pool.get_connection("u1", &credential(1)).await {
            Err(Unavailable::FloodWait { remaining_secs }) => assert_eq!(remaining_secs, 5),
            other => panic!("expected flood wait, got {other:?}"),
        }
        assert_eq!(pool.get_stats().flood_waiting, 1);
        let checks_before = platform.auth_checks();

        tokio::time::advance(Duration::from_secs(6)).await;
        let lease = pool.get_connection("u1", &credential(1)).await.unwrap();
        assert_eq!(lease.origin(), LeaseOrigin::Reused);
        assert!(platform.auth_checks() > checks_before);
        assert!(pool.handle("u1").unwrap().flood_wait_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_prefers_unhealthy_handle() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 2);

        pool.get_connection("u1", &credential(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        pool.get_connection("u2", &credential(2)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        pool.handle_error("u2", &CoreError::Network("reset".into()))
            .await;
        pool.get_connection("u3", &credential(3)).await.unwrap();

        assert!(pool.handle("u1").is_some());
        assert!(pool.handle("u2").is_none());
        assert!(pool.handle("u3").is_some());
        let stats = pool.get_stats();
        assert_eq!(stats.current, 2);
        assert_eq!(stats.totals.evicted, 1);
        assert_eq!(platform.open_transports(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_falls_back_to_least_recently_used() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 2);

        pool.get_connection("u1", &credential(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        pool.get_connection("u2", &credential(2)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        // u1 사용 → u2가 가장 오래됨
        pool.get_connection("u1", &credential(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        pool.get_connection("u3", &credential(3)).await.unwrap();

        assert!(pool.handle("u1").is_some());
        assert!(pool.handle("u2").is_none());
        assert_eq!(pool.get_stats().totals.evicted, 1);
    }

    #[tokio::test]
    async fn unauthorized_creation_is_not_cached() {
        let platform = StubPlatform::new();
        platform.set_authorized("u1", false);
        let pool = pool_with(&platform, 10);

        let err = pool.get_connection("u1", &credential(1)).await.unwrap_err();
        assert!(matches!(err, Unavailable::Unauthorized));
        assert!(pool.handle("u1").is_none());
        assert_eq!(platform.open_transports(), 0);
        assert_eq!(pool.get_stats().totals.failed, 1);
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let platform = StubPlatform::new();
        platform.fail_connect("u1", Some(StubFailure::RateLimit(42)));
        let pool = pool_with(&platform, 10);

        let err = pool.get_connection("u1", &credential(1)).await.unwrap_err();
        assert_eq!(err.error_class(), Some(ErrorClass::RateLimited { seconds: 42 }));
        assert_eq!(pool.get_stats().current, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_bounded() {
        let platform = StubPlatform::new();
        platform.set_connect_delay(Duration::from_secs(600));
        let pool = pool_with(&platform, 10);

        let err = pool.get_connection("u1", &credential(1)).await.unwrap_err();
        match err {
            Unavailable::ConnectFailed(CoreError::Timeout { operation, .. }) => {
                assert_eq!(operation, "connect")
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_on_reuse_falls_through_to_creation() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);
        pool.get_connection("u1", &credential(1)).await.unwrap();

        platform.set_authorized("u1", false);
        let err = pool.get_connection("u1", &credential(1)).await.unwrap_err();

        assert!(matches!(err, Unavailable::Unauthorized));
        assert_eq!(platform.created(), 2);
        assert!(pool.handle("u1").is_none());
        assert_eq!(platform.open_transports(), 0);
    }

    #[tokio::test]
    async fn unhealthy_handle_is_replaced() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);
        let first = pool.get_connection("u1", &credential(1)).await.unwrap();

        let class = pool
            .handle_error(
                "u1",
                &CoreError::Migration {
                    endpoint: "dc2".into(),
                },
            )
            .await;
        assert_eq!(class, ErrorClass::TransportMigration);
        assert!(!pool.handle("u1").unwrap().is_healthy);

        let second = pool.get_connection("u1", &credential(1)).await.unwrap();
        assert_ne!(first.handle_id(), second.handle_id());
        assert_eq!(second.origin(), LeaseOrigin::Created);
        assert_eq!(platform.open_transports(), 1);
    }

    #[tokio::test]
    async fn authorization_error_removes_handle() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);
        pool.get_connection("u1", &credential(1)).await.unwrap();

        let class = pool
            .handle_error("u1", &CoreError::Auth("revoked".into()))
            .await;

        assert_eq!(class, ErrorClass::AuthorizationInvalid);
        assert!(pool.handle("u1").is_none());
        assert_eq!(platform.open_transports(), 0);
    }

    #[tokio::test]
    async fn remove_is_safe_without_handle() {
        let platform = StubPlatform::new();
        let pool = pool_with(&platform, 10);

        assert!(!pool.remove_connection("ghost").await);
        pool.get_connection("u1", &credential(1)).await.unwrap();
        assert!(pool.remove_connection("u1").await);
        assert!(!pool.remove_connection("u1").await);
        assert_eq!(platform.disconnects(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything_and_rejects_new_requests() {
        let platform = StubPlatform::new();
        let pool = Arc::new(pool_with(&platform, 10));
        pool.start();

        pool.get_connection("u1", &credential(1)).await.unwrap();
        pool.get_connection("u2", &credential(2)).await.unwrap();
        assert_eq!(platform.open_transports(), 2);

        pool.shutdown().await;

        assert_eq!(platform.open_transports(), 0);
        assert_eq!(pool.get_stats().current, 0);
        assert!(matches!(
            pool.get_connection("u1", &credential(1)).await,
            Err(Unavailable::ShuttingDown)
        ));
    }
}
