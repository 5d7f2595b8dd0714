//! 백그라운드 헬스 체크.
//!
//! 한 번의 패스:
//! 1. 테이블 스냅샷 (잠금은 복사 동안만)
//! 2. flood wait 중인 핸들은 건너뛰고, 유휴 컷오프를 넘긴 핸들은 축출 대상으로 분류
//! 3. 나머지는 잠금 밖에서 재연결(끊긴 경우) + 인증 재확인
//! 4. 성공은 정상으로 복원, 실패는 유휴 대상과 함께 한 번에 축출
//!    (유휴 대상은 축출 직전에 `last_used_at`을 다시 확인)

use futures::future::join_all;
use relaykeep_core::ports::platform::AuthorizationStatus;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::ConnectionPool;
use crate::handle::ConnectionHandle;

/// 헬스 체크 한 패스의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckSummary {
    /// 점검한 핸들 수
    pub checked: usize,
    /// 비정상 → 정상으로 복원된 수
    pub restored: usize,
    /// 유휴 컷오프로 축출된 수
    pub evicted_idle: usize,
    /// 점검 실패로 축출된 수
    pub evicted_failed: usize,
    /// flood wait 또는 사용 중이라 건너뛴 수
    pub skipped: usize,
}

pub(super) fn spawn_loop(
    pool: Weak<ConnectionPool>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // 첫 틱은 즉시 완료되므로 건너뛴다
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(pool) = pool.upgrade() else {
                        break;
                    };
                    let summary = pool.run_health_check().await;
                    debug!(
                        "헬스 체크: checked={}, restored={}, evicted_idle={}, evicted_failed={}, skipped={}",
                        summary.checked,
                        summary.restored,
                        summary.evicted_idle,
                        summary.evicted_failed,
                        summary.skipped
                    );
                }
                _ = shutdown_rx.changed() => {
                    info!("헬스 체크 루프 종료");
                    break;
                }
            }
        }
    })
}

impl ConnectionPool {
    /// 헬스 체크 한 패스 실행
    pub async fn run_health_check(&self) -> HealthCheckSummary {
        let mut summary = HealthCheckSummary::default();
        if self.is_closing() {
            return summary;
        }

        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout();
        let snapshot: Vec<ConnectionHandle> = self.handles.lock().values().cloned().collect();

        let mut idle = Vec::new();
        let mut checks = Vec::new();
        for handle in snapshot {
            if handle.is_flood_waiting(now) {
                summary.skipped += 1;
                continue;
            }
            if now.duration_since(handle.last_used_at) >= idle_timeout {
                idle.push(handle);
                continue;
            }
            // 같은 사용자의 작업이 진행 중이면 이번 패스는 건너뛴다
            let Ok(guard) = self.user_lock(&handle.user_id).try_lock_owned() else {
                summary.skipped += 1;
                continue;
            };
            checks.push(async move {
                let result = self.verify(&handle).await;
                drop(guard);
                (handle, result)
            });
        }

        let mut restored = Vec::new();
        let mut failed = Vec::new();
        for (handle, result) in join_all(checks).await {
            summary.checked += 1;
            match result {
                Ok(()) => restored.push(handle),
                Err(reason) => {
                    warn!("헬스 체크 실패: user_id={}, {reason}", handle.user_id);
                    failed.push(handle);
                }
            }
        }

        let (evicted_idle, evicted_failed) = {
            let mut handles = self.handles.lock();
            for handle in &restored {
                if let Some(current) = handles.get_mut(&handle.user_id) {
                    if current.handle_id == handle.handle_id && !current.is_healthy {
                        current.is_healthy = true;
                        current.last_error = None;
                        summary.restored += 1;
                    }
                }
            }

            let mut take = |targets: Vec<ConnectionHandle>,
                            still_evictable: &dyn Fn(&ConnectionHandle) -> bool|
             -> Vec<ConnectionHandle> {
                targets
                    .into_iter()
                    .filter_map(|target| match handles.get(&target.user_id) {
                        Some(current)
                            if current.handle_id == target.handle_id
                                && still_evictable(current) =>
                        {
                            handles.remove(&target.user_id)
                        }
                        _ => None,
                    })
                    .collect()
            };
            // 점검을 기다리는 사이 다시 사용된 유휴 핸들은 남긴다
            let checked_at = Instant::now();
            let still_idle = |current: &ConnectionHandle| {
                checked_at.duration_since(current.last_used_at) >= idle_timeout
            };
            (take(idle, &still_idle), take(failed, &|_: &ConnectionHandle| true))
        };

        summary.evicted_idle = evicted_idle.len();
        summary.evicted_failed = evicted_failed.len();

        let evicted: Vec<&ConnectionHandle> =
            evicted_idle.iter().chain(evicted_failed.iter()).collect();
        self.counters
            .evicted
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        if !evicted.is_empty() {
            info!(
                "헬스 체크 축출: 유휴 {}개, 실패 {}개",
                summary.evicted_idle, summary.evicted_failed
            );
        }
        join_all(
            evicted
                .iter()
                .map(|handle| self.close_client(&handle.user_id, handle.client.as_ref())),
        )
        .await;

        self.prune_user_locks();
        summary
    }

    /// 재연결(필요 시) + 인증 재확인
    async fn verify(&self, handle: &ConnectionHandle) -> Result<(), String> {
        let limit = self.config.operation_timeout();

        if !handle.client.is_connected() {
            timeout(limit, handle.client.connect())
                .await
                .map_err(|_| "재연결 타임아웃".to_string())?
                .map_err(|e| format!("재연결 실패: {e}"))?;
            debug!("헬스 체크 재연결: user_id={}", handle.user_id);
        }

        match timeout(limit, handle.client.is_authorized()).await {
            Ok(Ok(AuthorizationStatus::Authorized)) => Ok(()),
            Ok(Ok(AuthorizationStatus::Unauthorized)) => Err("인증 만료".to_string()),
            Ok(Err(e)) => Err(format!("인증 확인 실패: {e}")),
            Err(_) => Err("인증 확인 타임아웃".to_string()),
        }
    }

    /// 핸들도 대기자도 없는 사용자 잠금 정리
    fn prune_user_locks(&self) {
        let live: HashSet<String> = self.handles.lock().keys().cloned().collect();
        self.user_locks
            .lock()
            .retain(|user_id, lock| live.contains(user_id) || Arc::strong_count(lock) > 1);
    }
}
