//! 전역 집계 롤업.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relaykeep_core::models::connection::ConnectionEventType;
use relaykeep_core::models::health::GlobalStats;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::monitor::ConnectionMonitor;

pub(crate) fn spawn_loop(
    monitor: Weak<ConnectionMonitor>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(monitor) = monitor.upgrade() else {
                        break;
                    };
                    monitor.rollup();
                }
                _ = shutdown_rx.changed() => {
                    info!("롤업 루프 종료");
                    break;
                }
            }
        }
    })
}

impl ConnectionMonitor {
    /// 전역 집계 재계산
    ///
    /// 연결 중인 사용자 수, 최근 1시간 에러/flood wait 수, 시도가 있는 사용자들의
    /// 평균 성공률(없으면 0). 결과는 헬스 리포트의 `global_stats`가 된다.
    /// 집계 전에 만료된 알림 억제 상태와 보존 기간이 지난 사용자를 정리한다.
    pub fn rollup(&self) -> GlobalStats {
        let now = Utc::now();
        let hour_ago = now - ChronoDuration::hours(1);
        self.prune(now);

        let (total_users, active_connections, rates) = {
            let metrics = self.metrics.lock();
            let rates: Vec<f64> = metrics.values().filter_map(|m| m.success_rate()).collect();
            (
                metrics.len(),
                metrics.values().filter(|m| m.is_connected()).count(),
                rates,
            )
        };

        let (errors_last_hour, flood_waits_last_hour) = {
            let events = self.events.lock();
            let recent = |kind: ConnectionEventType| {
                events
                    .values()
                    .flat_map(|buffer| buffer.iter())
                    .filter(|e| e.event_type == kind && e.timestamp >= hour_ago)
                    .count()
            };
            (
                recent(ConnectionEventType::Error),
                recent(ConnectionEventType::FloodWait),
            )
        };

        let average_success_rate = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };

        let stats = GlobalStats {
            total_users,
            active_connections,
            errors_last_hour,
            flood_waits_last_hour,
            average_success_rate,
            last_rollup: Some(now),
        };

        info!(
            "모니터 롤업: users={}, active={}, errors_1h={}, flood_waits_1h={}, avg_success={:.1}%",
            stats.total_users,
            stats.active_connections,
            stats.errors_last_hour,
            stats.flood_waits_last_hour,
            stats.average_success_rate * 100.0
        );

        *self.global.lock() = stats.clone();
        stats
    }

    /// 만료된 `alert_state` 항목과 보존 기간이 지난 비연결 사용자 제거
    fn prune(&self, now: DateTime<Utc>) {
        let window = ChronoDuration::seconds(self.config.error_alert_window_secs as i64);
        let expired_alerts = {
            let mut state = self.alert_state.lock();
            let before = state.len();
            state.retain(|_, fired| now - *fired < window);
            before - state.len()
        };

        let horizon = ChronoDuration::from_std(self.config.retention())
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        // events → metrics 순서로 잡는다. record_event는 둘을 동시에 잡지 않는다
        let stale_users = {
            let mut events = self.events.lock();
            let mut metrics = self.metrics.lock();
            let stale: Vec<String> = events
                .iter()
                .filter(|(user_id, buffer)| {
                    buffer.back().map_or(true, |last| last.timestamp < horizon)
                        && !metrics.get(*user_id).is_some_and(|m| m.is_connected())
                })
                .map(|(user_id, _)| user_id.clone())
                .collect();
            for user_id in &stale {
                events.remove(user_id);
                metrics.remove(user_id);
            }
            stale.len()
        };

        if expired_alerts > 0 || stale_users > 0 {
            debug!("모니터 정리: 만료 알림 상태 {expired_alerts}개, 비활성 사용자 {stale_users}명");
        }
    }
}
