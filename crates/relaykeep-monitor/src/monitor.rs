//! 연결 모니터.
//!
//! 풀/세션/파사드가 보내는 연결 이벤트를 사용자별 링 버퍼에 쌓고,
//! 상태 전이 테이블로 메트릭을 누적하며, 헬스 리포트와 알림을 만든다.
//!
//! 테이블마다 잠금이 따로 있다 (`events`, `metrics`, `alert_state`, `global`).
//! 알림 콜백은 모든 잠금을 놓은 뒤 호출한다.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use relaykeep_core::config::MonitorConfig;
use relaykeep_core::models::connection::{
    ConnectionEvent, ConnectionEventType, ConnectionMetrics, EventDetails,
};
use relaykeep_core::models::health::{
    Alert, AlertType, GlobalStats, HealthReport, HealthSummary, ProblematicUser,
};
use relaykeep_core::ports::alert::AlertCallback;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{alerts, metrics, rollup};

/// 연결 모니터
pub struct ConnectionMonitor {
    pub(crate) config: MonitorConfig,
    pub(crate) events: Mutex<HashMap<String, VecDeque<ConnectionEvent>>>,
    pub(crate) metrics: Mutex<HashMap<String, ConnectionMetrics>>,
    pub(crate) alert_state: Mutex<HashMap<(String, AlertType), DateTime<Utc>>>,
    callbacks: RwLock<Vec<Arc<dyn AlertCallback>>>,
    pub(crate) global: Mutex<GlobalStats>,
    shutdown_tx: watch::Sender<bool>,
    rollup_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionMonitor {
    /// 새 모니터 생성 (롤업 루프는 [`ConnectionMonitor::start`]로 시작)
    pub fn new(config: MonitorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            events: Mutex::new(HashMap::new()),
            metrics: Mutex::new(HashMap::new()),
            alert_state: Mutex::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
            global: Mutex::new(GlobalStats::default()),
            shutdown_tx,
            rollup_task: Mutex::new(None),
        }
    }

    /// 알림 콜백 등록
    pub fn add_alert_callback(&self, callback: Arc<dyn AlertCallback>) {
        debug!("알림 콜백 등록: {}", callback.name());
        self.callbacks.write().push(callback);
    }

    /// 현재 시각으로 이벤트 기록
    pub async fn record_connection_event(
        &self,
        user_id: &str,
        event_type: ConnectionEventType,
        details: EventDetails,
    ) {
        self.record_event(ConnectionEvent::now(user_id, event_type, details))
            .await;
    }

    /// 이벤트 기록
    ///
    /// 버퍼 추가 → 메트릭 갱신 → 알림 판정 → (잠금 해제 후) 콜백 호출.
    pub async fn record_event(&self, event: ConnectionEvent) {
        let capacity = self.config.event_buffer_size.max(1);
        let window_start =
            event.timestamp - ChronoDuration::seconds(self.config.error_alert_window_secs as i64);

        let recent_errors = {
            let mut events = self.events.lock();
            let buffer = events.entry(event.user_id.clone()).or_default();
            buffer.push_back(event.clone());
            while buffer.len() > capacity {
                buffer.pop_front();
            }
            if event.event_type == ConnectionEventType::Error {
                buffer
                    .iter()
                    .filter(|e| {
                        e.event_type == ConnectionEventType::Error && e.timestamp >= window_start
                    })
                    .count()
            } else {
                0
            }
        };

        metrics::apply(
            self.metrics.lock().entry(event.user_id.clone()).or_default(),
            &event,
        );

        let alerts = self.evaluate_alerts(&event, recent_errors);
        if alerts.is_empty() {
            return;
        }

        let callbacks: Vec<Arc<dyn AlertCallback>> = self.callbacks.read().clone();
        alerts::dispatch(&callbacks, &alerts).await;
    }

    /// 알림 조건 판정
    ///
    /// high_error_rate는 한 번 발생하면 같은 윈도우 동안 같은 사용자에 대해 다시 내지 않는다.
    fn evaluate_alerts(&self, event: &ConnectionEvent, recent_errors: usize) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if event.event_type == ConnectionEventType::Error
            && recent_errors >= self.config.error_alert_threshold
        {
            let window = ChronoDuration::seconds(self.config.error_alert_window_secs as i64);
            let key = (event.user_id.clone(), AlertType::HighErrorRate);
            let mut state = self.alert_state.lock();
            let suppressed = state
                .get(&key)
                .is_some_and(|fired| event.timestamp - *fired < window);
            if !suppressed {
                state.insert(key, event.timestamp);
                alerts.push(Alert {
                    alert_type: AlertType::HighErrorRate,
                    user_id: event.user_id.clone(),
                    message: format!(
                        "최근 {}초 동안 에러 {}건",
                        self.config.error_alert_window_secs, recent_errors
                    ),
                    timestamp: event.timestamp,
                    details: [
                        ("error_count".to_string(), json!(recent_errors)),
                        (
                            "window_secs".to_string(),
                            json!(self.config.error_alert_window_secs),
                        ),
                    ]
                    .into_iter()
                    .collect(),
                });
            }
        }

        if event.event_type == ConnectionEventType::FloodWait {
            if let Some(seconds) = event
                .wait_seconds()
                .filter(|s| *s >= self.config.long_flood_wait_secs)
            {
                alerts.push(Alert {
                    alert_type: AlertType::LongFloodWait,
                    user_id: event.user_id.clone(),
                    message: format!("flood wait {seconds}초"),
                    timestamp: event.timestamp,
                    details: [("seconds".to_string(), json!(seconds))]
                        .into_iter()
                        .collect(),
                });
            }
        }

        for alert in &alerts {
            info!(
                "알림 발생: {} user_id={} ({})",
                alert.alert_type.as_str(),
                alert.user_id,
                alert.message
            );
        }
        alerts
    }

    /// 사용자 이벤트 조회 (유형/시각 필터, 오래된 순 스냅샷)
    pub fn get_user_events(
        &self,
        user_id: &str,
        event_types: Option<&[ConnectionEventType]>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<ConnectionEvent> {
        let events = self.events.lock();
        let Some(buffer) = events.get(user_id) else {
            return Vec::new();
        };
        buffer
            .iter()
            .filter(|e| event_types.map_or(true, |types| types.contains(&e.event_type)))
            .filter(|e| since.map_or(true, |since| e.timestamp >= since))
            .cloned()
            .collect()
    }

    /// 사용자 메트릭 스냅샷
    pub fn get_user_metrics(&self, user_id: &str) -> Option<ConnectionMetrics> {
        self.metrics.lock().get(user_id).cloned()
    }

    /// 헬스 리포트
    pub fn get_health_report(&self) -> HealthReport {
        let limit = self.config.recent_events_limit;
        let metrics: HashMap<String, ConnectionMetrics> = self.metrics.lock().clone();

        let (total_events, mut recent_errors, mut recent_flood_waits) = {
            let events = self.events.lock();
            let total = events.values().map(VecDeque::len).sum::<usize>();
            let pick = |kind: ConnectionEventType| -> Vec<ConnectionEvent> {
                events
                    .values()
                    .flat_map(|buffer| buffer.iter().filter(move |e| e.event_type == kind))
                    .cloned()
                    .collect()
            };
            (
                total,
                pick(ConnectionEventType::Error),
                pick(ConnectionEventType::FloodWait),
            )
        };

        for list in [&mut recent_errors, &mut recent_flood_waits] {
            list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            list.truncate(limit);
        }

        let mut problematic_users: Vec<ProblematicUser> = metrics
            .iter()
            .filter_map(|(user_id, m)| {
                let rate = m.success_rate()?;
                (rate < self.config.problematic_success_rate).then(|| ProblematicUser {
                    user_id: user_id.clone(),
                    success_rate: rate,
                    total_connections: m.total_connections,
                    failed_connections: m.failed_connections,
                    total_errors: m.total_errors,
                })
            })
            .collect();
        problematic_users.sort_by(|a, b| {
            a.success_rate
                .total_cmp(&b.success_rate)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let summary = HealthSummary {
            total_users: metrics.len(),
            active_connections: metrics.values().filter(|m| m.is_connected()).count(),
            total_events,
            total_errors: metrics.values().map(|m| m.total_errors).sum(),
            total_flood_waits: metrics.values().map(|m| m.total_flood_waits).sum(),
            problematic_users: problematic_users.len(),
        };

        HealthReport {
            summary,
            recent_errors,
            recent_flood_waits,
            problematic_users,
            global_stats: self.global.lock().clone(),
            generated_at: Utc::now(),
        }
    }

    /// 롤업 루프 시작 (이미 실행 중이면 무시)
    pub fn start(self: &Arc<Self>) {
        let mut task = self.rollup_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(rollup::spawn_loop(
            Arc::downgrade(self),
            self.config.rollup_interval(),
            self.shutdown_tx.subscribe(),
        ));
        info!("롤업 루프 시작: {}초 주기", self.config.rollup_interval_secs);
    }

    /// 롤업 루프 정지 및 대기
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.rollup_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("롤업 태스크 종료 대기 실패: {e}");
            }
        }
        info!("연결 모니터 종료");
    }
}
