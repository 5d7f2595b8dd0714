//! 이벤트 → 메트릭 상태 전이.

use relaykeep_core::models::connection::{ConnectionEvent, ConnectionEventType, ConnectionMetrics};

/// 이벤트 하나를 메트릭에 반영
///
/// | 이벤트 | 효과 |
/// |---|---|
/// | ConnectAttempt | `total_connections += 1` |
/// | ConnectSuccess | `successful_connections += 1`, `last_connection_time`, 연결 시작 시각 (미설정 시) |
/// | ConnectFailed | `failed_connections += 1`, `last_error_time` |
/// | Disconnect | 유지 시간을 이동 평균에 반영, 연결 시작 시각 해제 |
/// | Reconnect | `total_reconnections += 1` |
/// | Error | `total_errors += 1`, `last_error_time` |
/// | FloodWait | `total_flood_waits += 1` |
pub fn apply(metrics: &mut ConnectionMetrics, event: &ConnectionEvent) {
    let t = event.timestamp;
    match event.event_type {
        ConnectionEventType::ConnectAttempt => {
            metrics.total_connections += 1;
        }
        ConnectionEventType::ConnectSuccess => {
            metrics.successful_connections += 1;
            metrics.last_connection_time = Some(t);
            if metrics.current_connection_start.is_none() {
                metrics.current_connection_start = Some(t);
            }
        }
        ConnectionEventType::ConnectFailed => {
            metrics.failed_connections += 1;
            metrics.last_error_time = Some(t);
        }
        ConnectionEventType::Disconnect => {
            if let Some(start) = metrics.current_connection_start.take() {
                let duration = (t - start).num_milliseconds().max(0) as f64 / 1000.0;
                metrics.completed_connections += 1;
                metrics.average_connection_duration += (duration
                    - metrics.average_connection_duration)
                    / metrics.completed_connections as f64;
            }
        }
        ConnectionEventType::Reconnect => {
            metrics.total_reconnections += 1;
        }
        ConnectionEventType::Error => {
            metrics.total_errors += 1;
            metrics.last_error_time = Some(t);
        }
        ConnectionEventType::FloodWait => {
            metrics.total_flood_waits += 1;
        }
        ConnectionEventType::Operation => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use relaykeep_core::models::connection::EventDetails;

    fn event(kind: ConnectionEventType, offset_secs: i64) -> ConnectionEvent {
        let base = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ConnectionEvent {
            user_id: "u1".into(),
            event_type: kind,
            timestamp: base + Duration::seconds(offset_secs),
            details: EventDetails::new(),
        }
    }

    #[test]
    fn connect_cycle_updates_running_average() {
        let mut m = ConnectionMetrics::default();
        apply(&mut m, &event(ConnectionEventType::ConnectAttempt, 0));
        apply(&mut m, &event(ConnectionEventType::ConnectSuccess, 0));
        assert!(m.is_connected());
        apply(&mut m, &event(ConnectionEventType::Disconnect, 10));
        assert!(!m.is_connected());
        assert_eq!(m.average_connection_duration, 10.0);

        apply(&mut m, &event(ConnectionEventType::ConnectAttempt, 100));
        apply(&mut m, &event(ConnectionEventType::ConnectSuccess, 100));
        apply(&mut m, &event(ConnectionEventType::Disconnect, 120));
        assert_eq!(m.average_connection_duration, 15.0);
        assert_eq!(m.completed_connections, 2);
        assert_eq!(m.success_rate(), Some(1.0));
    }

    #[test]
    fn repeated_success_keeps_original_start() {
        let mut m = ConnectionMetrics::default();
        apply(&mut m, &event(ConnectionEventType::ConnectSuccess, 0));
        apply(&mut m, &event(ConnectionEventType::ConnectSuccess, 30));
        apply(&mut m, &event(ConnectionEventType::Disconnect, 60));
        assert_eq!(m.average_connection_duration, 60.0);
        assert_eq!(m.successful_connections, 2);
    }

    #[test]
    fn disconnect_without_start_is_ignored() {
        let mut m = ConnectionMetrics::default();
        apply(&mut m, &event(ConnectionEventType::Disconnect, 5));
        assert_eq!(m.completed_connections, 0);
        assert_eq!(m.average_connection_duration, 0.0);
    }

    #[test]
    fn failures_and_errors_set_last_error_time() {
        let mut m = ConnectionMetrics::default();
        apply(&mut m, &event(ConnectionEventType::ConnectFailed, 1));
        apply(&mut m, &event(ConnectionEventType::Error, 2));
        apply(&mut m, &event(ConnectionEventType::FloodWait, 3));
        apply(&mut m, &event(ConnectionEventType::Reconnect, 4));

        assert_eq!(m.failed_connections, 1);
        assert_eq!(m.total_errors, 1);
        assert_eq!(m.total_flood_waits, 1);
        assert_eq!(m.total_reconnections, 1);
        assert_eq!(m.last_error_time, Some(event(ConnectionEventType::Error, 2).timestamp));
    }

    #[test]
    fn operation_markers_leave_metrics_untouched() {
        let mut m = ConnectionMetrics::default();
        apply(&mut m, &event(ConnectionEventType::Operation, 0));
        apply(&mut m, &event(ConnectionEventType::Operation, 1));
        assert_eq!(m, ConnectionMetrics::default());
    }
}
