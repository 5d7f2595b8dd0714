//! # relaykeep-monitor
//!
//! 연결 모니터. 다른 컴포넌트와 독립적으로 연결 이벤트를 받아
//! 사용자별 메트릭, 헬스 리포트, 알림을 만든다.
//!
//! - [`monitor`]: 이벤트 기록, 조회, 헬스 리포트, 알림 판정
//! - [`metrics`]: 이벤트 → 메트릭 상태 전이
//! - [`alerts`]: 콜백 전달, 로그 콜백
//! - `rollup`: 전역 집계 루프

pub mod alerts;
pub mod metrics;
pub mod monitor;
mod rollup;

pub use alerts::LogAlertCallback;
pub use monitor::ConnectionMonitor;
