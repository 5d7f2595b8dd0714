//! # relaykeep-app
//!
//! 라이프사이클 파사드와 프로세스 와이어링.
//!
//! - [`service`]: 세션/풀/모니터를 묶는 `LifecycleService`
//! - [`lifecycle`]: 종료 신호, 시그널 대기, 세션 정리 루프

pub mod lifecycle;
pub mod service;

pub use lifecycle::LifecycleManager;
pub use service::{LifecycleService, ServiceStats};
