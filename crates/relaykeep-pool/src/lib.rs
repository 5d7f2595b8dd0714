//! # relaykeep-pool
//!
//! 사용자별 인증 클라이언트 핸들 풀.
//!
//! - 사용자당 살아 있는 핸들은 최대 하나
//! - flood wait 중인 핸들은 기다리지 않고 `Unavailable::FloodWait`
//! - 용량 초과 시 비정상 → LRU 순으로 하나 축출
//! - 백그라운드 헬스 체크 루프 (재연결, 인증 재확인, 유휴 축출)

pub mod error;
pub mod handle;
pub mod pool;

pub use error::Unavailable;
pub use handle::{ClientLease, ConnectionHandle, LeaseOrigin};
pub use pool::{ConnectionPool, HealthCheckSummary, PoolStats, PoolTotals};
