//! relaykeep 도메인 모델.
//!
//! 세션 레코드, 연결 이벤트/메트릭, 헬스 리포트와 알림 구조체를 정의한다.
//! 외부로 노출되는 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod connection;
pub mod health;
pub mod session;
