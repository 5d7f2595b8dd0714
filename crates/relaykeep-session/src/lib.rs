//! # relaykeep-session
//!
//! 세션 매니저. 사용자별 암호화 세션 자격증명을 저장/조회하고,
//! 임시 연결로 유효성을 검증하며, 검증 실패가 누적된 세션을 정리한다.

pub mod manager;

pub use manager::SessionManager;
