//! # relaykeep-core
//!
//! relaykeep 도메인 모델, 포트(trait) 정의, 에러 타입, 설정.
//! 모든 crate가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 세션 레코드, 연결 이벤트/메트릭, 헬스 리포트
//! - [`ports`]: Hexagonal Architecture 포트 인터페이스 (async_trait)
//! - [`error`]: 핵심 에러 타입과 분류 (thiserror)
//! - [`config`]: 애플리케이션 설정 구조체
//! - [`config_manager`]: 설정 파일 관리 (로드/저장)
//! - `testing`: 테스트 스텁 (`test-support` feature)

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
