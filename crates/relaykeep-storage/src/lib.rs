//! # relaykeep-storage
//!
//! 세션 저장소 어댑터.
//! SQLite 기반 세션 레코드 저장, 스키마 마이그레이션,
//! 자격증명 암호화(AES-256-GCM, 버전 바이트 포함)를 담당한다.
//!
//! ## 모듈
//! - `sqlite`: 세션 저장소 (SessionStore 구현)
//! - `crypto`: 자격증명 암호화 (CredentialCipher 구현)
//! - `migration`: 스키마 마이그레이션

pub mod crypto;
pub mod migration;
pub mod sqlite;
