//! 자격증명 암호화 포트.
//!
//! 구현: `relaykeep-storage` crate (AES-256-GCM)

use crate::error::CoreError;

/// 인증된 대칭 암호화: 프로세스가 보유한 키로 동작
pub trait CredentialCipher: Send + Sync {
    /// 평문 → 저장용 blob
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError>;

    /// 저장용 blob → 평문
    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CoreError>;
}
