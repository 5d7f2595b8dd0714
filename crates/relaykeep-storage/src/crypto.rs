//! 자격증명 암호화 (`CredentialCipher` 포트 구현).
//!
//! AES-256-GCM. 저장 blob 레이아웃은 `[형식 버전 1B][nonce 12B][암호문 + 태그]`.
//! 형식은 첫 바이트로만 판별하고, 알 수 없는 버전은 복호화를 시도하지 않고 거부한다.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use relaykeep_core::error::CoreError;
use relaykeep_core::ports::cipher::CredentialCipher;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 현재 blob 형식 버전
pub const FORMAT_V1: u8 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// blob의 형식 버전 (빈 blob이면 None)
pub fn format_version(blob: &[u8]) -> Option<u8> {
    blob.first().copied()
}

/// 새 256비트 키 생성 (base64)
pub fn generate_key() -> String {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

/// AES-256-GCM 자격증명 암호기
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
    key_id: String,
}

impl AesGcmCipher {
    /// 32바이트 키로 생성
    pub fn new(key: &[u8; 32]) -> Self {
        let digest = Sha256::digest(key);
        let key_id = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            key_id,
        }
    }

    /// base64 인코딩된 키로 생성
    pub fn from_base64(encoded: &str) -> Result<Self, CoreError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::Config(format!("암호화 키 base64 디코딩 실패: {e}")))?;
        let key: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            CoreError::Config(format!("암호화 키는 32바이트여야 함 (현재 {}바이트)", raw.len()))
        })?;
        Ok(Self::new(&key))
    }

    /// 환경 변수에서 키를 읽어 생성
    pub fn from_env(var: &str) -> Result<Self, CoreError> {
        let encoded = std::env::var(var)
            .map_err(|_| CoreError::Config(format!("환경 변수 {var}가 설정되지 않음")))?;
        let cipher = Self::from_base64(&encoded)?;
        debug!("세션 암호화 키 로드: key_id={}", cipher.key_id);
        Ok(cipher)
    }

    /// 키 지문 (SHA-256 앞 4바이트, 로그용)
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl CredentialCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CoreError::Crypto(format!("AES-GCM 암호화 실패: {e}")))?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        blob.push(FORMAT_V1);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CoreError> {
        match format_version(blob) {
            Some(FORMAT_V1) => {}
            Some(other) => {
                return Err(CoreError::Crypto(format!(
                    "지원하지 않는 blob 형식 버전: {other}"
                )))
            }
            None => return Err(CoreError::Crypto("빈 blob".to_string())),
        }

        let body = &blob[1..];
        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(CoreError::Crypto("blob이 너무 짧음".to_string()));
        }

        let (nonce_bytes, ciphertext) = body.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CoreError::Crypto(format!("AES-GCM 복호화 실패: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::new(&[42u8; 32])
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        let blob = c.encrypt(b"1AAAAsession").unwrap();
        assert_eq!(format_version(&blob), Some(FORMAT_V1));
        assert_eq!(c.decrypt(&blob).unwrap(), b"1AAAAsession");
    }

    #[test]
    fn blob_does_not_contain_plaintext() {
        let c = cipher();
        let plaintext = b"1plaintext-session-credential-value";
        let blob = c.encrypt(plaintext).unwrap();
        assert!(!blob
            .windows(plaintext.len())
            .any(|w| w == plaintext.as_slice()));
    }

    #[test]
    fn nonces_differ_per_encryption() {
        let c = cipher();
        assert_ne!(c.encrypt(b"same").unwrap(), c.encrypt(b"same").unwrap());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let c = cipher();
        let mut blob = c.encrypt(b"data").unwrap();
        blob[0] = 9;
        let err = c.decrypt(&blob).unwrap_err();
        assert!(err.to_string().contains("형식 버전"));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let c = cipher();
        let mut blob = c.encrypt(b"data").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(c.decrypt(&blob).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let blob = cipher().encrypt(b"data").unwrap();
        let other = AesGcmCipher::new(&[7u8; 32]);
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn key_from_base64() {
        let encoded = generate_key();
        let c = AesGcmCipher::from_base64(&encoded).unwrap();
        assert_eq!(c.key_id().len(), 8);

        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            AesGcmCipher::from_base64(&short),
            Err(CoreError::Config(_))
        ));
    }
}
