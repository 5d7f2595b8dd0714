//! 세션 모델.
//!
//! 사용자별 세션 자격증명과 저장소에 기록되는 유효성 메타데이터.

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{alphabet, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// 세션 문자열 본문 디코더 (URL-safe, 패딩 유무 무관)
const CREDENTIAL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 세션 자격증명: 로그인 절차 없이 인증된 연결을 복원하는 직렬화된 문자열
///
/// 형식: `<버전 숫자 1자리><URL-safe base64 본문>`.
/// 생성 시점에 형식을 검증하므로 이 타입의 값은 항상 형식상 유효하다.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    /// 문자열을 검증해 자격증명 생성
    ///
    /// 앞뒤 공백은 제거한다. 최소 길이, 버전 문자, base64 본문을 확인한다.
    pub fn parse(raw: &str, min_len: usize) -> Result<Self, CoreError> {
        let value = raw.trim();

        if value.len() < min_len {
            return Err(invalid(format!(
                "길이 {}자, 최소 {}자 필요",
                value.len(),
                min_len
            )));
        }

        let mut chars = value.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() && c != '0' => {}
            _ => return Err(invalid("버전 문자가 없음".to_string())),
        }

        let body = chars.as_str();
        if body.is_empty() {
            return Err(invalid("본문이 비어 있음".to_string()));
        }
        CREDENTIAL_ENGINE
            .decode(body)
            .map_err(|e| invalid(format!("base64 본문 디코딩 실패: {e}")))?;

        Ok(Self(value.to_string()))
    }

    /// 형식 버전 (첫 글자)
    pub fn version(&self) -> u32 {
        self.0
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .unwrap_or_default()
    }

    /// 원본 문자열
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// 암호화 대상 바이트
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCredential(v{}, {} chars)", self.version(), self.0.len())
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::Validation {
        field: "session_credential".to_string(),
        message,
    }
}

/// 사용자별 세션 레코드 (저장소 한 행)
///
/// 사용자당 최대 하나. `validation_attempts`는 검증 성공 시 0으로 리셋된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// 사용자 ID
    pub user_id: String,
    /// 암호화된 자격증명 (버전 바이트 포함 blob)
    #[serde(with = "blob")]
    pub encrypted_credential: Vec<u8>,
    /// 최초 저장 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 검증(또는 저장) 시각
    pub last_validated_at: DateTime<Utc>,
    /// 연속 검증 실패 횟수
    pub validation_attempts: u32,
    /// 마지막 검증 결과
    pub is_valid: bool,
    /// 마지막 실패 사유
    pub last_error: Option<String>,
}

impl SessionRecord {
    /// 방금 인증된 세션의 새 레코드
    pub fn new(user_id: &str, encrypted_credential: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            encrypted_credential,
            created_at: now,
            last_validated_at: now,
            validation_attempts: 0,
            is_valid: true,
            last_error: None,
        }
    }

    /// 검증 성공 기록
    pub fn mark_valid(&mut self, at: DateTime<Utc>) {
        self.is_valid = true;
        self.validation_attempts = 0;
        self.last_validated_at = at;
        self.last_error = None;
    }

    /// 검증 실패 기록
    pub fn mark_invalid(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.validation_attempts = self.validation_attempts.saturating_add(1);
        self.last_error = Some(error.into());
    }

    /// 최대 시도 횟수에 도달했고 여전히 무효인지 (정리 대상)
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        !self.is_valid && self.validation_attempts >= max_attempts
    }
}

/// 세션 캐시 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// 캐시된 세션 수
    pub cached: usize,
    /// 유효 세션 수
    pub valid: usize,
    /// 무효 세션 수
    pub invalid: usize,
}

/// `Vec<u8>`를 base64 문자열로 직렬화
mod blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;

    fn sample_credential() -> String {
        format!("1{}", URL_SAFE.encode([7u8; 48]))
    }

    #[test]
    fn parses_well_formed_credential() {
        let raw = sample_credential();
        let cred = SessionCredential::parse(&raw, 32).unwrap();
        assert_eq!(cred.expose(), raw);
        assert_eq!(cred.version(), 1);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let raw = format!("  {}\n", sample_credential());
        let cred = SessionCredential::parse(&raw, 32).unwrap();
        assert_eq!(cred.expose(), sample_credential());
    }

    #[test]
    fn rejects_short_credential() {
        let err = SessionCredential::parse("1abcd", 32).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn rejects_missing_version() {
        let raw = URL_SAFE.encode([1u8; 48]).replace(|c: char| c.is_ascii_digit(), "A");
        let raw = format!("x{raw}");
        assert!(SessionCredential::parse(&raw, 32).is_err());
    }

    #[test]
    fn rejects_non_base64_body() {
        let raw = format!("1{}", "*".repeat(40));
        assert!(SessionCredential::parse(&raw, 32).is_err());
    }

    #[test]
    fn debug_output_hides_secret() {
        let cred = SessionCredential::parse(&sample_credential(), 32).unwrap();
        let debug = format!("{cred:?}");
        assert!(!debug.contains(cred.expose()));
    }

    #[test]
    fn validation_attempts_reset_on_success() {
        let mut record = SessionRecord::new("u1", vec![1, 2, 3]);
        record.mark_invalid("timeout");
        record.mark_invalid("timeout");
        assert_eq!(record.validation_attempts, 2);
        assert!(!record.is_valid);

        record.mark_valid(Utc::now());
        assert_eq!(record.validation_attempts, 0);
        assert!(record.is_valid);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn exhausted_only_when_invalid_at_ceiling() {
        let mut record = SessionRecord::new("u1", vec![]);
        for _ in 0..3 {
            record.mark_invalid("unauthorized");
        }
        assert!(record.is_exhausted(3));
        record.mark_valid(Utc::now());
        assert!(!record.is_exhausted(3));
    }

    #[test]
    fn record_serializes_blob_as_base64() {
        let record = SessionRecord::new("u1", vec![0xde, 0xad]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"3q0=\""));
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encrypted_credential, vec![0xde, 0xad]);
    }
}
