//! 세션 매니저.
//!
//! 사용자별 암호화 세션 자격증명을 `SessionStore` 위에서 관리한다.
//! 복호화된 자격증명과 유효성 메타데이터를 메모리에 캐시하고,
//! 재검증 간격이 지나면 저장소에서 다시 읽는다.
//!
//! 캐시 잠금은 메모리 갱신 동안만 잡는다. 저장소 I/O와 검증용 네트워크 호출은
//! 잠금 밖에서 수행한다.
//!
//! 같은 사용자의 레코드 쓰기(저장, 삭제, 검증 결과 반영)는 사용자별 비동기 잠금으로
//! 직렬화한다. 검증 결과는 검증한 자격증명이 아직 현재 세션일 때만 반영한다.

use chrono::Utc;
use parking_lot::Mutex;
use relaykeep_core::config::SessionConfig;
use relaykeep_core::error::CoreError;
use relaykeep_core::models::session::{SessionCacheStats, SessionCredential, SessionRecord};
use relaykeep_core::ports::cipher::CredentialCipher;
use relaykeep_core::ports::platform::{AuthorizationStatus, PlatformClient, PlatformClientFactory};
use relaykeep_core::ports::session_store::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// 캐시 항목
#[derive(Clone)]
struct CachedSession {
    record: SessionRecord,
    credential: SessionCredential,
    loaded_at: Instant,
}

/// 세션 매니저
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<dyn SessionStore>,
    cipher: Arc<dyn CredentialCipher>,
    factory: Arc<dyn PlatformClientFactory>,
    cache: Mutex<HashMap<String, CachedSession>>,
    user_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionManager {
    /// 새 세션 매니저 생성
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        cipher: Arc<dyn CredentialCipher>,
        factory: Arc<dyn PlatformClientFactory>,
    ) -> Self {
        Self {
            config,
            store,
            cipher,
            factory,
            cache: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 사용자별 쓰기 잠금
    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.user_locks
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// 대기자가 없는 사용자 잠금 제거
    fn release_user_lock(&self, user_id: &str) {
        let mut locks = self.user_locks.lock();
        if locks
            .get(user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(user_id);
        }
    }

    /// 사용 가능한 세션 자격증명 조회
    ///
    /// 재검증 간격 내의 캐시 항목이 있으면 그대로 반환하고, 아니면 저장소에서
    /// 로드·복호화해 캐시한다. 검증 실패가 한도에 도달한 세션은 없는 것으로 본다.
    pub async fn get_session(&self, user_id: &str) -> Result<Option<SessionCredential>, CoreError> {
        let max_attempts = self.config.max_validation_attempts;

        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(user_id) {
                if entry.loaded_at.elapsed() < self.config.revalidation_interval() {
                    if entry.record.is_exhausted(max_attempts) {
                        return Ok(None);
                    }
                    return Ok(Some(entry.credential.clone()));
                }
            }
        }

        let Some(entry) = self.load_entry(user_id).await? else {
            self.cache.lock().remove(user_id);
            debug!("세션 없음: user_id={user_id}");
            return Ok(None);
        };

        let exhausted = entry.record.is_exhausted(max_attempts);
        let credential = entry.credential.clone();
        self.cache.lock().insert(user_id.to_string(), entry);

        if exhausted {
            debug!("검증 한도 초과 세션 (정리 대기): user_id={user_id}");
            return Ok(None);
        }
        Ok(Some(credential))
    }

    /// 세션 저장
    ///
    /// 형식 검증 후 암호화해 저장한다. 기존 레코드는 덮어쓴다.
    pub async fn store_session(&self, user_id: &str, raw_credential: &str) -> Result<(), CoreError> {
        let credential = SessionCredential::parse(raw_credential, self.config.min_credential_len)?;
        let blob = self.cipher.encrypt(credential.as_bytes())?;
        let record = SessionRecord::new(user_id, blob);

        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock().await;
        self.store.save_record(&record).await?;

        self.cache.lock().insert(
            user_id.to_string(),
            CachedSession {
                record,
                credential,
                loaded_at: Instant::now(),
            },
        );

        info!("세션 저장: user_id={user_id}");
        Ok(())
    }

    /// 세션 삭제 (캐시 + 저장소, 멱등)
    pub async fn remove_session(&self, user_id: &str) -> Result<(), CoreError> {
        let user_lock = self.user_lock(user_id);
        let result = {
            let _guard = user_lock.lock().await;
            self.cache.lock().remove(user_id);
            self.store.delete_record(user_id).await
        };
        drop(user_lock);
        self.release_user_lock(user_id);

        result?;
        info!("세션 삭제: user_id={user_id}");
        Ok(())
    }

    /// 세션 검증
    ///
    /// 임시 클라이언트로 connect → 인증 확인 → disconnect를 수행한다.
    /// 결과는 레코드의 유효성 메타데이터에 반영되어 저장된다.
    /// 검증 도중 다른 자격증명이 저장되었으면 결과를 반영하지 않는다.
    pub async fn validate_session(&self, user_id: &str, credential: &SessionCredential) -> bool {
        let outcome = self.verify(user_id, credential).await;

        let user_lock = self.user_lock(user_id);
        let _guard = user_lock.lock().await;

        let entry = {
            let cached = self.cache.lock().get(user_id).cloned();
            match cached {
                Some(entry) => Some(entry),
                None => match self.load_entry(user_id).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("검증 결과 기록용 세션 로드 실패: user_id={user_id}, {e}");
                        None
                    }
                },
            }
        };

        let valid = outcome.is_ok();
        match &outcome {
            Ok(()) => info!("세션 검증 성공: user_id={user_id}"),
            Err(reason) => warn!("세션 검증 실패: user_id={user_id}, {reason}"),
        }

        let Some(mut entry) = entry else {
            debug!("검증 결과를 기록할 세션 레코드 없음: user_id={user_id}");
            return valid;
        };
        if entry.credential != *credential {
            info!("검증 중 세션이 교체되어 결과를 반영하지 않음: user_id={user_id}");
            return valid;
        }

        match outcome {
            Ok(()) => entry.record.mark_valid(Utc::now()),
            Err(reason) => entry.record.mark_invalid(reason),
        }

        if let Err(e) = self.store.save_record(&entry.record).await {
            warn!("검증 메타데이터 저장 실패: user_id={user_id}, {e}");
        }
        self.cache.lock().insert(user_id.to_string(), entry);

        valid
    }

    /// 검증 실패가 한도에 도달한 세션 정리
    ///
    /// 캐시와 저장소에서 모두 삭제하고 삭제한 수를 반환한다.
    pub async fn cleanup_invalid_sessions(&self) -> usize {
        let max_attempts = self.config.max_validation_attempts;
        let targets: Vec<String> = self
            .cache
            .lock()
            .iter()
            .filter(|(_, entry)| entry.record.is_exhausted(max_attempts))
            .map(|(user_id, _)| user_id.clone())
            .collect();

        let mut removed = 0;
        for user_id in targets {
            let user_lock = self.user_lock(&user_id);
            let result = {
                let _guard = user_lock.lock().await;
                // 잠금을 기다리는 사이 새 세션이 저장되었으면 건너뛴다
                let still_exhausted = self
                    .cache
                    .lock()
                    .get(&user_id)
                    .is_some_and(|entry| entry.record.is_exhausted(max_attempts));
                if still_exhausted {
                    Some(self.store.delete_record(&user_id).await.map(|()| {
                        self.cache.lock().remove(&user_id);
                    }))
                } else {
                    None
                }
            };
            drop(user_lock);

            match result {
                Some(Ok(())) => {
                    self.release_user_lock(&user_id);
                    removed += 1;
                }
                Some(Err(e)) => warn!("무효 세션 삭제 실패: user_id={user_id}, {e}"),
                None => {}
            }
        }

        if removed > 0 {
            info!("무효 세션 {removed}개 정리");
        }
        removed
    }

    /// 캐시 통계
    pub fn stats(&self) -> SessionCacheStats {
        let cache = self.cache.lock();
        let valid = cache.values().filter(|e| e.record.is_valid).count();
        SessionCacheStats {
            cached: cache.len(),
            valid,
            invalid: cache.len() - valid,
        }
    }

    /// 저장소에서 레코드를 읽어 복호화
    async fn load_entry(&self, user_id: &str) -> Result<Option<CachedSession>, CoreError> {
        let Some(record) = self.store.load_record(user_id).await? else {
            return Ok(None);
        };

        let plaintext = self.cipher.decrypt(&record.encrypted_credential)?;
        let raw = String::from_utf8(plaintext)
            .map_err(|e| CoreError::Crypto(format!("복호화된 세션이 UTF-8이 아님: {e}")))?;
        let credential = SessionCredential::parse(&raw, self.config.min_credential_len)?;

        Ok(Some(CachedSession {
            record,
            credential,
            loaded_at: Instant::now(),
        }))
    }

    /// 임시 연결로 인증 상태 확인. 실패 시 사유 문자열 반환
    async fn verify(&self, user_id: &str, credential: &SessionCredential) -> Result<(), String> {
        let client = self
            .factory
            .create(user_id, credential)
            .map_err(|e| e.to_string())?;

        let result = self.connect_and_authorize(client.as_ref()).await;

        if client.is_connected() {
            let limit = self.config.validation_timeout();
            match timeout(limit, client.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("검증 연결 종료 실패: user_id={user_id}, {e}"),
                Err(_) => debug!("검증 연결 종료 타임아웃: user_id={user_id}"),
            }
        }

        result
    }

    async fn connect_and_authorize(&self, client: &dyn PlatformClient) -> Result<(), String> {
        let limit = self.config.validation_timeout();

        timeout(limit, client.connect())
            .await
            .map_err(|_| CoreError::timeout("connect", limit).to_string())?
            .map_err(|e| e.to_string())?;

        let status = timeout(limit, client.is_authorized())
            .await
            .map_err(|_| CoreError::timeout("authorize", limit).to_string())?
            .map_err(|e| e.to_string())?;

        match status {
            AuthorizationStatus::Authorized => Ok(()),
            AuthorizationStatus::Unauthorized => Err("세션이 인증되지 않음".to_string()),
        }
    }
}
