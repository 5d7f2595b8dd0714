//! 테스트용 스텁.
//!
//! `test-support` feature로 다른 crate의 테스트에서 공유한다.
//! - [`StubPlatform`]: 연결/인증 동작을 사용자별로 조작할 수 있고 생성·연결 횟수를 센다.
//! - [`MemorySessionStore`]: HashMap 기반 세션 저장소.
//! - [`XorCipher`]: 결정적인 가역 변환 (실제 암호화 아님).

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::session::{SessionCredential, SessionRecord};
use crate::ports::cipher::CredentialCipher;
use crate::ports::platform::{AuthorizationStatus, PlatformClient, PlatformClientFactory};
use crate::ports::session_store::SessionStore;

/// 형식상 유효한 테스트 자격증명 문자열
pub fn credential_string(seed: u8) -> String {
    format!("1{}", URL_SAFE.encode([seed; 48]))
}

/// 형식상 유효한 테스트 자격증명
pub fn credential(seed: u8) -> SessionCredential {
    SessionCredential::parse(&credential_string(seed), 32)
        .unwrap_or_else(|e| panic!("테스트 자격증명 생성 실패: {e}"))
}

/// 스크립트된 실패
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubFailure {
    /// flood wait N초
    RateLimit(u64),
    /// 인증 폐기
    Unauthorized,
    /// 엔드포인트 이전
    Migration(String),
    /// 네트워크 실패
    Network,
}

impl StubFailure {
    fn to_error(&self) -> CoreError {
        match self {
            StubFailure::RateLimit(secs) => CoreError::RateLimit {
                retry_after_secs: *secs,
            },
            StubFailure::Unauthorized => CoreError::Auth("AUTH_KEY_UNREGISTERED".to_string()),
            StubFailure::Migration(endpoint) => CoreError::Migration {
                endpoint: endpoint.clone(),
            },
            StubFailure::Network => CoreError::Network("connection reset".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct UserBehavior {
    authorized: bool,
    connect_failure: Option<StubFailure>,
    auth_failure: Option<StubFailure>,
}

impl Default for UserBehavior {
    fn default() -> Self {
        Self {
            authorized: true,
            connect_failure: None,
            auth_failure: None,
        }
    }
}

#[derive(Default)]
struct StubState {
    created: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    auth_checks: AtomicUsize,
    behavior: Mutex<HashMap<String, UserBehavior>>,
    clients: Mutex<Vec<Arc<StubClient>>>,
    connect_delay: Mutex<Duration>,
}

impl StubState {
    fn behavior(&self, user_id: &str) -> UserBehavior {
        self.behavior
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// 카운팅 스텁 플랫폼 (팩토리)
#[derive(Clone, Default)]
pub struct StubPlatform {
    state: Arc<StubState>,
}

impl StubPlatform {
    /// 모든 사용자가 인증되는 스텁
    pub fn new() -> Self {
        Self::default()
    }

    /// 사용자 인증 여부 설정
    pub fn set_authorized(&self, user_id: &str, authorized: bool) {
        self.state
            .behavior
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .authorized = authorized;
    }

    /// connect 실패 스크립트 (None이면 해제)
    pub fn fail_connect(&self, user_id: &str, failure: Option<StubFailure>) {
        self.state
            .behavior
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .connect_failure = failure;
    }

    /// 인증 확인 실패 스크립트 (None이면 해제)
    pub fn fail_auth_check(&self, user_id: &str, failure: Option<StubFailure>) {
        self.state
            .behavior
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .auth_failure = failure;
    }

    /// connect 지연 (동시성 테스트용)
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// 사용자의 모든 트랜스포트를 끊긴 상태로 만든다
    pub fn drop_transport(&self, user_id: &str) {
        for client in self.state.clients.lock().iter() {
            if client.user_id == user_id {
                client.connected.store(false, Ordering::SeqCst);
            }
        }
    }

    /// 생성된 클라이언트 수
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// connect 호출 수
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// disconnect 호출 수
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// 인증 확인 호출 수
    pub fn auth_checks(&self) -> usize {
        self.state.auth_checks.load(Ordering::SeqCst)
    }

    /// 열려 있는 트랜스포트 수
    pub fn open_transports(&self) -> usize {
        self.state
            .clients
            .lock()
            .iter()
            .filter(|c| c.connected.load(Ordering::SeqCst))
            .count()
    }

    /// 특정 사용자로 생성된 클라이언트 수
    pub fn created_for(&self, user_id: &str) -> usize {
        self.state
            .clients
            .lock()
            .iter()
            .filter(|c| c.user_id == user_id)
            .count()
    }
}

impl PlatformClientFactory for StubPlatform {
    fn create(
        &self,
        user_id: &str,
        _credential: &SessionCredential,
    ) -> Result<Arc<dyn PlatformClient>, CoreError> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(StubClient {
            user_id: user_id.to_string(),
            state: self.state.clone(),
            connected: AtomicBool::new(false),
        });
        self.state.clients.lock().push(client.clone());
        Ok(client)
    }
}

/// 스텁 클라이언트
pub struct StubClient {
    user_id: String,
    state: Arc<StubState>,
    connected: AtomicBool,
}

#[async_trait]
impl PlatformClient for StubClient {
    async fn connect(&self) -> Result<(), CoreError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.state.behavior(&self.user_id).connect_failure {
            return Err(failure.to_error());
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CoreError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<AuthorizationStatus, CoreError> {
        self.state.auth_checks.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior(&self.user_id);
        if let Some(failure) = behavior.auth_failure {
            return Err(failure.to_error());
        }
        Ok(AuthorizationStatus::from(behavior.authorized))
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::json!({ "method": method, "params": params, "user_id": self.user_id }))
    }
}

/// HashMap 기반 세션 저장소
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// 빈 저장소
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 레코드 직접 조회
    pub fn raw(&self, user_id: &str) -> Option<SessionRecord> {
        self.records.lock().get(user_id).cloned()
    }

    /// 저장된 레코드 수
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// 비어 있는지
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_record(&self, user_id: &str) -> Result<Option<SessionRecord>, CoreError> {
        Ok(self.raw(user_id))
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<(), CoreError> {
        self.records
            .lock()
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, user_id: &str) -> Result<(), CoreError> {
        self.records.lock().remove(user_id);
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, CoreError> {
        let mut ids: Vec<String> = self.records.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// 버전 바이트 + XOR 변환 (실제 암호화 아님)
#[derive(Debug, Default, Clone, Copy)]
pub struct XorCipher;

const XOR_VERSION: u8 = 0xf0;
const XOR_KEY: u8 = 0x5a;

impl CredentialCipher for XorCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::with_capacity(plaintext.len() + 1);
        out.push(XOR_VERSION);
        out.extend(plaintext.iter().map(|b| b ^ XOR_KEY));
        Ok(out)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CoreError> {
        match blob.split_first() {
            Some((&XOR_VERSION, body)) => Ok(body.iter().map(|b| b ^ XOR_KEY).collect()),
            _ => Err(CoreError::Crypto("알 수 없는 blob 형식".to_string())),
        }
    }
}
