//! 설정 파일 관리.
//!
//! JSON 설정 파일을 읽고, `RELAYKEEP_*` 환경 변수를 덮어쓴 뒤 값 범위를 검증한다.
//! 파일이 없으면 기본 설정으로 새로 만든다.

use crate::config::AppConfig;
use crate::error::CoreError;
use directories::ProjectDirs;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.json";

/// 게이트웨이 URL 덮어쓰기
pub const ENV_GATEWAY_URL: &str = "RELAYKEEP_GATEWAY_URL";
/// 세션 DB 경로 덮어쓰기
pub const ENV_DB_PATH: &str = "RELAYKEEP_DB_PATH";
/// 알림 웹훅 URL 덮어쓰기
pub const ENV_ALERT_WEBHOOK: &str = "RELAYKEEP_ALERT_WEBHOOK";
/// 최대 연결 수 덮어쓰기
pub const ENV_MAX_CONNECTIONS: &str = "RELAYKEEP_MAX_CONNECTIONS";

/// 설정 관리자
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// 플랫폼 설정 디렉토리의 config.json 사용
    pub fn new() -> Result<Self, CoreError> {
        Self::with_path(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// 지정된 경로의 설정 파일 사용
    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        let config = Self::resolve(&config_path, |key| std::env::var(key).ok())?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// 파일 로드(없으면 생성) → 환경 변수 적용 → 검증
    fn resolve(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<AppConfig, CoreError> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            let config = AppConfig::default_config();
            Self::save_to_file(path, &config)?;
            info!("기본 설정 파일 생성: {}", path.display());
            config
        };
        apply_env_overrides(&mut config, env)?;
        validate(&config)?;
        Ok(config)
    }

    /// 현재 설정 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// 설정 검증 후 교체하고 파일에 저장
    pub fn update(&self, new_config: AppConfig) -> Result<(), CoreError> {
        validate(&new_config)?;
        Self::save_to_file(&self.config_path, &new_config)?;
        *self.config.write() = new_config;
        debug!("설정 저장: {}", self.config_path.display());
        Ok(())
    }

    /// 설정 파일 경로
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 파일과 환경 변수에서 다시 로드
    pub fn reload(&self) -> Result<(), CoreError> {
        let config = Self::resolve(&self.config_path, |key| std::env::var(key).ok())?;
        *self.config.write() = config;
        info!("설정 다시 로드: {}", self.config_path.display());
        Ok(())
    }

    /// 플랫폼별 설정 디렉토리
    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|p| p.config_dir().to_path_buf())
    }

    /// 플랫폼별 데이터 디렉토리 (세션 DB)
    pub fn data_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|p| p.data_dir().to_path_buf())
    }

    fn project_dirs() -> Result<ProjectDirs, CoreError> {
        ProjectDirs::from("dev", "relaykeep", "relaykeep")
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
    }

    fn load_from_file(path: &Path) -> Result<AppConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("설정 파일 읽기 실패: {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("설정 파일 파싱 실패: {}: {e}", path.display()))
        })
    }

    fn save_to_file(path: &Path, config: &AppConfig) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Config(format!("설정 디렉토리 생성 실패: {}: {e}", parent.display()))
                })?;
            }
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content).map_err(|e| {
            CoreError::Config(format!("설정 파일 저장 실패: {}: {e}", path.display()))
        })
    }
}

/// `RELAYKEEP_*` 환경 변수를 설정에 덮어쓴다
fn apply_env_overrides(
    config: &mut AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), CoreError> {
    if let Some(url) = env(ENV_GATEWAY_URL) {
        config.gateway.base_url = url;
    }
    if let Some(path) = env(ENV_DB_PATH) {
        config.storage.db_path = Some(PathBuf::from(path));
    }
    if let Some(url) = env(ENV_ALERT_WEBHOOK) {
        config.alerts.webhook_url = Some(url).filter(|u| !u.is_empty());
    }
    if let Some(raw) = env(ENV_MAX_CONNECTIONS) {
        config.pool.max_connections = raw.trim().parse().map_err(|_| CoreError::Validation {
            field: ENV_MAX_CONNECTIONS.to_string(),
            message: format!("정수가 아님: {raw}"),
        })?;
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// 값 범위 검증
fn validate(config: &AppConfig) -> Result<(), CoreError> {
    if config.pool.max_connections == 0 {
        return Err(invalid("pool.max_connections", "1 이상이어야 함"));
    }
    if config.monitor.event_buffer_size == 0 {
        return Err(invalid("monitor.event_buffer_size", "1 이상이어야 함"));
    }
    if config.monitor.error_alert_threshold == 0 {
        return Err(invalid("monitor.error_alert_threshold", "1 이상이어야 함"));
    }
    if !(0.0..=1.0).contains(&config.monitor.problematic_success_rate) {
        return Err(invalid("monitor.problematic_success_rate", "0.0 ~ 1.0 범위여야 함"));
    }
    if config.monitor.retention_secs < config.monitor.error_alert_window_secs {
        return Err(invalid(
            "monitor.retention_secs",
            "error_alert_window_secs 이상이어야 함",
        ));
    }
    if config.session.max_validation_attempts == 0 {
        return Err(invalid("session.max_validation_attempts", "1 이상이어야 함"));
    }
    if config.gateway.base_url.trim().is_empty() {
        return Err(invalid("gateway.base_url", "비어 있음"));
    }
    Ok(())
}
