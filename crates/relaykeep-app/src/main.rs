//! # relaykeep
//!
//! 세션/연결 라이프사이클 서비스 진입점.
//! 설정 로드, 어댑터 와이어링, 운영 명령.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relaykeep_app::{LifecycleManager, LifecycleService};
use relaykeep_core::config::AppConfig;
use relaykeep_core::config_manager::ConfigManager;
use relaykeep_core::ports::session_store::SessionStore;
use relaykeep_monitor::LogAlertCallback;
use relaykeep_network::alert_webhook::WebhookAlertCallback;
use relaykeep_network::gateway_client::HttpPlatformClientFactory;
use relaykeep_storage::crypto::{generate_key, AesGcmCipher};
use relaykeep_storage::sqlite::SqliteSessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 메시징 플랫폼 세션/연결 관리 서비스
#[derive(Parser, Debug)]
#[command(name = "relaykeep")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    /// 세션 DB 경로 (설정값보다 우선)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// 게이트웨이 URL (설정값보다 우선)
    #[arg(long, short = 'g', global = true)]
    gateway: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 서비스 실행 (헬스 체크, 롤업, 세션 정리 루프)
    Serve,
    /// 세션 암호화 키 생성 (base64)
    GenerateKey,
    /// 사용자 세션 저장
    StoreSession {
        /// 사용자 ID
        #[arg(long)]
        user: String,
        /// 세션 자격증명 문자열
        #[arg(long)]
        credential: String,
        /// 저장 후 즉시 검증
        #[arg(long)]
        validate: bool,
    },
    /// 저장된 세션 검증
    Validate {
        /// 사용자 ID
        #[arg(long)]
        user: String,
    },
    /// 세션 삭제
    RemoveSession {
        /// 사용자 ID
        #[arg(long)]
        user: String,
    },
    /// 서비스 통계 (JSON)
    Stats,
    /// 저장된 모든 세션을 검증하고 헬스 리포트 출력 (JSON)
    Health,
    /// 검증 실패가 누적된 세션 정리
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!("relaykeep={}", args.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    if let Command::GenerateKey = args.command {
        println!("{}", generate_key());
        return Ok(());
    }

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")?;
    let mut config = config_manager.get();
    if let Some(url) = &args.gateway {
        config.gateway.base_url = url.clone();
    }

    let db_path = resolve_db_path(args.db.as_ref(), &config)?;
    let store = Arc::new(SqliteSessionStore::open(&db_path).context("세션 저장소 열기 실패")?);
    let cipher = Arc::new(
        AesGcmCipher::from_env(&config.storage.encryption_key_env)
            .context("세션 암호화 키 로드 실패 (generate-key로 생성 가능)")?,
    );
    let factory = Arc::new(
        HttpPlatformClientFactory::from_config(&config.gateway).context("게이트웨이 클라이언트 생성 실패")?,
    );

    let service = Arc::new(LifecycleService::build(
        &config,
        store.clone(),
        cipher,
        factory,
    ));
    register_alert_callbacks(&service, &config)?;

    match args.command {
        Command::Serve => serve(service.clone(), &config).await?,
        Command::GenerateKey => {}
        Command::StoreSession {
            user,
            credential,
            validate,
        } => {
            service.store_user_session(&user, &credential).await?;
            println!("세션 저장 완료: {user}");
            if validate {
                print_validation(&user, service.validate_user_session(&user).await);
            }
        }
        Command::Validate { user } => {
            print_validation(&user, service.validate_user_session(&user).await);
        }
        Command::RemoveSession { user } => {
            service.remove_user_session(&user).await?;
            println!("세션 삭제 완료: {user}");
        }
        Command::Stats => {
            warm_sessions(&service, store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&service.get_service_stats())?);
        }
        Command::Health => {
            for user_id in store.list_user_ids().await? {
                service.validate_user_session(&user_id).await;
            }
            service.monitor().rollup();
            println!("{}", serde_json::to_string_pretty(&service.get_health_report())?);
        }
        Command::Cleanup => {
            warm_sessions(&service, store.as_ref()).await?;
            let removed = service.cleanup_invalid_sessions().await;
            println!("정리된 세션: {removed}");
        }
    }

    service.shutdown().await;
    Ok(())
}

/// 서비스 루프 실행, 시그널 수신 시 종료
async fn serve(service: Arc<LifecycleService>, config: &AppConfig) -> Result<()> {
    let lifecycle = LifecycleManager::new();
    service.start();
    let cleanup = lifecycle.spawn_session_cleanup(
        service.clone(),
        config.session.revalidation_interval(),
    );

    info!("relaykeep 실행 중: gateway={}", config.gateway.base_url);
    lifecycle
        .wait_for_signal()
        .await
        .context("시그널 핸들러 등록 실패")?;

    if let Err(e) = cleanup.await {
        warn!("세션 정리 루프 종료 실패: {e}");
    }
    Ok(())
}

/// 알림 콜백 등록 (로그 + 선택적 웹훅)
fn register_alert_callbacks(service: &LifecycleService, config: &AppConfig) -> Result<()> {
    service
        .monitor()
        .add_alert_callback(Arc::new(LogAlertCallback));
    if let Some(url) = &config.alerts.webhook_url {
        let webhook = WebhookAlertCallback::new(url, config.gateway.request_timeout())
            .context("알림 웹훅 생성 실패")?;
        service.monitor().add_alert_callback(Arc::new(webhook));
        info!("알림 웹훅 등록: {url}");
    }
    Ok(())
}

/// 저장된 모든 세션을 캐시에 적재
async fn warm_sessions(service: &LifecycleService, store: &dyn SessionStore) -> Result<()> {
    for user_id in store.list_user_ids().await? {
        if let Err(e) = service.sessions().get_session(&user_id).await {
            warn!("세션 로드 실패: user_id={user_id}, {e}");
        }
    }
    Ok(())
}

fn print_validation(user_id: &str, valid: bool) {
    if valid {
        println!("세션 유효: {user_id}");
    } else {
        println!("세션 무효: {user_id}");
    }
}

/// 세션 DB 경로 결정 (CLI 인자 → 설정 → 플랫폼 데이터 디렉토리)
///
/// - macOS: `~/Library/Application Support/dev.relaykeep.relaykeep/sessions.db`
/// - Linux: `~/.local/share/relaykeep/sessions.db`
fn resolve_db_path(cli: Option<&PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = cli.or(config.storage.db_path.as_ref()) {
        return Ok(path.clone());
    }
    Ok(ConfigManager::data_dir()?.join("sessions.db"))
}
