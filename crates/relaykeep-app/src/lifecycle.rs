//! 프로세스 라이프사이클.
//!
//! 종료 신호 전파, 시그널 대기, 주기적 세션 정리 루프.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::service::LifecycleService;

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    /// 새 라이프사이클 관리자 생성
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        let _ = self.shutdown_tx.send(true);
    }

    /// OS 시그널 대기 (SIGINT, SIGTERM) 후 종료 신호 발송
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT 수신");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM 수신");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            info!("Ctrl+C 수신");
        }

        self.shutdown();
        Ok(())
    }

    /// 주기적으로 무효 세션을 정리하는 루프
    ///
    /// 첫 틱은 건너뛴다. 종료 신호를 받으면 끝난다.
    pub fn spawn_session_cleanup(
        &self,
        service: Arc<LifecycleService>,
        period: Duration,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = self.subscribe();
        let period = period.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = service.cleanup_invalid_sessions().await;
                        if removed > 0 {
                            info!("무효 세션 정리: {removed}개");
                        } else {
                            debug!("무효 세션 없음");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("세션 정리 루프 종료");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaykeep_core::config::AppConfig;
    use relaykeep_core::testing::{credential_string, MemorySessionStore, StubPlatform, XorCipher};

    #[test]
    fn lifecycle_creation() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        assert!(!*rx.borrow());
    }

    #[test]
    fn shutdown_signal() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        lm.shutdown();
        assert!(*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_loop_removes_exhausted_sessions_until_shutdown() {
        let platform = StubPlatform::new();
        let store = Arc::new(MemorySessionStore::new());
        let service = Arc::new(LifecycleService::build(
            &AppConfig::default_config(),
            store.clone(),
            Arc::new(XorCipher),
            Arc::new(platform.clone()),
        ));
        service
            .store_user_session("u1", &credential_string(1))
            .await
            .unwrap();
        platform.set_authorized("u1", false);
        for _ in 0..3 {
            assert!(!service.validate_user_session("u1").await);
        }
        assert_eq!(store.len(), 1);

        let lm = LifecycleManager::new();
        let handle = lm.spawn_session_cleanup(service.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(store.is_empty());

        lm.shutdown();
        handle.await.unwrap();
    }
}
