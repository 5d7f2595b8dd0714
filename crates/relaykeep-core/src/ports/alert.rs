//! 알림 콜백 포트.
//!
//! 구현: `relaykeep-monitor` (로그), `relaykeep-network` (웹훅)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::health::Alert;

/// 모니터 알림 수신자
#[async_trait]
pub trait AlertCallback: Send + Sync {
    /// 콜백 이름 (실패 로그용)
    fn name(&self) -> &str {
        "alert_callback"
    }

    /// 알림 처리
    async fn on_alert(&self, alert: &Alert) -> Result<(), CoreError>;
}

/// 동기 클로저를 [`AlertCallback`]으로 감싸는 어댑터
pub struct FnAlertCallback<F> {
    name: String,
    f: F,
}

impl<F> FnAlertCallback<F>
where
    F: Fn(&Alert) -> Result<(), CoreError> + Send + Sync,
{
    /// 새 어댑터 생성
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> AlertCallback for FnAlertCallback<F>
where
    F: Fn(&Alert) -> Result<(), CoreError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), CoreError> {
        (self.f)(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::health::AlertType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fn_callback_forwards_alert() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        let callback = FnAlertCallback::new("counter", move |alert: &Alert| {
            assert_eq!(alert.alert_type, AlertType::HighErrorRate);
            seen_cb.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let alert = Alert {
            alert_type: AlertType::HighErrorRate,
            user_id: "u1".into(),
            message: "5 errors".into(),
            timestamp: chrono::Utc::now(),
            details: Default::default(),
        };
        callback.on_alert(&alert).await.unwrap();

        assert_eq!(callback.name(), "counter");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
