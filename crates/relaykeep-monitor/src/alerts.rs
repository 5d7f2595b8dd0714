//! 알림 전달.

use async_trait::async_trait;
use futures::FutureExt;
use relaykeep_core::error::CoreError;
use relaykeep_core::models::health::Alert;
use relaykeep_core::ports::alert::AlertCallback;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// 알림을 로그로 남기는 콜백
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertCallback;

#[async_trait]
impl AlertCallback for LogAlertCallback {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_alert(&self, alert: &Alert) -> Result<(), CoreError> {
        warn!(
            alert_type = alert.alert_type.as_str(),
            user_id = %alert.user_id,
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// 모든 콜백에 알림 전달
///
/// 콜백 하나의 에러나 패닉은 로그만 남기고 나머지 콜백은 계속 호출한다.
/// 호출자는 잠금을 잡지 않은 상태여야 한다.
pub(crate) async fn dispatch(callbacks: &[Arc<dyn AlertCallback>], alerts: &[Alert]) {
    for alert in alerts {
        for callback in callbacks {
            match AssertUnwindSafe(callback.on_alert(alert)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "알림 콜백 실패: callback={}, alert={}, {e}",
                    callback.name(),
                    alert.alert_type.as_str()
                ),
                Err(_) => warn!(
                    "알림 콜백 패닉: callback={}, alert={}",
                    callback.name(),
                    alert.alert_type.as_str()
                ),
            }
        }
    }
}
