//! 세션 저장소 포트.
//!
//! 구현: `relaykeep-storage` crate (rusqlite)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::session::SessionRecord;

/// 사용자별 암호화 세션 저장소
///
/// 레코드는 암호문 blob과 유효성 메타데이터를 함께 담는다. 평문 자격증명은
/// 이 경계를 넘지 않는다.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 레코드 로드 (없으면 None)
    async fn load_record(&self, user_id: &str) -> Result<Option<SessionRecord>, CoreError>;

    /// 레코드 저장 (사용자당 하나, 기존 레코드 덮어씀)
    async fn save_record(&self, record: &SessionRecord) -> Result<(), CoreError>;

    /// 레코드 삭제 (없어도 성공)
    async fn delete_record(&self, user_id: &str) -> Result<(), CoreError>;

    /// 저장된 사용자 ID 목록
    async fn list_user_ids(&self) -> Result<Vec<String>, CoreError>;
}
