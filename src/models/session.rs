//! # 디크르 세션 모델 정의
//!
//! 세션은 디크르의 목표 횟수에 도달하기 위한 "한 번의 시도"입니다.
//!
//! ## 세션 흐름
//! ```text
//! [생성] count=0, completed=false → 카운트 증가 … → count >= target → [완료]
//! ```
//! - (디크르, 사용자) 쌍마다 활성(미완료) 세션은 최대 하나입니다.
//!   유니크 제약이 아니라 find-or-create로 보장합니다.
//! - `completed_at`은 completed가 false → true로 처음 바뀔 때 한 번만 기록됩니다.
//! - 리셋은 같은 행을 count=0, completed=false로 되돌립니다.

use serde::{Deserialize, Serialize};

use super::Dhikr;

/// 디크르 세션 엔티티: DB의 `dhikr_sessions` 테이블 한 행에 대응합니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DhikrSession {
    /// 세션 고유 식별자 (UUIDv7)
    pub id: String,
    /// 이 세션이 속한 디크르 ID (외래키)
    pub dhikr_id: String,
    /// 소유자 ID
    pub user_id: String,
    /// 현재 카운트 (0 이상)
    pub current_count: i64,
    /// 목표 도달 여부
    pub completed: bool,
    /// 세션 시작 시각 (ISO 8601: "2026-02-16T12:00:00.000Z")
    pub started_at: String,
    /// 최초 완료 시각: 완료 전이면 None
    pub completed_at: Option<String>,
    /// 마지막 변경 시각. 클라이언트 재조정(reconciliation)의 비교 기준입니다.
    pub updated_at: String,
}

/// 현재 세션 조회 응답: `GET /api/v1/dhikrs/{id}/session`
///
/// `session`이 null이면 "아직 진행 중인 시도가 없음"을 뜻하며 에러가 아닙니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSessionResponse {
    pub session: Option<DhikrSession>,
    pub dhikr: Dhikr,
}
