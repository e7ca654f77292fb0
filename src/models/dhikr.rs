//! # 디크르(Dhikr) 모델 정의
//!
//! 디크르는 "목표 횟수가 있는 반복 행위"입니다. 사용자는 디크르마다
//! 세션(진행 인스턴스)을 만들어 목표 횟수에 도달할 때까지 카운트를 올립니다.

use serde::{Deserialize, Serialize};

/// 디크르 엔티티: DB의 `dhikrs` 테이블 한 행에 대응합니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dhikr {
    /// 디크르 고유 식별자 (UUIDv7)
    pub id: String,
    /// 소유자 ID. 게스트 디크르는 서버에 저장되지 않으므로 항상 존재합니다.
    pub user_id: String,
    /// 표시 이름
    pub name: String,
    /// 목표 반복 횟수 (1 이상)
    pub target_count: i64,
    /// 즐겨찾기 여부: 목록에서 먼저 정렬됩니다
    pub is_favorite: bool,
    /// 아랍어 원문 (선택)
    pub arabic_text: Option<String>,
    /// 음역 (선택)
    pub transliteration: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Dhikr {
    /// 주어진 카운트가 목표에 도달했는지 판정합니다.
    pub fn is_reached_by(&self, count: i64) -> bool {
        count >= self.target_count
    }
}

/// 디크르 생성 요청: `POST /api/v1/dhikrs`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDhikrRequest {
    pub name: String,
    pub target_count: i64,
    #[serde(default)]
    pub is_favorite: bool,
    pub arabic_text: Option<String>,
    pub transliteration: Option<String>,
}

/// 디크르 수정 요청: `PATCH /api/v1/dhikrs/{id}`
///
/// 생성 이후에는 이름, 목표 횟수, 즐겨찾기만 바꿀 수 있습니다.
/// 모든 필드가 선택이며, 없는 필드는 기존 값을 유지합니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDhikrRequest {
    pub name: Option<String>,
    pub target_count: Option<i64>,
    pub is_favorite: Option<bool>,
}
