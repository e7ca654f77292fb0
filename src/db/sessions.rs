//! # 디크르 세션 데이터베이스 쿼리 모듈
//!
//! ## 세션 라이프사이클
//! ```text
//! find_active_session() ─ 없음 → create_session()
//!                       └ 있음 → update_session_count()
//! update_session_count(completed=true)  → completed_at 최초 1회 기록
//! update_session_count(completed=false) → 리셋 (completed_at 초기화)
//! ```
//!
//! 활성 세션의 유일성은 유니크 제약이 아니라 호출 측의 find-or-create로 보장합니다.

use crate::db::now_timestamp;
use crate::error::AppError;
use crate::models::DhikrSession;
use sqlx::SqlitePool;

const SESSION_COLUMNS: &str = "id, dhikr_id, user_id, current_count, completed, started_at, \
                               completed_at, updated_at";

/// ID와 소유자로 세션 하나를 조회합니다.
pub async fn get_session(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
) -> Result<Option<DhikrSession>, AppError> {
    let session = sqlx::query_as::<_, DhikrSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM dhikr_sessions WHERE id = ? AND user_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// (디크르, 사용자)의 활성(미완료) 세션을 찾습니다.
///
/// 정상 동작에서는 최대 하나지만, 혹시 여러 개면 가장 최근에 갱신된 것을 고릅니다.
pub async fn find_active_session(
    pool: &SqlitePool,
    dhikr_id: &str,
    user_id: &str,
) -> Result<Option<DhikrSession>, AppError> {
    let session = sqlx::query_as::<_, DhikrSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM dhikr_sessions \
         WHERE dhikr_id = ? AND user_id = ? AND completed = 0 \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(dhikr_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// 재조정용 "현재" 세션: 활성 세션이 있으면 그것, 없으면 가장 최근 세션
///
/// 방금 목표에 도달한 세션도 클라이언트가 완료 상태를 볼 수 있어야 하므로
/// 활성 세션이 없을 때는 최근 완료 세션을 돌려줍니다.
pub async fn find_current_session(
    pool: &SqlitePool,
    dhikr_id: &str,
    user_id: &str,
) -> Result<Option<DhikrSession>, AppError> {
    if let Some(active) = find_active_session(pool, dhikr_id, user_id).await? {
        return Ok(Some(active));
    }

    let latest = sqlx::query_as::<_, DhikrSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM dhikr_sessions \
         WHERE dhikr_id = ? AND user_id = ? \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(dhikr_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(latest)
}

/// 새 세션을 만듭니다. 완료 상태로 생성되면 completed_at도 함께 기록합니다.
pub async fn create_session(
    pool: &SqlitePool,
    dhikr_id: &str,
    user_id: &str,
    count: i64,
    completed: bool,
) -> Result<DhikrSession, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    let completed_at = completed.then(|| now.clone());

    sqlx::query(
        r#"
        INSERT INTO dhikr_sessions
            (id, dhikr_id, user_id, current_count, completed, started_at, completed_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(dhikr_id)
    .bind(user_id)
    .bind(count)
    .bind(completed)
    .bind(&now)
    .bind(completed_at)
    .bind(&now)
    .execute(pool)
    .await?;

    get_session(pool, &id, user_id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created session".to_string()))
}

/// 세션의 카운트와 완료 여부를 갱신합니다.
///
/// - completed가 false → true로 바뀔 때만 `completed_at`을 기록합니다.
/// - 이미 완료된 세션을 다시 완료로 갱신해도 `completed_at`은 그대로입니다.
/// - completed=false는 리셋으로 보고 `completed_at`을 비웁니다.
///
/// ## 반환값
/// - `Ok(None)`: 세션이 없거나 다른 사용자 소유
pub async fn update_session_count(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    count: i64,
    completed: bool,
) -> Result<Option<DhikrSession>, AppError> {
    let Some(existing) = get_session(pool, id, user_id).await? else {
        return Ok(None);
    };

    let now = now_timestamp();
    let completed_at = match (existing.completed, completed) {
        (false, true) => Some(now.clone()),
        (true, true) => existing.completed_at,
        (_, false) => None,
    };

    sqlx::query(
        r#"
        UPDATE dhikr_sessions
        SET current_count = ?, completed = ?, completed_at = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(count)
    .bind(completed)
    .bind(completed_at)
    .bind(&now)
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    get_session(pool, id, user_id).await
}

/// 디크르의 모든 세션을 최신순으로 조회합니다.
pub async fn list_sessions_for_dhikr(
    pool: &SqlitePool,
    dhikr_id: &str,
    user_id: &str,
) -> Result<Vec<DhikrSession>, AppError> {
    let sessions = sqlx::query_as::<_, DhikrSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM dhikr_sessions \
         WHERE dhikr_id = ? AND user_id = ? \
         ORDER BY started_at DESC"
    ))
    .bind(dhikr_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}
