//! # 디크르 데이터베이스 쿼리 모듈
//!
//! 모든 조회는 `(id, user_id)` 쌍으로 이루어집니다.
//! 다른 사용자의 디크르는 "존재하지 않는 것"과 똑같이 `None`이 됩니다.

use crate::error::AppError;
use crate::models::{CreateDhikrRequest, Dhikr, UpdateDhikrRequest};
use sqlx::SqlitePool;

const DHIKR_COLUMNS: &str = "id, user_id, name, target_count, is_favorite, arabic_text, \
                             transliteration, created_at, updated_at";

/// 새 디크르를 만듭니다.
pub async fn create_dhikr(
    pool: &SqlitePool,
    user_id: &str,
    req: &CreateDhikrRequest,
) -> Result<Dhikr, AppError> {
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query(
        r#"
        INSERT INTO dhikrs (id, user_id, name, target_count, is_favorite, arabic_text, transliteration)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(req.name.trim())
    .bind(req.target_count)
    .bind(req.is_favorite)
    .bind(req.arabic_text.as_deref())
    .bind(req.transliteration.as_deref())
    .execute(pool)
    .await?;

    get_dhikr(pool, &id, user_id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created dhikr".to_string()))
}

/// 소유자 범위에서 디크르 하나를 조회합니다.
pub async fn get_dhikr(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
) -> Result<Option<Dhikr>, AppError> {
    let dhikr = sqlx::query_as::<_, Dhikr>(&format!(
        "SELECT {DHIKR_COLUMNS} FROM dhikrs WHERE id = ? AND user_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(dhikr)
}

/// 사용자의 디크르 목록. 즐겨찾기가 먼저, 그다음 최신순입니다.
pub async fn list_dhikrs(pool: &SqlitePool, user_id: &str) -> Result<Vec<Dhikr>, AppError> {
    let dhikrs = sqlx::query_as::<_, Dhikr>(&format!(
        "SELECT {DHIKR_COLUMNS} FROM dhikrs WHERE user_id = ? \
         ORDER BY is_favorite DESC, created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(dhikrs)
}

/// 이름/목표 횟수/즐겨찾기만 부분 수정합니다.
///
/// ## 반환값
/// - `Ok(None)`: 디크르가 없거나 다른 사용자 소유
pub async fn update_dhikr(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    req: &UpdateDhikrRequest,
) -> Result<Option<Dhikr>, AppError> {
    let Some(existing) = get_dhikr(pool, id, user_id).await? else {
        return Ok(None);
    };

    let name = req.name.as_deref().map(str::trim).unwrap_or(&existing.name);
    let target_count = req.target_count.unwrap_or(existing.target_count);
    let is_favorite = req.is_favorite.unwrap_or(existing.is_favorite);

    sqlx::query(
        r#"
        UPDATE dhikrs
        SET name = ?, target_count = ?, is_favorite = ?,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(name)
    .bind(target_count)
    .bind(is_favorite)
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    get_dhikr(pool, id, user_id).await
}

/// 디크르를 삭제합니다. 세션은 ON DELETE CASCADE로 함께 지워집니다.
///
/// 삭제된 행이 있으면 true.
pub async fn delete_dhikr(pool: &SqlitePool, id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM dhikrs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
