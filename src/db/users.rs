//! # 사용자 등록 쿼리
//!
//! 토큰 발급은 외부 인증 서비스가 맡고, 이 서버는 JWT의 `sub`만 봅니다.
//! `users` 행은 디크르와 세션의 외래 키 대상일 뿐이라 처음 디크르를 만들 때 채워 넣습니다.

use crate::error::AppError;
use sqlx::SqlitePool;

/// 사용자 행이 없으면 만듭니다. 이미 있으면 아무것도 바꾸지 않습니다.
pub async fn ensure_user(pool: &SqlitePool, user_id: &str) -> Result<(), AppError> {
    sqlx::query("INSERT INTO users (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}
