//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 라우트 핸들러(routes/)와 배치 서비스(services/)가 이 모듈의 함수를 호출합니다.
//!
//! 각 하위 모듈:
//! - `dhikrs`: 디크르 CRUD (항상 소유자 범위로 조회)
//! - `sessions`: 디크르 세션 find-or-create, 카운트 갱신, 이력 조회
//! - `users`: 외래 키 대상인 사용자 행 등록

pub mod dhikrs;
pub mod sessions;
pub mod users;

pub use dhikrs::*;
pub use sessions::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// 서버 시각을 DB와 같은 형식(밀리초 정밀도 ISO 8601 UTC)으로 만듭니다.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// 연결 풀을 만들고 마이그레이션을 실행합니다.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// 테스트용 인메모리 DB
///
/// `sqlite::memory:`는 연결마다 별도 DB가 되므로 연결을 하나로 고정합니다.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// 테스트용 사용자 한 명을 등록하고 ID를 반환합니다. `label`은 ID 앞부분이 됩니다.
#[cfg(test)]
pub async fn test_user(pool: &SqlitePool, label: &str) -> String {
    let id = format!("{label}-{}", uuid::Uuid::now_v7());
    users::ensure_user(pool, &id)
        .await
        .expect("register test user");
    id
}
