//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들과 라우터 구성을 모아둔 모듈입니다.
//!
//! 각 하위 모듈:
//! - `dhikrs`: 디크르 CRUD
//! - `sessions`: 현재 세션 조회(클라이언트 재조정의 데이터 소스)와 세션 이력
//! - `sync`: 배치 동기화 엔드포인트
//! - `health`: 서버 상태 확인

pub mod dhikrs;
pub mod health;
pub mod sessions;
pub mod sync;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;

pub use dhikrs::*;
pub use health::*;
pub use sessions::*;
pub use sync::*;

/// 애플리케이션 공유 상태
///
/// 모든 요청 핸들러가 `State(state): State<AppState>`로 접근합니다.
/// SqlitePool은 내부적으로 Arc를 사용하므로 clone해도 같은 풀을 가리킵니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀
    pub pool: SqlitePool,
    /// JWT 서명 검증용 비밀키 (인증 서비스와 공유)
    pub jwt_secret: String,
    /// 배치 요청 하나에 허용되는 최대 작업 수
    pub max_batch_size: usize,
}

/// `/api/v1` 아래에 들어갈 API 라우터를 만듭니다.
///
/// axum 0.8부터 경로 파라미터는 `{id}` 문법을 씁니다.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/dhikrs", get(list_dhikrs).post(create_dhikr))
        .route(
            "/dhikrs/{id}",
            get(get_dhikr).patch(update_dhikr).delete(delete_dhikr),
        )
        .route("/dhikrs/{id}/session", get(get_current_session))
        .route("/dhikrs/{id}/sessions", get(list_dhikr_sessions))
        .route("/sync/batch", post(batch_sync))
        .route("/health", get(health_check))
        .with_state(state)
}
