//! # 디크르 세션 API 라우트 핸들러
//!
//! ## 엔드포인트 목록
//! | 메서드 | 경로 | 핸들러 | 설명 |
//! |--------|------|--------|------|
//! | GET | /api/v1/dhikrs/{id}/session | `get_current_session` | 현재 세션 + 디크르 |
//! | GET | /api/v1/dhikrs/{id}/sessions | `list_dhikr_sessions` | 세션 이력 |
//!
//! 세션의 생성과 갱신은 별도 엔드포인트가 아니라 `POST /sync/batch`로만 이루어집니다.
//!
//! ## 클라이언트 흐름
//! ```text
//! 1. 화면 진입 → GET /dhikrs/{id}/session (로컬 스냅샷과 재조정)
//! 2. 탭할 때마다 로컬 저장 + 동기화 큐에 적재
//! 3. 디바운스/큐 크기/페이지 숨김 시 → POST /sync/batch
//! ```

use crate::{db, error::AppError, middleware::auth::AuthUser, models::*, routes::AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

/// `GET /dhikrs/{id}/session` → `{ "session": {...} | null, "dhikr": {...} }`
///
/// 세션이 없는 것은 정상 상태입니다 (아직 시작하지 않은 디크르).
pub async fn get_current_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CurrentSessionResponse>, AppError> {
    let dhikr = db::get_dhikr(&state.pool, &id, &auth_user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let session = db::find_current_session(&state.pool, &dhikr.id, &auth_user.user_id).await?;

    Ok(Json(CurrentSessionResponse { session, dhikr }))
}

/// `GET /dhikrs/{id}/sessions` → `{ "sessions": [...] }` (최신순)
pub async fn list_dhikr_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    // 존재하지 않는 디크르는 빈 배열 대신 404
    db::get_dhikr(&state.pool, &id, &auth_user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let sessions = db::list_sessions_for_dhikr(&state.pool, &id, &auth_user.user_id).await?;
    Ok(Json(json!({ "sessions": sessions })))
}
