//! # 디크르(Dhikr) 라우트 핸들러
//!
//! ## 엔드포인트
//! - `GET    /api/v1/dhikrs`      → 내 디크르 목록 (즐겨찾기 우선)
//! - `POST   /api/v1/dhikrs`      → 새 디크르 생성
//! - `GET    /api/v1/dhikrs/{id}` → 단일 디크르 조회
//! - `PATCH  /api/v1/dhikrs/{id}` → 이름/목표/즐겨찾기 수정
//! - `DELETE /api/v1/dhikrs/{id}` → 삭제 (세션 포함)
//!
//! 모든 핸들러는 `AuthUser`가 필요하며, 다른 사용자의 디크르는 404로 응답합니다.

use crate::{db, error::AppError, middleware::auth::AuthUser, models::*, routes::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

/// 디크르 이름 최대 길이 (문자 수)
const MAX_NAME_CHARS: usize = 200;

fn validate_name(name: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "Name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_target(target_count: i64) -> Result<(), AppError> {
    if target_count < 1 {
        return Err(AppError::BadRequest(
            "Target count must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// `GET /dhikrs` → `{ "dhikrs": [...] }`
pub async fn list_dhikrs(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let dhikrs = db::list_dhikrs(&state.pool, &auth_user.user_id).await?;
    Ok(Json(json!({ "dhikrs": dhikrs })))
}

/// `POST /dhikrs`: 201 Created와 생성된 디크르를 반환합니다.
pub async fn create_dhikr(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<CreateDhikrRequest>,
) -> Result<(StatusCode, Json<Dhikr>), AppError> {
    validate_name(&req.name)?;
    validate_target(req.target_count)?;

    db::users::ensure_user(&state.pool, &auth_user.user_id).await?;
    let dhikr = db::create_dhikr(&state.pool, &auth_user.user_id, &req).await?;
    tracing::info!(dhikr_id = %dhikr.id, "Created dhikr");
    Ok((StatusCode::CREATED, Json(dhikr)))
}

/// `GET /dhikrs/{id}`
pub async fn get_dhikr(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Dhikr>, AppError> {
    let dhikr = db::get_dhikr(&state.pool, &id, &auth_user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(dhikr))
}

/// `PATCH /dhikrs/{id}`: 전달된 필드만 바꿉니다.
pub async fn update_dhikr(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateDhikrRequest>,
) -> Result<Json<Dhikr>, AppError> {
    if let Some(name) = req.name.as_deref() {
        validate_name(name)?;
    }
    if let Some(target) = req.target_count {
        validate_target(target)?;
    }

    let dhikr = db::update_dhikr(&state.pool, &id, &auth_user.user_id, &req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(dhikr))
}

/// `DELETE /dhikrs/{id}`: 204 No Content
pub async fn delete_dhikr(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !db::delete_dhikr(&state.pool, &id, &auth_user.user_id).await? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
