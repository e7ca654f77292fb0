//! # 배치 동기화 엔드포인트
//!
//! `POST /api/v1/sync/batch` + `{ "updates": [...] }`
//!
//! 일반 요청과 페이지 종료 시의 best-effort 전송(응답을 보지 않는 전송)이
//! 같은 본문을 보냅니다. 후자는 `Content-Type`이 `text/plain`일 수 있으므로
//! `Json` Extractor 대신 원본 바이트를 받아 직접 파싱합니다.

use axum::{body::Bytes, extract::State, Json};

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::{BatchSyncRequest, BatchSyncResponse},
    routes::AppState,
    services::batch,
};

/// 배치를 검증하고 순서대로 적용합니다.
///
/// 일부 항목이 실패해도 200과 `success: true`를 반환합니다.
/// 본문 형식이 잘못되면 어떤 항목도 처리하지 않고 400을 반환합니다.
pub async fn batch_sync(
    State(state): State<AppState>,
    auth_user: AuthUser,
    body: Bytes,
) -> Result<Json<BatchSyncResponse>, AppError> {
    let request: BatchSyncRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid batch body: {e}")))?;

    batch::validate_batch(&request, state.max_batch_size)?;

    let response = batch::apply_batch(&state.pool, &auth_user.user_id, &request.updates).await;
    if response.failed > 0 {
        tracing::info!(
            failed = response.failed,
            processed = response.processed,
            "Batch sync finished with partial failures"
        );
    }

    Ok(Json(response))
}
