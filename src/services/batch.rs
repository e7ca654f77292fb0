//! # 배치 동기화 서비스
//!
//! 클라이언트 동기화 큐가 보낸 세션 변경 배열을 처리합니다.
//!
//! ## 처리 규칙
//! - 작업은 배열 순서대로 **하나씩** 적용합니다 (병렬 처리 없음).
//!   같은 논리적 세션에 대한 작업이 여러 개 섞여 와도 마지막 작업이 이깁니다.
//! - 각 작업의 성공/실패는 독립적입니다. 하나가 실패해도 다음 작업은 계속됩니다.
//! - 모든 작업은 호출자(user_id) 범위입니다. 남의 디크르나 세션은 not_found로 실패합니다.
//! - 봉투(envelope) 검증은 처리 전에 한 번만 하며, 실패하면 배치 전체를 거부합니다.

use sqlx::SqlitePool;

use crate::db;
use crate::error::AppError;
use crate::models::{BatchItemResult, BatchSyncRequest, BatchSyncResponse, DhikrSession, QueuedUpdate};

/// 배치 봉투를 검증합니다. 항목 처리 전에 호출해야 합니다.
pub fn validate_batch(request: &BatchSyncRequest, max_batch_size: usize) -> Result<(), AppError> {
    if request.updates.len() > max_batch_size {
        return Err(AppError::BadRequest(format!(
            "Batch contains {} updates, maximum is {}",
            request.updates.len(),
            max_batch_size
        )));
    }

    for (index, update) in request.updates.iter().enumerate() {
        if update.dhikr_id().trim().is_empty() {
            return Err(AppError::BadRequest(format!(
                "Update {index} is missing dhikrId"
            )));
        }
        if let QueuedUpdate::SessionUpdate { session_id, .. } = update {
            if session_id.trim().is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Update {index} is missing sessionId"
                )));
            }
        }
    }

    Ok(())
}

/// 검증된 배치를 순서대로 적용하고 항목별 결과를 모읍니다.
pub async fn apply_batch(
    pool: &SqlitePool,
    user_id: &str,
    updates: &[QueuedUpdate],
) -> BatchSyncResponse {
    let mut results = Vec::with_capacity(updates.len());

    for (index, update) in updates.iter().enumerate() {
        let result = match apply_update(pool, user_id, update).await {
            Ok(session) => BatchItemResult {
                success: true,
                index,
                session_id: Some(session.id),
                error: None,
                error_code: None,
            },
            Err(e) => {
                tracing::warn!(index, dhikr_id = update.dhikr_id(), "Batch update failed: {}", e);
                BatchItemResult {
                    success: false,
                    index,
                    session_id: None,
                    error: Some(e.to_string()),
                    error_code: Some(e.code().to_string()),
                }
            }
        };
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    tracing::debug!(
        user_id,
        processed = results.len(),
        succeeded,
        failed,
        "Batch sync applied"
    );

    BatchSyncResponse {
        success: true,
        processed: results.len(),
        succeeded,
        failed,
        results,
    }
}

/// 작업 하나를 적용합니다.
///
/// 완료 여부는 명시적 `completed`가 있으면 그 값을, 없으면 `count >= target_count`로 정합니다.
async fn apply_update(
    pool: &SqlitePool,
    user_id: &str,
    update: &QueuedUpdate,
) -> Result<DhikrSession, AppError> {
    let dhikr = db::get_dhikr(pool, update.dhikr_id(), user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let count = i64::from(update.count());
    let completed = update
        .completed()
        .unwrap_or_else(|| dhikr.is_reached_by(count));

    match update {
        QueuedUpdate::SessionCreate { .. } => {
            // 멱등 생성: 활성 세션이 이미 있으면 새로 만들지 않고 갱신
            match db::find_active_session(pool, &dhikr.id, user_id).await? {
                Some(active) => db::update_session_count(pool, &active.id, user_id, count, completed)
                    .await?
                    .ok_or(AppError::NotFound),
                None => db::create_session(pool, &dhikr.id, user_id, count, completed).await,
            }
        }
        QueuedUpdate::SessionUpdate { session_id, .. } => {
            let session = db::get_session(pool, session_id, user_id)
                .await?
                .ok_or(AppError::NotFound)?;
            if session.dhikr_id != dhikr.id {
                return Err(AppError::NotFound);
            }

            db::update_session_count(pool, &session.id, user_id, count, completed)
                .await?
                .ok_or(AppError::NotFound)
        }
    }
}
