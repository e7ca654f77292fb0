//! # 로컬/서버 카운트 재조정
//!
//! 카운터를 (다시) 불러올 때 로컬 스냅샷과 서버 세션 중 어느 쪽 카운트를 믿을지 정합니다.
//!
//! ## 규칙
//! 1. 서버 세션 없음 → 로컬 카운트(없으면 0). 로컬 카운트가 0보다 크면 서버 쓰기가 필요합니다.
//!    로컬 스냅샷에 기억된 세션 ID가 있으면 그 세션을 갱신하고, 없으면 생성합니다.
//!    (서버 조회가 실패한 오프라인 재로딩에서도 세션 ID를 잃지 않습니다.)
//! 2. 서버 세션만 있음 → 서버 카운트. 저장된 상태입니다.
//! 3. 둘 다 있음 → 로컬 시각이 서버 `updatedAt`보다 **엄격히** 늦고 로컬 카운트가
//!    **엄격히** 크면 로컬이 이깁니다 (서버 카운트가 저장 기준선). 그 외에는 서버가 이깁니다.
//!
//! 두 값을 합치지 않습니다. 한쪽이 통째로 이깁니다.
//! 시계는 클라이언트와 서버가 다를 수 있으므로 이 비교는 단일 사용자 카운터 수준에서만 유효합니다.

use chrono::DateTime;

use super::local_store::CachedSnapshot;
use crate::models::DhikrSession;

/// 서버에서 받은 세션을 비교 가능한 형태로 바꾼 것
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub session_id: String,
    pub count: u32,
    pub completed: bool,
    /// 서버 `updatedAt` (에포크 밀리초)
    pub updated_at: i64,
}

impl ServerSnapshot {
    /// `updatedAt`을 해석할 수 없으면 `None`. 호출 측은 "서버 세션 없음"으로 취급합니다.
    pub fn from_session(session: &DhikrSession) -> Option<Self> {
        let updated_at = DateTime::parse_from_rfc3339(&session.updated_at)
            .map_err(|e| {
                tracing::warn!(session_id = %session.id, "Unparseable session timestamp: {}", e);
            })
            .ok()?
            .timestamp_millis();

        Some(Self {
            session_id: session.id.clone(),
            count: u32::try_from(session.current_count.max(0)).unwrap_or(u32::MAX),
            completed: session.completed,
            updated_at,
        })
    }
}

/// 서버에 아직 보내야 하는 쓰기
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    None,
    /// 서버 세션이 없으므로 생성
    Create,
    /// 기존 세션 갱신
    Update { session_id: String },
}

/// 재조정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// 화면에 보여줄 권위 있는 카운트
    pub count: u32,
    pub has_unsaved_changes: bool,
    /// 더티 추적 기준선: 서버가 확인한 마지막 카운트
    pub last_saved_count: u32,
    pub session_id: Option<String>,
    pub pending: PendingWrite,
    /// 이 결과를 만든 쪽의 변경 시각 (에포크 밀리초, 둘 다 없으면 None)
    pub updated_at: Option<i64>,
}

/// 로컬 스냅샷과 서버 스냅샷 중 권위 있는 카운트를 고릅니다.
pub fn resolve(local: Option<&CachedSnapshot>, server: Option<&ServerSnapshot>) -> Resolution {
    match (local, server) {
        (local, None) => {
            let count = local.map_or(0, |l| l.count);
            let session_id = local.and_then(|l| l.session_id.clone());
            let pending = match (&session_id, count > 0) {
                (_, false) => PendingWrite::None,
                (Some(id), true) => PendingWrite::Update {
                    session_id: id.clone(),
                },
                (None, true) => PendingWrite::Create,
            };
            Resolution {
                count,
                has_unsaved_changes: count > 0,
                last_saved_count: 0,
                session_id,
                pending,
                updated_at: local.map(|l| l.last_updated),
            }
        }
        (Some(local), Some(server))
            if local.last_updated > server.updated_at && local.count > server.count =>
        {
            Resolution {
                count: local.count,
                has_unsaved_changes: true,
                last_saved_count: server.count,
                session_id: Some(server.session_id.clone()),
                pending: PendingWrite::Update {
                    session_id: server.session_id.clone(),
                },
                updated_at: Some(local.last_updated),
            }
        }
        (_, Some(server)) => Resolution {
            count: server.count,
            has_unsaved_changes: false,
            last_saved_count: server.count,
            session_id: Some(server.session_id.clone()),
            pending: PendingWrite::None,
            updated_at: Some(server.updated_at),
        },
    }
}
