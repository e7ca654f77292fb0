//! # 배치 동기화 와이어(wire) 타입
//!
//! `POST /api/v1/sync/batch`의 요청/응답 본문입니다.
//! 서버(services::batch)와 클라이언트(sync_client)가 같은 타입을 공유합니다.
//!
//! ```json
//! { "updates": [
//!   { "type": "session_create", "dhikrId": "…", "count": 3, "timestamp": 1760000000000 },
//!   { "type": "session_update", "sessionId": "…", "dhikrId": "…", "count": 33,
//!     "timestamp": 1760000000500, "completed": true }
//! ] }
//! ```

use serde::{Deserialize, Serialize};

/// 큐에 쌓였다가 배치로 전송되는 세션 변경 하나
///
/// `type` 필드로 구분되는 태그드 열거형입니다.
/// `timestamp`는 클라이언트 에포크 밀리초이며 서버는 참고만 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueuedUpdate {
    /// 세션 ID를 아직 모르는 경우. 서버가 활성 세션을 찾거나 새로 만듭니다.
    #[serde(rename_all = "camelCase")]
    SessionCreate {
        dhikr_id: String,
        count: u32,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed: Option<bool>,
    },
    /// 세션 ID를 아는 경우
    #[serde(rename_all = "camelCase")]
    SessionUpdate {
        session_id: String,
        dhikr_id: String,
        count: u32,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed: Option<bool>,
    },
}

/// 큐 중복 제거에 쓰는 논리적 세션 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalSession {
    /// 서버가 부여한 세션 ID
    Session(String),
    /// 아직 생성 전인 세션: 디크르 ID로 식별
    Pending(String),
}

impl QueuedUpdate {
    pub fn dhikr_id(&self) -> &str {
        match self {
            QueuedUpdate::SessionCreate { dhikr_id, .. }
            | QueuedUpdate::SessionUpdate { dhikr_id, .. } => dhikr_id,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            QueuedUpdate::SessionCreate { count, .. }
            | QueuedUpdate::SessionUpdate { count, .. } => *count,
        }
    }

    pub fn completed(&self) -> Option<bool> {
        match self {
            QueuedUpdate::SessionCreate { completed, .. }
            | QueuedUpdate::SessionUpdate { completed, .. } => *completed,
        }
    }

    /// 생성 항목을 서버가 부여한 세션의 갱신 항목으로 바꿉니다. 갱신 항목은 그대로입니다.
    pub fn into_session_update(self, session_id: &str) -> Self {
        match self {
            QueuedUpdate::SessionCreate {
                dhikr_id,
                count,
                timestamp,
                completed,
            } => QueuedUpdate::SessionUpdate {
                session_id: session_id.to_string(),
                dhikr_id,
                count,
                timestamp,
                completed,
            },
            update => update,
        }
    }

    /// 같은 논리적 세션을 가리키는 항목끼리는 최신 것 하나만 큐에 남습니다.
    pub fn logical_session(&self) -> LogicalSession {
        match self {
            QueuedUpdate::SessionUpdate { session_id, .. } => {
                LogicalSession::Session(session_id.clone())
            }
            QueuedUpdate::SessionCreate { dhikr_id, .. } => {
                LogicalSession::Pending(dhikr_id.clone())
            }
        }
    }
}

/// 배치 요청 본문
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSyncRequest {
    pub updates: Vec<QueuedUpdate>,
}

/// 항목 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub success: bool,
    /// 요청 배열에서의 위치
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 실패 종류 (`not_found`, `bad_request`, `internal_error`, `database_error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl BatchItemResult {
    /// 재시도할 가치가 있는 실패인지 (서버 측 일시 장애)
    pub fn is_transient_failure(&self) -> bool {
        !self.success
            && matches!(
                self.error_code.as_deref(),
                Some("internal_error") | Some("database_error")
            )
    }
}

/// 배치 응답 본문
///
/// 일부 항목이 실패해도 `success`는 true입니다. 부분 실패는 `results`로만 드러납니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSyncResponse {
    pub success: bool,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_wire_format_uses_type_tag_and_camel_case() {
        let update = QueuedUpdate::SessionUpdate {
            session_id: "s1".into(),
            dhikr_id: "d1".into(),
            count: 12,
            timestamp: 1_000,
            completed: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "session_update",
                "sessionId": "s1",
                "dhikrId": "d1",
                "count": 12,
                "timestamp": 1000
            })
        );
    }

    #[test]
    fn negative_count_is_rejected_at_parse_time() {
        let body = json!({
            "updates": [{ "type": "session_create", "dhikrId": "d1", "count": -1, "timestamp": 0 }]
        });
        assert!(serde_json::from_value::<BatchSyncRequest>(body).is_err());
    }

    #[test]
    fn create_and_update_have_distinct_logical_keys() {
        let create = QueuedUpdate::SessionCreate {
            dhikr_id: "d1".into(),
            count: 1,
            timestamp: 0,
            completed: None,
        };
        assert_eq!(create.logical_session(), LogicalSession::Pending("d1".into()));
    }
}
