//! 동기화 클라이언트 에러 타입

use thiserror::Error;

/// 전송 계층에서 발생하는 에러
///
/// 큐의 `flush()`는 이 에러를 호출자에게 올리지 않고 `false`로만 알립니다.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP 클라이언트 에러 (연결 실패, 타임아웃 등)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 요청/응답 직렬화 에러
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 서버가 성공이 아닌 상태 코드로 응답
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// best-effort 전송이 보내기 전에 동기적으로 거부됨 (예: 본문이 너무 큼)
    #[error("Best-effort delivery rejected: {0}")]
    Rejected(String),

    /// 백그라운드 전송을 띄울 Tokio 런타임이 없음
    #[error("No async runtime available for background delivery")]
    NoRuntime,
}

impl SyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}
