//! # 동기화 전송 계층
//!
//! 큐와 트래커는 구체적인 HTTP 클라이언트가 아니라 세 가지 능력(capability)에 의존합니다.
//!
//! - [`BatchTransport`]: 요청/응답형 배치 전송. 응답을 기다립니다.
//! - [`BestEffortTransport`]: 페이지 숨김/종료 시의 전송. 응답을 보지 않고,
//!   보내기 전에 거부되는 경우에만 동기적으로 실패를 알립니다.
//! - [`SessionSource`]: 재조정에 쓸 현재 세션 조회.
//!
//! [`HttpTransport`]는 셋 모두를 `reqwest`로 구현합니다.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use super::error::SyncError;
use crate::models::{BatchSyncRequest, BatchSyncResponse, CurrentSessionResponse};

/// best-effort 전송이 받아들이는 최대 본문 크기 (브라우저 beacon 한도와 같음)
pub const MAX_BEST_EFFORT_PAYLOAD_BYTES: usize = 64 * 1024;

#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send_batch(&self, request: &BatchSyncRequest) -> Result<BatchSyncResponse, SyncError>;
}

pub trait BestEffortTransport: Send + Sync {
    /// 전송을 맡기고 즉시 반환합니다. `Err`는 전송이 시작조차 되지 않았음을 뜻합니다.
    fn send_best_effort(&self, request: &BatchSyncRequest) -> Result<(), SyncError>;
}

#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn fetch_current(&self, dhikr_id: &str) -> Result<CurrentSessionResponse, SyncError>;
}

/// REST API(`/api/v1`)를 쓰는 전송 구현
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpTransport {
    /// `base_url`은 `/api/v1`까지 포함한 주소입니다 (예: "http://localhost:3000/api/v1").
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn batch_url(&self) -> String {
        format!("{}/sync/batch", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("API response error ({}): {}", status, body);
        Err(SyncError::api(status.as_u16(), body))
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send_batch(&self, request: &BatchSyncRequest) -> Result<BatchSyncResponse, SyncError> {
        let response = self
            .authorize(self.client.post(self.batch_url()))
            .json(request)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}

impl BestEffortTransport for HttpTransport {
    fn send_best_effort(&self, request: &BatchSyncRequest) -> Result<(), SyncError> {
        let body = serde_json::to_vec(request)?;
        if body.len() > MAX_BEST_EFFORT_PAYLOAD_BYTES {
            return Err(SyncError::Rejected(format!(
                "payload of {} bytes exceeds {} byte limit",
                body.len(),
                MAX_BEST_EFFORT_PAYLOAD_BYTES
            )));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let builder = self
            .authorize(self.client.post(self.batch_url()))
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body);

        // 응답은 관찰하지 않습니다
        runtime.spawn(async move {
            if let Err(e) = builder.send().await {
                tracing::debug!("Best-effort batch delivery failed: {}", e);
            }
        });

        Ok(())
    }
}

#[async_trait]
impl SessionSource for HttpTransport {
    async fn fetch_current(&self, dhikr_id: &str) -> Result<CurrentSessionResponse, SyncError> {
        let url = format!("{}/dhikrs/{}/session", self.base_url, dhikr_id);
        let response = self.authorize(self.client.get(url)).send().await?;

        Ok(Self::check(response).await?.json().await?)
    }
}
