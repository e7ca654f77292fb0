//! # 세션 트래커
//!
//! 카운터 하나의 진행 상태를 두 층으로 관리합니다.
//! - **확인된 상태**: 서버가 마지막으로 저장한 카운트 (`last_saved_count`)
//! - **추정 상태**: 화면에 보이는 낙관적 로컬 카운트 (`count`)
//!
//! 두 값이 다르면 "저장되지 않은 변경"이 있는 것입니다.
//! 탭할 때마다 로컬 저장소에 먼저 쓰고, 로그인 사용자라면 동기화 큐에 적재합니다.
//! 게스트와 임시 카운터는 로컬에만 저장합니다.
//!
//! 큐가 방송하는 [`SyncOutcome`]은 다음 조작(또는 `state()` 조회) 때 반영됩니다.
//! 서버가 부여한 세션 ID를 받아들여 이후 쓰기를 같은 세션의 갱신으로 보내고,
//! 서버가 확인한 카운트로 `last_saved_count`를 옮깁니다.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::local_store::{CachedSnapshot, CountStore, StoreKey};
use super::queue::{SyncOutcome, SyncQueue};
use super::reconcile::{resolve, PendingWrite, Resolution, ServerSnapshot};
use super::transport::SessionSource;
use crate::models::QueuedUpdate;

/// 로그인 사용자에게만 있는 서버 연동 부분
struct Remote {
    queue: SyncQueue,
    source: Arc<dyn SessionSource>,
    outcomes: broadcast::Receiver<SyncOutcome>,
}

/// 카운터의 현재 진행 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerState {
    pub count: u32,
    pub last_saved_count: u32,
    pub session_id: Option<String>,
    pub target_count: Option<u32>,
}

impl TrackerState {
    pub fn has_unsaved_changes(&self) -> bool {
        self.count != self.last_saved_count
    }

    pub fn is_completed(&self) -> bool {
        self.target_count.is_some_and(|target| self.count >= target)
    }
}

pub struct SessionTracker {
    dhikr_id: String,
    key: StoreKey,
    store: Arc<dyn CountStore>,
    remote: Option<Remote>,
    state: TrackerState,
}

impl SessionTracker {
    /// 게스트 디크르: 로컬 저장소만 사용
    pub fn guest(dhikr_id: &str, target_count: u32, store: Arc<dyn CountStore>) -> Self {
        Self::local_only(
            dhikr_id,
            StoreKey::Guest {
                dhikr_id: dhikr_id.to_string(),
            },
            target_count,
            store,
        )
    }

    /// 임시 카운터: 로컬 저장소만 사용
    pub fn temporary(counter_id: &str, target_count: u32, store: Arc<dyn CountStore>) -> Self {
        Self::local_only(
            counter_id,
            StoreKey::Temporary {
                counter_id: counter_id.to_string(),
            },
            target_count,
            store,
        )
    }

    fn local_only(id: &str, key: StoreKey, target_count: u32, store: Arc<dyn CountStore>) -> Self {
        Self {
            dhikr_id: id.to_string(),
            key,
            store,
            remote: None,
            state: TrackerState {
                target_count: Some(target_count),
                ..Default::default()
            },
        }
    }

    /// 로그인 사용자: 로컬 백업 + 서버 동기화
    pub fn authenticated(
        dhikr_id: &str,
        user_id: &str,
        store: Arc<dyn CountStore>,
        queue: SyncQueue,
        source: Arc<dyn SessionSource>,
    ) -> Self {
        Self {
            dhikr_id: dhikr_id.to_string(),
            key: StoreKey::Backup {
                user_id: user_id.to_string(),
                dhikr_id: dhikr_id.to_string(),
            },
            store,
            remote: Some(Remote {
                outcomes: queue.subscribe(),
                queue,
                source,
            }),
            state: TrackerState::default(),
        }
    }

    /// 현재 상태. 그 사이 도착한 동기화 결과를 먼저 반영합니다.
    pub fn state(&mut self) -> &TrackerState {
        self.absorb_outcomes();
        &self.state
    }

    fn absorb_outcomes(&mut self) {
        let Some(remote) = &mut self.remote else {
            return;
        };
        let mut received = Vec::new();
        loop {
            match remote.outcomes.try_recv() {
                Ok(outcome) if outcome.dhikr_id() == self.dhikr_id => received.push(outcome),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(dhikr_id = %self.dhikr_id, skipped, "Missed sync outcomes");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        for outcome in received {
            self.apply_outcome(outcome);
        }
    }

    fn apply_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Saved {
                session_id, count, ..
            } => {
                self.state.last_saved_count = count;
                if self.state.session_id.as_deref() != Some(session_id.as_str()) {
                    tracing::debug!(dhikr_id = %self.dhikr_id, %session_id, "Adopted server session");
                    self.state.session_id = Some(session_id);
                    self.remember_session();
                }
            }
            SyncOutcome::Dropped {
                session_id: Some(session_id),
                error_code,
                ..
            } if self.state.session_id.as_deref() == Some(session_id.as_str()) => {
                tracing::warn!(
                    dhikr_id = %self.dhikr_id,
                    %session_id,
                    error_code = error_code.as_deref().unwrap_or("unknown"),
                    "Server rejected session; next change starts a new one"
                );
                self.state.session_id = None;
                self.remember_session();
            }
            SyncOutcome::Dropped { .. } => {}
        }
    }

    /// 로컬 스냅샷의 세션 ID만 현재 값으로 바꿉니다.
    fn remember_session(&self) {
        if let Some(mut snapshot) = self.store.read(&self.key) {
            snapshot.session_id = self.state.session_id.clone();
            self.store.write(&self.key, &snapshot);
        }
    }

    /// 로컬 스냅샷과 서버 세션을 재조정해 시작 카운트를 정합니다.
    ///
    /// 서버 조회 실패는 "서버 세션 없음"으로 취급합니다 (다음 로드에서 재시도).
    /// 서버에 빚진 쓰기가 있으면 큐에 넣습니다.
    pub async fn load(&mut self) -> Resolution {
        self.absorb_outcomes();
        let local = self.store.read(&self.key);

        let Some(remote) = &self.remote else {
            // 로컬 전용: 로컬 값이 곧 저장된 값
            let count = local.as_ref().map_or(0, |l| l.count);
            self.state.count = count;
            self.state.last_saved_count = count;
            return Resolution {
                count,
                has_unsaved_changes: false,
                last_saved_count: count,
                session_id: None,
                pending: PendingWrite::None,
                updated_at: local.map(|l| l.last_updated),
            };
        };

        let server = match remote.source.fetch_current(&self.dhikr_id).await {
            Ok(response) => {
                self.state.target_count = u32::try_from(response.dhikr.target_count).ok();
                response.session.as_ref().and_then(ServerSnapshot::from_session)
            }
            Err(e) => {
                tracing::warn!(dhikr_id = %self.dhikr_id, "Session fetch failed, using local count: {}", e);
                None
            }
        };

        let resolution = resolve(local.as_ref(), server.as_ref());
        self.state.count = resolution.count;
        self.state.last_saved_count = resolution.last_saved_count;
        self.state.session_id = resolution.session_id.clone();

        if let Some(updated_at) = resolution.updated_at {
            self.store.write(
                &self.key,
                &CachedSnapshot {
                    count: resolution.count,
                    last_updated: updated_at,
                    session_id: resolution.session_id.clone(),
                },
            );
        }

        if resolution.pending != PendingWrite::None {
            let update = self.pending_update(Utc::now().timestamp_millis(), None);
            remote.queue.enqueue(update);
        }

        resolution
    }

    /// 카운트를 1 올리고 새 카운트를 반환합니다.
    pub fn increment(&mut self) -> u32 {
        self.absorb_outcomes();
        self.state.count = self.state.count.saturating_add(1);
        self.record(None);
        self.state.count
    }

    /// 카운트를 0으로 되돌립니다. 완료 상태도 함께 해제됩니다.
    pub fn reset(&mut self) {
        self.absorb_outcomes();
        self.state.count = 0;
        self.record(Some(false));
    }

    fn record(&mut self, completed: Option<bool>) {
        let now = Utc::now().timestamp_millis();
        self.store.write(
            &self.key,
            &CachedSnapshot {
                count: self.state.count,
                last_updated: now,
                session_id: self.state.session_id.clone(),
            },
        );

        match &self.remote {
            Some(remote) => remote.queue.enqueue(self.pending_update(now, completed)),
            None => self.state.last_saved_count = self.state.count,
        }
    }

    fn pending_update(&self, timestamp: i64, completed: Option<bool>) -> QueuedUpdate {
        match &self.state.session_id {
            Some(session_id) => QueuedUpdate::SessionUpdate {
                session_id: session_id.clone(),
                dhikr_id: self.dhikr_id.clone(),
                count: self.state.count,
                timestamp,
                completed,
            },
            None => QueuedUpdate::SessionCreate {
                dhikr_id: self.dhikr_id.clone(),
                count: self.state.count,
                timestamp,
                completed,
            },
        }
    }

    /// 큐를 즉시 비우고 그 결과를 반영합니다.
    pub async fn sync_now(&mut self) -> bool {
        let Some(remote) = &self.remote else {
            return true;
        };
        let ok = remote.queue.flush().await;
        self.absorb_outcomes();
        ok
    }

    /// 페이지 숨김/종료 시 호출: best-effort 전송으로 큐를 비웁니다.
    pub fn flush_on_hide(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.queue.flush_via_best_effort(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::db;
    use crate::models::{CreateDhikrRequest, CurrentSessionResponse, Dhikr, DhikrSession};
    use crate::sync_client::local_store::MemoryStore;
    use crate::sync_client::transport::testing::{
        RecordingTransport, ServiceTransport, StaticSource,
    };
    use sqlx::SqlitePool;
    use std::time::Duration;

    fn dhikr(target: i64) -> Dhikr {
        Dhikr {
            id: "d1".into(),
            user_id: "u1".into(),
            name: "Subhanallah".into(),
            target_count: target,
            is_favorite: false,
            arabic_text: None,
            transliteration: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn session(count: i64, updated_at: &str) -> DhikrSession {
        DhikrSession {
            id: "s1".into(),
            dhikr_id: "d1".into(),
            user_id: "u1".into(),
            current_count: count,
            completed: false,
            started_at: "2026-01-01T00:00:00.000Z".into(),
            completed_at: None,
            updated_at: updated_at.into(),
        }
    }

    fn tracker(
        response: Option<CurrentSessionResponse>,
        store: Arc<MemoryStore>,
    ) -> (SessionTracker, Arc<RecordingTransport>, SyncQueue) {
        let transport = Arc::new(RecordingTransport::default());
        let queue = SyncQueue::new(
            SyncConfig {
                batch_delay: Duration::from_millis(2000),
                max_queue_size: 10,
            },
            transport.clone(),
            transport.clone(),
        );
        let tracker = SessionTracker::authenticated(
            "d1",
            "u1",
            store,
            queue.clone(),
            Arc::new(StaticSource { response }),
        );
        (tracker, transport, queue)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_taps_produce_one_request_with_final_count() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, transport, _queue) = tracker(
            Some(CurrentSessionResponse {
                session: None,
                dhikr: dhikr(33),
            }),
            store,
        );
        tracker.load().await;

        for _ in 0..12 {
            tracker.increment();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(transport.request_count(), 1);
        let request = transport.last_request().unwrap();
        assert_eq!(request.updates.len(), 1);
        assert_eq!(request.updates[0].count(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_local_progress_is_pushed_after_load() {
        let store = Arc::new(MemoryStore::new());
        let key = StoreKey::Backup {
            user_id: "u1".into(),
            dhikr_id: "d1".into(),
        };
        // 서버 시각보다 뒤의 로컬 변경
        store.write(
            &key,
            &CachedSnapshot {
                count: 10,
                last_updated: 4_102_444_800_000,
                session_id: Some("s1".into()),
            },
        );
        let (mut tracker, _transport, queue) = tracker(
            Some(CurrentSessionResponse {
                session: Some(session(5, "2026-01-01T00:00:05.000Z")),
                dhikr: dhikr(33),
            }),
            store,
        );

        let resolution = tracker.load().await;

        assert_eq!(resolution.count, 10);
        assert!(tracker.state().has_unsaved_changes());
        assert_eq!(queue.queue_length(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_falls_back_to_local() {
        let store = Arc::new(MemoryStore::new());
        store.write(
            &StoreKey::Backup {
                user_id: "u1".into(),
                dhikr_id: "d1".into(),
            },
            &CachedSnapshot {
                count: 7,
                last_updated: 1,
                session_id: None,
            },
        );
        let (mut tracker, _transport, queue) = tracker(None, store);

        let resolution = tracker.load().await;

        assert_eq!(resolution.count, 7);
        assert_eq!(resolution.pending, PendingWrite::Create);
        assert_eq!(queue.queue_length(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn known_session_sends_updates_and_sync_marks_saved() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, transport, _queue) = tracker(
            Some(CurrentSessionResponse {
                session: Some(session(3, "2026-01-01T00:00:05.000Z")),
                dhikr: dhikr(5),
            }),
            store.clone(),
        );
        tracker.load().await;
        assert!(!tracker.state().has_unsaved_changes());

        tracker.increment();
        tracker.increment();
        assert!(tracker.state().is_completed());
        assert!(tracker.state().has_unsaved_changes());

        assert!(tracker.sync_now().await);
        assert!(!tracker.state().has_unsaved_changes());
        let request = transport.last_request().unwrap();
        assert!(matches!(
            &request.updates[0],
            QueuedUpdate::SessionUpdate { session_id, count: 5, .. } if session_id == "s1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_sends_explicit_incomplete_flag() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, transport, _queue) = tracker(
            Some(CurrentSessionResponse {
                session: Some(session(33, "2026-01-01T00:00:05.000Z")),
                dhikr: dhikr(33),
            }),
            store,
        );
        tracker.load().await;

        tracker.reset();
        assert!(tracker.flush_on_hide());

        let sent = transport.best_effort.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].updates[0].count(), 0);
        assert_eq!(sent[0].updates[0].completed(), Some(false));
    }

    #[tokio::test]
    async fn guest_counts_stay_local() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = SessionTracker::guest("d1", 3, store.clone());
        tracker.load().await;
        tracker.increment();
        tracker.increment();

        let mut reloaded = SessionTracker::guest("d1", 3, store);
        let resolution = reloaded.load().await;
        assert_eq!(resolution.count, 2);
        assert!(!reloaded.state().has_unsaved_changes());
        assert!(reloaded.sync_now().await);
    }

    /// 실제 배치 서비스와 인메모리 DB에 연결된 트래커
    struct Harness {
        tracker: SessionTracker,
        queue: SyncQueue,
        store: Arc<MemoryStore>,
        pool: SqlitePool,
        user_id: String,
        dhikr_id: String,
    }

    impl Harness {
        async fn new(target_count: i64) -> Self {
            let pool = db::test_pool().await;
            let user_id = db::test_user(&pool, "fatima").await;
            let dhikr = db::create_dhikr(
                &pool,
                &user_id,
                &CreateDhikrRequest {
                    name: "Astaghfirullah".into(),
                    target_count,
                    is_favorite: false,
                    arabic_text: None,
                    transliteration: None,
                },
            )
            .await
            .unwrap();

            let transport = Arc::new(ServiceTransport {
                pool: pool.clone(),
                user_id: user_id.clone(),
            });
            let queue = SyncQueue::new(
                SyncConfig {
                    batch_delay: Duration::from_millis(50),
                    max_queue_size: 10,
                },
                transport.clone(),
                transport.clone(),
            );
            let store = Arc::new(MemoryStore::new());
            let tracker = SessionTracker::authenticated(
                &dhikr.id,
                &user_id,
                store.clone(),
                queue.clone(),
                transport,
            );

            Self {
                tracker,
                queue,
                store,
                pool,
                user_id,
                dhikr_id: dhikr.id,
            }
        }

        async fn sessions(&self) -> Vec<DhikrSession> {
            db::list_sessions_for_dhikr(&self.pool, &self.dhikr_id, &self.user_id)
                .await
                .unwrap()
        }

        /// 디바운스 타이머가 만료되고 flush가 끝날 때까지 기다립니다.
        async fn settle(&self) {
            for _ in 0..100 {
                if !self.queue.has_pending() && !self.queue.is_syncing() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("queue did not drain");
        }

        fn cached(&self) -> Option<CachedSnapshot> {
            self.store.read(&StoreKey::Backup {
                user_id: self.user_id.clone(),
                dhikr_id: self.dhikr_id.clone(),
            })
        }
    }

    #[tokio::test]
    async fn completed_session_is_continued_and_reset_in_place() {
        let mut h = Harness::new(3).await;
        h.tracker.load().await;

        for _ in 0..3 {
            h.tracker.increment();
        }
        assert!(h.tracker.sync_now().await);

        let session_id = h.tracker.state().session_id.clone().unwrap();
        assert!(!h.tracker.state().has_unsaved_changes());
        assert_eq!(h.cached().unwrap().session_id.as_deref(), Some(session_id.as_str()));

        // 목표를 넘긴 탭도 같은 세션에 쌓임
        h.tracker.increment();
        assert!(h.tracker.sync_now().await);
        h.tracker.increment();
        h.settle().await;

        let sessions = h.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].current_count, 5);
        assert!(sessions[0].completed);

        h.tracker.reset();
        assert!(h.tracker.sync_now().await);

        let sessions = h.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].current_count, 0);
        assert!(!sessions[0].completed);
        assert_eq!(sessions[0].completed_at, None);
        assert!(!h.tracker.state().has_unsaved_changes());
    }

    #[tokio::test]
    async fn automatic_flush_marks_count_saved() {
        let mut h = Harness::new(33).await;
        h.tracker.load().await;

        h.tracker.increment();
        h.tracker.increment();
        assert!(h.tracker.state().has_unsaved_changes());
        h.settle().await;

        let state = h.tracker.state().clone();
        assert!(!state.has_unsaved_changes());
        assert_eq!(state.last_saved_count, 2);
        assert!(state.session_id.is_some());

        h.tracker.increment();
        h.settle().await;
        assert!(!h.tracker.state().has_unsaved_changes());

        let sessions = h.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].current_count, 3);
    }

    #[tokio::test]
    async fn reload_after_sync_picks_up_server_session() {
        let mut h = Harness::new(33).await;
        h.tracker.load().await;
        h.tracker.increment();
        assert!(h.tracker.sync_now().await);

        let transport = Arc::new(ServiceTransport {
            pool: h.pool.clone(),
            user_id: h.user_id.clone(),
        });
        let mut reloaded = SessionTracker::authenticated(
            &h.dhikr_id,
            &h.user_id,
            h.store.clone(),
            h.queue.clone(),
            transport,
        );
        let resolution = reloaded.load().await;

        assert_eq!(resolution.count, 1);
        assert_eq!(resolution.pending, PendingWrite::None);
        assert_eq!(resolution.session_id, h.tracker.state().session_id.clone());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_reload_keeps_remembered_session() {
        let store = Arc::new(MemoryStore::new());
        store.write(
            &StoreKey::Backup {
                user_id: "u1".into(),
                dhikr_id: "d1".into(),
            },
            &CachedSnapshot {
                count: 4,
                last_updated: 1,
                session_id: Some("s9".into()),
            },
        );
        let (mut tracker, transport, _queue) = tracker(None, store);

        let resolution = tracker.load().await;
        assert_eq!(resolution.pending, PendingWrite::Update { session_id: "s9".into() });
        assert!(tracker.flush_on_hide());

        let sent = transport.best_effort.lock().unwrap().clone();
        assert!(matches!(
            &sent[0].updates[0],
            QueuedUpdate::SessionUpdate { session_id, count: 4, .. } if session_id == "s9"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_session_is_forgotten() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, transport, _queue) = tracker(
            Some(CurrentSessionResponse {
                session: Some(session(3, "2026-01-01T00:00:05.000Z")),
                dhikr: dhikr(33),
            }),
            store.clone(),
        );
        tracker.load().await;
        transport.item_failures.lock().unwrap().insert(0, "not_found");

        tracker.increment();
        assert!(tracker.sync_now().await);
        assert_eq!(tracker.state().session_id, None);
        assert!(tracker.state().has_unsaved_changes());

        let key = StoreKey::Backup {
            user_id: "u1".into(),
            dhikr_id: "d1".into(),
        };
        assert_eq!(store.read(&key).unwrap().session_id, None);

        transport.item_failures.lock().unwrap().clear();
        tracker.increment();
        assert!(tracker.sync_now().await);
        assert!(matches!(
            transport.last_request().unwrap().updates[0],
            QueuedUpdate::SessionCreate { count: 5, .. }
        ));
        assert!(!tracker.state().has_unsaved_changes());
    }
}
