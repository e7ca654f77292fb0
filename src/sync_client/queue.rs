//! # 동기화 큐 / 배치 매니저
//!
//! 잦은 로컬 카운트 증가를 주기적인 배치 요청으로 묶습니다.
//!
//! ## 상태 전이
//! ```text
//! Idle ─enqueue→ Pending(타이머) ─(타이머 만료 | 크기 한도 | flush 호출)→ Flushing ─→ Idle
//!   ↑                                                                         │
//!   └──────────────────── clear() (어느 상태에서든) ───────────────────────────┘
//! ```
//!
//! - 같은 논리적 세션의 항목은 큐에 최대 하나, 항상 가장 최근 것만 남습니다.
//! - 큐 변경(enqueue, 중복 제거, flush 직전 비우기)은 모두 잠금 안에서 동기적으로 끝나고
//!   `.await`는 전송 구간에만 있습니다. flush 중에 들어온 항목은 다음 배치로 갑니다.
//! - flush는 한 번에 하나만 진행됩니다. 진행 중에 다시 호출하면 아무것도 보내지 않고
//!   성공으로 반환합니다.
//! - 서버가 처리한 항목마다 [`SyncOutcome`]을 방송합니다. 트래커는 이것을 구독해
//!   새 세션 ID와 서버가 확인한 카운트를 반영합니다.
//! - 생성 항목이 세션 ID를 받으면, 그 사이 큐에 들어온 같은 디크르의 생성 항목은
//!   그 세션의 갱신 항목으로 바뀝니다. 한 번의 시도에 세션은 하나만 생깁니다.

use std::collections::HashSet;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::transport::{BatchTransport, BestEffortTransport};
use crate::config::SyncConfig;
use crate::models::{BatchSyncRequest, LogicalSession, QueuedUpdate};

/// 결과 채널 버퍼. 구독자가 이만큼 뒤처지면 오래된 결과부터 잃습니다.
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// 서버가 처리한 항목 하나의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 서버에 저장됨. `count`가 서버가 확인한 카운트입니다.
    Saved {
        dhikr_id: String,
        session_id: String,
        count: u32,
    },
    /// 재시도해도 소용없는 실패로 버려짐 (`not_found` 등)
    Dropped {
        dhikr_id: String,
        session_id: Option<String>,
        error_code: Option<String>,
    },
}

impl SyncOutcome {
    pub fn dhikr_id(&self) -> &str {
        match self {
            SyncOutcome::Saved { dhikr_id, .. } | SyncOutcome::Dropped { dhikr_id, .. } => dhikr_id,
        }
    }
}

/// 배치 동기화 큐
///
/// `Clone`은 같은 큐를 가리키는 핸들을 하나 더 만듭니다.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    transport: Arc<dyn BatchTransport>,
    best_effort: Arc<dyn BestEffortTransport>,
    outcomes: broadcast::Sender<SyncOutcome>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueuedUpdate>,
    is_syncing: bool,
    timer: Option<JoinHandle<()>>,
    // 타이머가 교체될 때마다 증가. 깨어난 타이머가 자기가 최신인지 확인합니다.
    timer_generation: u64,
    // clear()마다 증가. clear 이전에 떠난 배치는 실패해도 다시 넣지 않습니다.
    epoch: u64,
}

impl QueueState {
    fn cancel_timer(&mut self) {
        self.timer_generation = self.timer_generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// 돌려받은 항목을 큐 앞쪽에 다시 넣습니다.
    ///
    /// 그 사이 같은 논리적 세션으로 더 새로운 항목이 들어왔다면 돌려받은 항목은 버립니다.
    fn requeue_front(&mut self, returned: Vec<QueuedUpdate>) {
        let newer: HashSet<LogicalSession> =
            self.items.iter().map(QueuedUpdate::logical_session).collect();
        let mut merged: Vec<QueuedUpdate> = returned
            .into_iter()
            .filter(|update| !newer.contains(&update.logical_session()))
            .collect();
        merged.append(&mut self.items);
        self.items = merged;
    }

    /// 대기 중인 `dhikr_id`의 생성 항목을 `session_id` 세션의 갱신 항목으로 바꿉니다.
    ///
    /// 같은 세션의 갱신 항목이 이미 있으면 둘 중 나중에 들어온 것만 남깁니다.
    fn promote_pending(&mut self, dhikr_id: &str, session_id: &str) {
        let pending = LogicalSession::Pending(dhikr_id.to_string());
        let Some(pos) = self
            .items
            .iter()
            .position(|item| item.logical_session() == pending)
        else {
            return;
        };
        let promoted = self.items.remove(pos).into_session_update(session_id);

        let key = LogicalSession::Session(session_id.to_string());
        match self.items.iter().position(|item| item.logical_session() == key) {
            // 뒤에 있던 갱신 항목이 더 새롭습니다
            Some(newer) if newer >= pos => {}
            Some(older) => {
                self.items.remove(older);
                self.items.insert(pos - 1, promoted);
            }
            None => self.items.insert(pos, promoted),
        }
    }
}

impl SyncQueue {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn BatchTransport>,
        best_effort: Arc<dyn BestEffortTransport>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                best_effort,
                outcomes,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// 이후 flush에서 서버가 처리한 항목의 결과를 받습니다.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncOutcome> {
        self.inner.outcomes.subscribe()
    }

    pub fn config(&self) -> SyncConfig {
        self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 변경 하나를 큐에 넣습니다.
    ///
    /// 같은 논리적 세션의 기존 항목을 지우고 뒤에 붙인 다음,
    /// 큐 길이가 `max_queue_size` 이상이면 즉시 flush를 띄우고
    /// 아니면 디바운스 타이머를 다시 시작합니다.
    pub fn enqueue(&self, update: QueuedUpdate) {
        let flush_now = {
            let mut state = self.lock();
            let key = update.logical_session();
            state.items.retain(|item| item.logical_session() != key);
            state.items.push(update);

            if state.items.len() >= self.inner.config.max_queue_size {
                state.cancel_timer();
                true
            } else {
                self.schedule_flush(&mut state);
                false
            }
        };

        if flush_now {
            self.spawn_flush();
        }
    }

    fn schedule_flush(&self, state: &mut QueueState) {
        state.cancel_timer();
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No Tokio runtime; queued updates wait for an explicit flush");
            return;
        };

        let generation = state.timer_generation;
        let delay = self.inner.config.batch_delay;
        let queue = self.clone();
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut state = queue.lock();
                if state.timer_generation == generation {
                    // 이제부터는 abort 대상이 아님. flush 도중에 끊기면 안 됩니다.
                    state.timer = None;
                    true
                } else {
                    false
                }
            };
            if current {
                queue.flush().await;
            }
        }));
    }

    fn spawn_flush(&self) {
        match Handle::try_current() {
            Ok(runtime) => {
                let queue = self.clone();
                runtime.spawn(async move {
                    queue.flush().await;
                });
            }
            Err(_) => tracing::warn!("No Tokio runtime; size-triggered flush skipped"),
        }
    }

    /// 큐의 모든 항목을 배치 하나로 보냅니다.
    ///
    /// - 큐가 비었거나 다른 flush가 진행 중이면 아무것도 하지 않고 `true`.
    /// - 보내기 전에 큐를 통째로 비웁니다.
    /// - 전송 실패(네트워크 에러, 비성공 응답) 시 보낸 항목을 큐 앞쪽에 되돌리고 `false`.
    /// - 성공 시 `true`. 항목별 실패 중 일시적인 것(서버 내부 오류)만 다시 넣고
    ///   의미상 실패(not_found 등)는 버립니다.
    pub async fn flush(&self) -> bool {
        let (updates, epoch) = {
            let mut state = self.lock();
            if state.items.is_empty() || state.is_syncing {
                return true;
            }
            state.is_syncing = true;
            state.cancel_timer();
            (mem::take(&mut state.items), state.epoch)
        };

        let request = BatchSyncRequest { updates };
        let outcome = self.inner.transport.send_batch(&request).await;

        let mut state = self.lock();
        state.is_syncing = false;
        let cleared = state.epoch != epoch;

        match outcome {
            Ok(response) => {
                let mut retry = Vec::new();
                for result in &response.results {
                    let Some(update) = request.updates.get(result.index) else {
                        continue;
                    };
                    if result.is_transient_failure() {
                        retry.push(update.clone());
                        continue;
                    }
                    let item_outcome = match (&result.session_id, result.success) {
                        (Some(session_id), true) => {
                            state.promote_pending(update.dhikr_id(), session_id);
                            SyncOutcome::Saved {
                                dhikr_id: update.dhikr_id().to_string(),
                                session_id: session_id.clone(),
                                count: update.count(),
                            }
                        }
                        (_, true) => continue,
                        (_, false) => SyncOutcome::Dropped {
                            dhikr_id: update.dhikr_id().to_string(),
                            session_id: match update {
                                QueuedUpdate::SessionUpdate { session_id, .. } => {
                                    Some(session_id.clone())
                                }
                                QueuedUpdate::SessionCreate { .. } => None,
                            },
                            error_code: result.error_code.clone(),
                        },
                    };
                    // 구독자가 없으면 결과는 버려집니다
                    let _ = self.inner.outcomes.send(item_outcome);
                }

                if response.failed > 0 {
                    tracing::warn!(
                        failed = response.failed,
                        retrying = retry.len(),
                        "Batch sync partially failed"
                    );
                }
                tracing::info!(synced = response.succeeded, "Synced batch updates");

                if !cleared && !retry.is_empty() {
                    state.requeue_front(retry);
                }
                // flush 도중 들어온 항목이 타이머 없이 남지 않도록
                if !state.items.is_empty() && state.timer.is_none() {
                    self.schedule_flush(&mut state);
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    count = request.updates.len(),
                    "Batch sync failed, re-queuing: {}",
                    e
                );
                if !cleared {
                    state.requeue_front(request.updates);
                }
                false
            }
        }
    }

    /// 페이지 숨김/종료용 flush
    ///
    /// 응답을 기다리지 않는 전송에 맡기고 큐를 낙관적으로 비웁니다.
    /// 전송 계층이 그 자리에서 거부한 경우에만 항목을 되돌리고 `false`를 반환합니다.
    pub fn flush_via_best_effort(&self) -> bool {
        let updates = {
            let mut state = self.lock();
            if state.items.is_empty() {
                return true;
            }
            state.cancel_timer();
            mem::take(&mut state.items)
        };

        let request = BatchSyncRequest { updates };
        match self.inner.best_effort.send_best_effort(&request) {
            Ok(()) => {
                tracing::debug!(count = request.updates.len(), "Handed batch to best-effort transport");
                true
            }
            Err(e) => {
                tracing::warn!("Best-effort flush rejected, re-queuing: {}", e);
                self.lock().requeue_front(request.updates);
                false
            }
        }
    }

    pub fn queue_length(&self) -> usize {
        self.lock().items.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().items.is_empty()
    }

    pub fn is_syncing(&self) -> bool {
        self.lock().is_syncing
    }

    /// 대기 중인 항목과 타이머를 버립니다. 명시적 리셋에만 씁니다.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.cancel_timer();
        state.items.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_client::transport::testing::RecordingTransport;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn queue_with(config: SyncConfig) -> (SyncQueue, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let queue = SyncQueue::new(config, transport.clone(), transport.clone());
        (queue, transport)
    }

    fn config(delay_ms: u64, max: usize) -> SyncConfig {
        SyncConfig {
            batch_delay: Duration::from_millis(delay_ms),
            max_queue_size: max,
        }
    }

    fn create(dhikr_id: &str, count: u32) -> QueuedUpdate {
        QueuedUpdate::SessionCreate {
            dhikr_id: dhikr_id.to_string(),
            count,
            timestamp: i64::from(count),
            completed: None,
        }
    }

    fn update(session_id: &str, count: u32) -> QueuedUpdate {
        QueuedUpdate::SessionUpdate {
            session_id: session_id.to_string(),
            dhikr_id: "d".to_string(),
            count,
            timestamp: i64::from(count),
            completed: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_only_latest_item_per_logical_session() {
        let (queue, _transport) = queue_with(config(2000, 10));

        queue.enqueue(update("s1", 1));
        queue.enqueue(create("d1", 1));
        queue.enqueue(update("s1", 2));
        queue.enqueue(create("d1", 5));
        queue.enqueue(update("s1", 3));

        let items = queue.lock().items.clone();
        assert_eq!(items, vec![create("d1", 5), update("s1", 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_quiet_window() {
        let (queue, transport) = queue_with(config(2000, 10));

        queue.enqueue(create("d1", 1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        queue.enqueue(create("d2", 1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.request_count(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.last_request().unwrap().updates.len(), 2);
        assert!(!queue.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_size_cap_flushes_immediately() {
        let (queue, transport) = queue_with(config(2000, 3));

        queue.enqueue(create("d1", 1));
        queue.enqueue(create("d2", 1));
        assert_eq!(transport.request_count(), 0);
        queue.enqueue(create("d3", 1));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.request_count(), 1);
        assert_eq!(queue.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flush_sends_once() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.hold.store(true, Ordering::SeqCst);
        queue.enqueue(create("d1", 1));

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        tokio::task::yield_now().await;
        assert!(queue.is_syncing());

        // 진행 중인 flush가 있으면 새 항목이 있어도 두 번째 요청은 나가지 않음
        queue.enqueue(create("d2", 1));
        assert!(queue.flush().await);
        assert_eq!(transport.request_count(), 1);

        transport.release.notify_one();
        assert!(first.await.unwrap());
        assert_eq!(transport.request_count(), 1);
        assert_eq!(queue.queue_length(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_requeues_batch_at_front() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.fail.store(true, Ordering::SeqCst);
        queue.enqueue(create("d1", 1));
        queue.enqueue(create("d2", 1));

        assert!(!queue.flush().await);
        assert_eq!(queue.lock().items, vec![create("d1", 1), create("d2", 1)]);

        transport.fail.store(false, Ordering::SeqCst);
        assert!(queue.flush().await);
        assert_eq!(transport.request_count(), 2);
        assert!(!queue.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_item_supersedes_failed_one() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.fail.store(true, Ordering::SeqCst);
        transport.hold.store(true, Ordering::SeqCst);
        queue.enqueue(update("s1", 4));

        let flight = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        tokio::task::yield_now().await;
        queue.enqueue(update("s1", 9));
        queue.enqueue(create("d2", 1));
        transport.release.notify_one();
        assert!(!flight.await.unwrap());

        assert_eq!(queue.lock().items, vec![update("s1", 9), create("d2", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn only_transient_item_failures_are_retried() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport
            .item_failures
            .lock()
            .unwrap()
            .extend([(0, "not_found"), (1, "database_error")]);
        queue.enqueue(create("gone", 1));
        queue.enqueue(create("flaky", 2));
        queue.enqueue(create("fine", 3));

        assert!(queue.flush().await);
        assert_eq!(queue.lock().items, vec![create("flaky", 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn create_queued_during_flight_becomes_update_of_new_session() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.hold.store(true, Ordering::SeqCst);
        queue.enqueue(create("d1", 1));

        let flight = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        tokio::task::yield_now().await;
        queue.enqueue(create("d1", 2));
        transport.release.notify_one();
        assert!(flight.await.unwrap());

        assert_eq!(
            queue.lock().items,
            vec![QueuedUpdate::SessionUpdate {
                session_id: "s-0".into(),
                dhikr_id: "d1".into(),
                count: 2,
                timestamp: 2,
                completed: None,
            }]
        );
    }

    #[test]
    fn promotion_keeps_the_later_of_two_items_for_a_session() {
        let mut state = QueueState {
            items: vec![create("d", 1), update("s1", 2)],
            ..Default::default()
        };
        state.promote_pending("d", "s1");
        assert_eq!(state.items, vec![update("s1", 2)]);

        let mut state = QueueState {
            items: vec![update("s1", 2), create("d", 3)],
            ..Default::default()
        };
        state.promote_pending("d", "s1");
        assert_eq!(state.items, vec![update("s1", 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn processed_items_are_broadcast() {
        let (queue, transport) = queue_with(config(2000, 10));
        let mut outcomes = queue.subscribe();
        transport.item_failures.lock().unwrap().insert(1, "not_found");
        queue.enqueue(create("d1", 3));
        queue.enqueue(update("s1", 4));

        assert!(queue.flush().await);

        assert_eq!(
            outcomes.try_recv().unwrap(),
            SyncOutcome::Saved {
                dhikr_id: "d1".into(),
                session_id: "s-0".into(),
                count: 3,
            }
        );
        assert_eq!(
            outcomes.try_recv().unwrap(),
            SyncOutcome::Dropped {
                dhikr_id: "d".into(),
                session_id: Some("s1".into()),
                error_code: Some("not_found".into()),
            }
        );
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn best_effort_flush_empties_queue() {
        let (queue, transport) = queue_with(config(2000, 10));
        queue.enqueue(create("d1", 12));

        assert!(queue.flush_via_best_effort());
        assert_eq!(transport.best_effort.lock().unwrap().len(), 1);

        // 페이지가 살아남아도 일반 flush는 아무것도 보내지 않음
        assert!(queue.flush().await);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_best_effort_keeps_items() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.reject_best_effort.store(true, Ordering::SeqCst);
        queue.enqueue(create("d1", 3));

        assert!(!queue.flush_via_best_effort());
        assert_eq!(queue.queue_length(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_pending_work() {
        let (queue, transport) = queue_with(config(2000, 10));
        queue.enqueue(create("d1", 1));
        queue.clear();

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(transport.request_count(), 0);
        assert!(!queue.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_flight_is_not_requeued_on_failure() {
        let (queue, transport) = queue_with(config(2000, 10));
        transport.fail.store(true, Ordering::SeqCst);
        transport.hold.store(true, Ordering::SeqCst);
        queue.enqueue(create("d1", 1));

        let flight = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        tokio::task::yield_now().await;
        queue.clear();
        transport.release.notify_one();
        assert!(!flight.await.unwrap());
        assert!(!queue.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_flush_is_a_successful_no_op() {
        let (queue, transport) = queue_with(config(2000, 10));
        assert!(queue.flush().await);
        assert!(queue.flush_via_best_effort());
        assert_eq!(transport.request_count(), 0);
    }
}
