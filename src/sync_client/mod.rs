//! # 동기화 클라이언트 코어
//!
//! 불안정한 네트워크, 여러 탭, 원격 저장소 사이에서 카운터 진행 상태를 일관되게 유지합니다.
//!
//! ```text
//! 탭 → SessionTracker::increment()
//!        ├─ CountStore::write()        (동기, 낙관적)
//!        └─ SyncQueue::enqueue()       (중복 제거 + 디바운스)
//!               └─ flush() → BatchTransport → POST /sync/batch
//! 재진입 → SessionTracker::load() → reconcile::resolve(local, server)
//! ```
//!
//! 큐는 전역 싱글턴이 아니라 조립하는 쪽이 소유하는 값입니다.
//! 탭이나 워커마다 독립된 큐를 둘 수 있습니다.

pub mod error;
pub mod local_store;
pub mod queue;
pub mod reconcile;
pub mod tracker;
pub mod transport;

pub use error::SyncError;
pub use local_store::{CachedSnapshot, CountStore, FileStore, MemoryStore, StoreKey};
pub use queue::{SyncOutcome, SyncQueue};
pub use reconcile::{resolve, PendingWrite, Resolution, ServerSnapshot};
pub use tracker::{SessionTracker, TrackerState};
pub use transport::{BatchTransport, BestEffortTransport, HttpTransport, SessionSource};
