//! # 로컬 카운트 저장소
//!
//! 카운터의 현재 값을 기기에 동기적으로, best-effort로 저장합니다.
//!
//! - 쓰기는 이전 값을 무조건 덮어씁니다.
//! - 저장 매체가 실패해도 호출자에게 에러를 올리지 않습니다. 로그만 남기고
//!   읽기는 "없음"(`None`)으로 떨어집니다. 로컬 캐시를 잃는 것이 카운팅을
//!   막아서는 안 되기 때문입니다.
//! - 탭/프로세스 사이의 잠금은 없습니다. 마지막에 쓴 쪽이 이깁니다.
//!
//! ## 키 체계
//! | 범위 | 키 |
//! |------|----|
//! | 게스트 디크르 | `dhikr_guest_{dhikrId}` |
//! | 로그인 사용자 백업 | `dhikr_backup_{userId}_{dhikrId}` |
//! | 임시 카운터 | `dhikr_temp_{counterId}` |

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// 재조정에 쓰이는 로컬 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub count: u32,
    /// 마지막 로컬 변경 시각 (에포크 밀리초)
    pub last_updated: i64,
    /// 알고 있는 서버 세션 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// 저장 위치를 결정하는 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// 로그인하지 않은 사용자의 디크르 (로컬 전용)
    Guest { dhikr_id: String },
    /// 로그인 사용자의 서버 카운트 백업
    Backup { user_id: String, dhikr_id: String },
    /// 저장되지 않는 임시 카운터
    Temporary { counter_id: String },
}

impl StoreKey {
    pub fn storage_key(&self) -> String {
        match self {
            StoreKey::Guest { dhikr_id } => format!("dhikr_guest_{dhikr_id}"),
            StoreKey::Backup { user_id, dhikr_id } => format!("dhikr_backup_{user_id}_{dhikr_id}"),
            StoreKey::Temporary { counter_id } => format!("dhikr_temp_{counter_id}"),
        }
    }
}

/// 로컬 카운트 저장소 인터페이스
///
/// 어떤 메서드도 실패를 반환하지 않습니다.
pub trait CountStore: Send + Sync {
    fn write(&self, key: &StoreKey, snapshot: &CachedSnapshot);
    fn read(&self, key: &StoreKey) -> Option<CachedSnapshot>;
    fn remove(&self, key: &StoreKey);
}

/// 프로세스 메모리에만 두는 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CachedSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CountStore for MemoryStore {
    fn write(&self, key: &StoreKey, snapshot: &CachedSnapshot) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.storage_key(), snapshot.clone());
    }

    fn read(&self, key: &StoreKey) -> Option<CachedSnapshot> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.storage_key())
            .cloned()
    }

    fn remove(&self, key: &StoreKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.storage_key());
    }
}

/// JSON 파일 하나에 모든 스냅샷을 담는 저장소
///
/// 쓰기는 임시 파일에 기록한 뒤 rename하므로 중간에 끊겨도 이전 내용이 남습니다.
/// 파일이 깨져 있으면 빈 저장소처럼 동작합니다.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // 같은 프로세스 안의 read-modify-write 직렬화용
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, CachedSnapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Local count store unreadable: {}", e);
                return HashMap::new();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "Local count store corrupted: {}", e);
            HashMap::new()
        })
    }

    fn save(&self, entries: &HashMap<String, CachedSnapshot>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, CachedSnapshot>)) {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load();
        f(&mut entries);
        if let Err(e) = self.save(&entries) {
            tracing::warn!(path = %self.path.display(), "Failed to persist local count: {}", e);
        }
    }
}

impl CountStore for FileStore {
    fn write(&self, key: &StoreKey, snapshot: &CachedSnapshot) {
        self.modify(|entries| {
            entries.insert(key.storage_key(), snapshot.clone());
        });
    }

    fn read(&self, key: &StoreKey) -> Option<CachedSnapshot> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.load().remove(&key.storage_key())
    }

    fn remove(&self, key: &StoreKey) {
        self.modify(|entries| {
            entries.remove(&key.storage_key());
        });
    }
}
