//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버와 동기화 클라이언트의 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 서버 설정 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로 (필수)
//! - `JWT_SECRET`: JWT 토큰 서명에 사용할 비밀키 (필수)
//! - `HOST`, `PORT`: 서버 바인딩 주소와 포트
//! - `MAX_BATCH_SIZE`: 배치 동기화 요청 하나에 허용되는 최대 작업 수
//!
//! 동기화 클라이언트 설정 항목:
//! - `SYNC_BATCH_DELAY_MS`: 마지막 enqueue 이후 자동 flush까지의 디바운스 시간
//! - `SYNC_MAX_QUEUE_SIZE`: 이 길이에 도달하면 즉시 flush

use std::env;
use std::time::Duration;

/// 배치 요청 하나에 담을 수 있는 작업 수의 기본 상한
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// 서버 전체 설정을 담는 구조체
///
/// 서버 시작 시 환경변수에서 한 번 읽어온 후 애플리케이션 전체에서 공유됩니다.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 파일 경로 (예: "sqlite:data/dhikr.db")
    pub database_url: String,
    /// JWT 토큰 서명/검증에 사용하는 비밀키
    pub jwt_secret: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 3000)
    pub port: u16,
    /// 배치 요청 하나에 허용되는 최대 작업 수 (기본값: 100)
    pub max_batch_size: usize,
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// # 에러
    /// `DATABASE_URL`과 `JWT_SECRET`은 필수이며, 없으면 에러가 발생합니다.
    /// 나머지 설정은 기본값이 있어 환경변수가 없어도 동작합니다.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT").unwrap_or(3000),
            max_batch_size: parse_var("MAX_BATCH_SIZE").unwrap_or(DEFAULT_MAX_BATCH_SIZE),
        })
    }
}

/// 동기화 큐(SyncQueue)의 설정
///
/// `Default`는 배치 지연 2000ms, 최대 큐 길이 10입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// 마지막 enqueue 이후 자동 flush까지 기다리는 시간 (디바운스 윈도우)
    pub batch_delay: Duration,
    /// 큐 길이가 이 값 이상이 되면 타이머를 무시하고 즉시 flush
    pub max_queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(2000),
            max_queue_size: 10,
        }
    }
}

impl SyncConfig {
    /// 환경변수로 기본값을 덮어씁니다. 값이 없거나 숫자가 아니면 기본값을 유지합니다.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_delay: parse_var::<u64>("SYNC_BATCH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_delay),
            // 0이면 매 enqueue마다 flush가 되어버리므로 최소 1로 고정
            max_queue_size: parse_var::<usize>("SYNC_MAX_QUEUE_SIZE")
                .map(|size| size.max(1))
                .unwrap_or(defaults.max_queue_size),
        }
    }
}

/// 환경변수를 읽어 원하는 타입으로 파싱합니다. 없거나 파싱에 실패하면 None.
fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
