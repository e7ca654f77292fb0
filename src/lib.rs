//! # dhikr-sync
//!
//! 디크르 카운터의 진행 상태를 기기와 서버 사이에서 동기화합니다.
//!
//! - 서버 측: 인증, 디크르 CRUD, 재조정용 현재 세션 조회, 배치 동기화 엔드포인트
//!   (`config`, `db`, `error`, `middleware`, `models`, `routes`, `services`)
//! - 클라이언트 측: 로컬 카운트 저장소, 재조정, 배치 동기화 큐, 세션 트래커
//!   (`sync_client`)

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod sync_client;
