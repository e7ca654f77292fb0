//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! - `dhikr`: 디크르(반복 목표)와 생성/수정 요청
//! - `session`: 디크르 진행 세션과 현재 세션 조회 응답
//! - `sync`: 배치 동기화 요청/응답 와이어 타입

pub mod dhikr;
pub mod session;
pub mod sync;

pub use dhikr::*;
pub use session::*;
pub use sync::*;
