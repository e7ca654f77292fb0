//! # 서비스 계층
//!
//! 여러 DB 함수를 조합하는 비즈니스 로직입니다.
//! - `batch`: 배치 동기화 요청의 검증과 순차 적용

pub mod batch;
