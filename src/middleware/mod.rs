//! # 미들웨어 모듈
//!
//! - `auth`: JWT bearer 토큰 검증과 `AuthUser` Extractor

pub mod auth;
