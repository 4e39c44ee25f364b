//! 요청-서비스 매칭 모듈
//!
//! 호스트/경로 또는 리슨 포트로 요청을 처리할 서비스 하나를 찾습니다.
//! 도메인 규칙이 접두사 규칙보다 항상 우선합니다.

mod error;
mod host;
mod index;
pub mod request;

pub use error::RoutingError;
pub use host::HostInfo;
pub use index::RouteIndex;
