//! 접근 제어 모듈
//!
//! 블랙/화이트 리스트와 서비스/클라이언트 QPS 제한을 순서대로 평가합니다.
//! 리스트 검사가 항상 속도 검사보다 먼저 수행됩니다.

mod controller;
mod error;
pub mod flow;

pub use controller::{AccessController, Admission, FailurePolicy};
pub use error::{AccessDenied, DenyReason, FlowError};
pub use flow::{FlowCounter, FlowStat, MemoryFlowCounter};
