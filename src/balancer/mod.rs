//! 업스트림 선택(로드 밸런싱) 모듈
//!
//! 스냅샷 로드 시 한 번 업스트림 목록을 누적 가중치 표로 변환해 두고,
//! 요청마다 정책에 따라 업스트림을 하나 고릅니다.

mod error;
mod selector;
mod table;

pub use error::BalanceError;
pub use selector::{BalancerOptions, LoadBalancer};
