//! 서비스 레지스트리
//!
//! 영속 계층에서 전체 서비스를 읽어 스냅샷을 만들고, 조회 요청은 현재 게시된
//! 스냅샷에서 잠금 없이 처리합니다.

mod entry;
mod error;
mod json_store;
mod manager;
mod snapshot;
mod store;

pub use entry::ServiceEntry;
pub use error::RegistryError;
pub use json_store::{JsonServiceStore, SERVICES_SCHEMA};
pub use manager::{LoadState, Registry, RegistryOptions};
pub use snapshot::Snapshot;
pub use store::{ServiceStore, StoreError};
