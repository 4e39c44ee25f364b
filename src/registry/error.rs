use std::sync::Arc;

use thiserror::Error;

use crate::service::ConfigError;

use super::store::StoreError;

/// 레지스트리 로드/재로드 에러
///
/// 최초 로드 실패는 저장된 뒤 대기 중인 모든 호출자에게 복제되어 전달됩니다.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("서비스 레지스트리 로드 실패: {0}")]
    LoadFailed(Arc<StoreError>),

    #[error("서비스 레지스트리 구성 오류: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Config(e) => RegistryError::Config(e),
            other => RegistryError::LoadFailed(Arc::new(other)),
        }
    }
}
