use async_trait::async_trait;
use thiserror::Error;

use crate::service::{AccessControlConfig, ConfigError, LoadBalanceConfig, Protocol, Rule, ServiceInfo};

/// 영속 계층 조회 에러
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("서비스 {service_id}의 {entity} 설정을 찾을 수 없음")]
    NotFound {
        entity: &'static str,
        service_id: i64,
    },

    #[error("서비스 정의 파일 {path} 읽기 실패: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("서비스 정의 파싱 실패: {0}")]
    Parse(String),

    #[error("서비스 정의 스키마 검증 실패: {}", errors.join(", "))]
    Schema { errors: Vec<String> },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("저장소 오류: {0}")]
    Backend(String),
}

/// 서비스 설정을 읽어오는 영속 계층 협력자
///
/// 모든 조회는 실패할 수 있으며, 레지스트리는 어떤 실패든 진행 중인 로드
/// 전체의 실패로 취급합니다.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// 삭제되지 않은 서비스를 페이지 단위로 조회합니다. `page`는 1부터 시작합니다.
    ///
    /// `page_size`보다 짧은 페이지가 마지막 페이지입니다.
    async fn list_active_services(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ServiceInfo>, StoreError>;

    async fn get_rule(&self, service_id: i64, protocol: Protocol) -> Result<Rule, StoreError>;

    async fn get_load_balance(&self, service_id: i64) -> Result<LoadBalanceConfig, StoreError>;

    async fn get_access_control(&self, service_id: i64) -> Result<AccessControlConfig, StoreError>;
}
