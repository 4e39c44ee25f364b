use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::balancer::BalancerOptions;
use crate::routing::{RouteIndex, RoutingError};
use crate::service::{ConfigError, Protocol, ServiceDetail};

use super::entry::ServiceEntry;

/// 특정 시점의 전체 서비스와 파생 색인
///
/// 한 번 만들어지면 변경되지 않으며, 재로드 시 통째로 교체됩니다.
#[derive(Debug)]
pub struct Snapshot {
    services: Vec<Arc<ServiceEntry>>,
    by_name: HashMap<String, Arc<ServiceEntry>>,
    index: RouteIndex,
    version: u64,
    loaded_at: OffsetDateTime,
}

impl Snapshot {
    /// 로드 순서대로의 서비스 목록으로 스냅샷을 만듭니다.
    ///
    /// 삭제 표시된 서비스는 건너뜁니다. 이름 중복, 도메인 중복, 포트 충돌은
    /// `ConfigError`로 전체 빌드를 실패시킵니다.
    pub fn build(
        details: Vec<ServiceDetail>,
        options: BalancerOptions,
        version: u64,
    ) -> Result<Self, ConfigError> {
        let mut services = Vec::with_capacity(details.len());
        let mut by_name: HashMap<String, Arc<ServiceEntry>> = HashMap::with_capacity(details.len());

        for detail in details.into_iter().filter(|detail| !detail.info.deleted) {
            if by_name.contains_key(detail.name()) {
                return Err(ConfigError::new(
                    "name",
                    format!("서비스 이름 {}이(가) 중복됨", detail.name()),
                ));
            }

            let entry = Arc::new(ServiceEntry::new(detail, options));
            by_name.insert(entry.name().to_string(), entry.clone());
            services.push(entry);
        }

        let index = RouteIndex::build(&services)?;

        Ok(Self {
            services,
            by_name,
            index,
            version,
            loaded_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceEntry>> {
        self.by_name.get(name)
    }

    /// 로드 순서대로의 전체 서비스
    pub fn services(&self) -> &[Arc<ServiceEntry>] {
        &self.services
    }

    /// 프로토콜별 서비스 목록 (TCP/gRPC 리스너 기동용)
    pub fn services_by_protocol(&self, protocol: Protocol) -> Vec<Arc<ServiceEntry>> {
        self.services
            .iter()
            .filter(|entry| entry.detail().protocol() == protocol)
            .cloned()
            .collect()
    }

    pub fn match_http(&self, host: &str, path: &str) -> Result<&Arc<ServiceEntry>, RoutingError> {
        self.index.match_http(host, path)
    }

    pub fn match_port(&self, port: u16) -> Result<&Arc<ServiceEntry>, RoutingError> {
        self.index.match_port(port)
    }

    pub fn index(&self) -> &RouteIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 1부터 증가하는 스냅샷 번호
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }
}
