use std::net::IpAddr;

use crate::balancer::{BalanceError, BalancerOptions, LoadBalancer};
use crate::service::ServiceDetail;

/// 스냅샷에 담기는 서비스 하나: 설정과 그 설정으로 만든 로드밸런서
#[derive(Debug)]
pub struct ServiceEntry {
    detail: ServiceDetail,
    balancer: LoadBalancer,
}

impl ServiceEntry {
    pub fn new(detail: ServiceDetail, options: BalancerOptions) -> Self {
        let balancer = LoadBalancer::new(detail.name(), &detail.load_balance, options);
        Self { detail, balancer }
    }

    pub fn detail(&self) -> &ServiceDetail {
        &self.detail
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    pub fn name(&self) -> &str {
        self.detail.name()
    }

    pub fn select_upstream(&self, client_ip: IpAddr) -> Result<String, BalanceError> {
        self.balancer.select(client_ip)
    }
}
