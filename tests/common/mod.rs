#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use service_gateway::access::{FlowCounter, FlowError, FlowStat};
use service_gateway::registry::{ServiceStore, StoreError};
use service_gateway::service::{
    AccessControlConfig, BalancePolicy, HttpRule, LoadBalanceConfig, Protocol, Rule,
    ServiceDetail, ServiceInfo, TcpRule,
};

// 테스트용 서비스 구성 헬퍼
pub fn lb(id: i64, addresses: &str, weights: &str) -> LoadBalanceConfig {
    LoadBalanceConfig::parse(id, BalancePolicy::RoundRobin, addresses, weights).unwrap()
}

pub fn prefix_service(id: i64, name: &str, prefix: &str) -> ServiceDetail {
    ServiceDetail::new(
        ServiceInfo::new(id, name, Protocol::Http),
        Rule::Http(HttpRule::prefix(id, prefix)),
        lb(id, "127.0.0.1:9000", "1"),
        AccessControlConfig::new(id),
    )
    .unwrap()
}

pub fn domain_service(id: i64, name: &str, domain: &str) -> ServiceDetail {
    ServiceDetail::new(
        ServiceInfo::new(id, name, Protocol::Http),
        Rule::Http(HttpRule::domain(id, domain)),
        lb(id, "127.0.0.1:9000", "1"),
        AccessControlConfig::new(id),
    )
    .unwrap()
}

pub fn tcp_service(id: i64, name: &str, port: u16) -> ServiceDetail {
    ServiceDetail::new(
        ServiceInfo::new(id, name, Protocol::Tcp),
        Rule::Tcp(TcpRule { service_id: id, listen_port: port }),
        lb(id, "127.0.0.1:9000", "1"),
        AccessControlConfig::new(id),
    )
    .unwrap()
}

/// 조회 횟수를 세고 실패를 주입할 수 있는 저장소
#[derive(Default)]
pub struct MockStore {
    services: Mutex<Vec<ServiceDetail>>,
    fail_list: Mutex<bool>,
    fail_rule_for: Mutex<Option<i64>>,
    delay: Option<Duration>,
    pub list_calls: AtomicUsize,
    pub rule_calls: AtomicUsize,
    // 호출 순서 기록
    log: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new(services: Vec<ServiceDetail>) -> Self {
        Self {
            services: Mutex::new(services),
            ..Default::default()
        }
    }

    /// 조회마다 지연을 넣어 동시 호출이 겹치도록 합니다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_services(&self, services: Vec<ServiceDetail>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn fail_rule_for(&self, service_id: Option<i64>) {
        *self.fail_rule_for.lock().unwrap() = service_id;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn rule_calls(&self) -> usize {
        self.rule_calls.load(Ordering::SeqCst)
    }

    /// 지금까지의 저장소 호출 순서 (`list`, `rule:<id>`, `lb:<id>`, `acl:<id>`)
    pub fn call_log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn note(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }

    fn find(&self, service_id: i64, entity: &'static str) -> Result<ServiceDetail, StoreError> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|detail| detail.id() == service_id)
            .cloned()
            .ok_or(StoreError::NotFound { entity, service_id })
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ServiceStore for MockStore {
    async fn list_active_services(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ServiceInfo>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.note("list".to_string());
        self.pause().await;

        if *self.fail_list.lock().unwrap() {
            return Err(StoreError::Backend("connection refused".to_string()));
        }

        let services = self.services.lock().unwrap();
        let skip = (page as usize - 1) * page_size as usize;
        Ok(services
            .iter()
            .filter(|detail| !detail.info.deleted)
            .skip(skip)
            .take(page_size as usize)
            .map(|detail| detail.info.clone())
            .collect())
    }

    async fn get_rule(&self, service_id: i64, _protocol: Protocol) -> Result<Rule, StoreError> {
        self.rule_calls.fetch_add(1, Ordering::SeqCst);
        self.note(format!("rule:{}", service_id));
        if *self.fail_rule_for.lock().unwrap() == Some(service_id) {
            return Err(StoreError::Backend(format!("rule {} unavailable", service_id)));
        }
        Ok(self.find(service_id, "rule")?.rule)
    }

    async fn get_load_balance(&self, service_id: i64) -> Result<LoadBalanceConfig, StoreError> {
        self.note(format!("lb:{}", service_id));
        Ok(self.find(service_id, "load_balance")?.load_balance)
    }

    async fn get_access_control(&self, service_id: i64) -> Result<AccessControlConfig, StoreError> {
        self.note(format!("acl:{}", service_id));
        Ok(self.find(service_id, "access_control")?.access_control)
    }
}

/// 키별로 고정된 QPS를 돌려주는 카운터
#[derive(Default)]
pub struct FixedCounter {
    qps: HashMap<String, u64>,
    delay: Option<Duration>,
    fail: bool,
    pub increments: Mutex<Vec<String>>,
}

impl FixedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qps(mut self, key: &str, qps: u64) -> Self {
        self.qps.insert(key.to_string(), qps);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl FlowCounter for FixedCounter {
    async fn qps(&self, key: &str) -> Result<FlowStat, FlowError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(FlowError::Unavailable {
                key: key.to_string(),
                message: "counter down".to_string(),
            });
        }
        let qps = self.qps.get(key).copied().unwrap_or(0);
        Ok(FlowStat { total: qps, qps })
    }

    async fn increment(&self, key: &str) -> Result<(), FlowError> {
        self.increments.lock().unwrap().push(key.to_string());
        Ok(())
    }
}
