use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::service::ServiceDetail;

use super::error::{AccessDenied, DenyReason, FlowError};
use super::flow::{client_flow_key, service_flow_key, FlowCounter};

/// 유량 카운터 조회가 실패하거나 시간 초과될 때의 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 요청을 허용
    Open,
    /// 요청을 거부
    #[default]
    Closed,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            _ => Err(format!("Invalid counter failure policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Admission::Allowed => None,
            Admission::Denied(reason) => Some(*reason),
        }
    }
}

/// 서비스별 접근 제어 평가기
#[derive(Clone)]
pub struct AccessController {
    counter: Arc<dyn FlowCounter>,
    timeout: Duration,
    on_failure: FailurePolicy,
}

impl AccessController {
    pub fn new(counter: Arc<dyn FlowCounter>) -> Self {
        Self {
            counter,
            timeout: Duration::from_millis(50),
            on_failure: FailurePolicy::Closed,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn counter(&self) -> &Arc<dyn FlowCounter> {
        &self.counter
    }

    /// 클라이언트의 서비스 접근 허용 여부를 평가합니다.
    ///
    /// 순서 (먼저 걸리는 사유로 종료):
    /// 1. `auth_enabled`가 꺼져 있으면 리스트 검사를 건너뜀
    /// 2. 화이트 리스트가 있으면 목록에 있는 클라이언트만 허용 (블랙 리스트는 보지 않음)
    /// 3. 없으면 블랙 리스트 검사
    /// 4. 서비스 QPS, 클라이언트 QPS 제한 검사 (0 = 무제한)
    pub async fn admit(&self, detail: &ServiceDetail, client_ip: IpAddr) -> Admission {
        let acl = &detail.access_control;

        if acl.auth_enabled {
            if !acl.white_list.is_empty() {
                if !acl.is_whitelisted(client_ip) {
                    return self.deny(detail, client_ip, DenyReason::NotWhitelisted);
                }
            } else if acl.is_blacklisted(client_ip) {
                return self.deny(detail, client_ip, DenyReason::Blacklisted);
            }
        }

        if acl.service_qps_limit > 0 {
            let key = service_flow_key(detail.id());
            if let Some(reason) = self
                .check_limit(&key, acl.service_qps_limit, DenyReason::ServiceRateLimited)
                .await
            {
                return self.deny(detail, client_ip, reason);
            }
        }

        if acl.client_qps_limit > 0 {
            let key = client_flow_key(detail.id(), client_ip);
            if let Some(reason) = self
                .check_limit(&key, acl.client_qps_limit, DenyReason::ClientRateLimited)
                .await
            {
                return self.deny(detail, client_ip, reason);
            }
        }

        debug!(service = %detail.name(), client_ip = %client_ip, "접근 허용");
        Admission::Allowed
    }

    /// `admit`의 `Result` 버전
    pub async fn check(&self, detail: &ServiceDetail, client_ip: IpAddr) -> Result<(), AccessDenied> {
        match self.admit(detail, client_ip).await {
            Admission::Allowed => Ok(()),
            Admission::Denied(reason) => Err(AccessDenied {
                service: detail.name().to_string(),
                client_ip,
                reason,
            }),
        }
    }

    /// 허용된 요청을 서비스/클라이언트 카운터에 기록합니다.
    pub async fn record(&self, detail: &ServiceDetail, client_ip: IpAddr) -> Result<(), FlowError> {
        self.counter.increment(&service_flow_key(detail.id())).await?;
        self.counter
            .increment(&client_flow_key(detail.id(), client_ip))
            .await
    }

    async fn check_limit(&self, key: &str, limit: u64, exceeded: DenyReason) -> Option<DenyReason> {
        match self.current_qps(key).await {
            Ok(qps) if qps >= limit => Some(exceeded),
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, policy = ?self.on_failure, "유량 카운터 조회 실패");
                match self.on_failure {
                    FailurePolicy::Open => None,
                    FailurePolicy::Closed => Some(DenyReason::CounterUnavailable),
                }
            }
        }
    }

    async fn current_qps(&self, key: &str) -> Result<u64, FlowError> {
        match tokio::time::timeout(self.timeout, self.counter.qps(key)).await {
            Ok(result) => result.map(|stat| stat.qps),
            Err(_) => Err(FlowError::Timeout {
                key: key.to_string(),
            }),
        }
    }

    fn deny(&self, detail: &ServiceDetail, client_ip: IpAddr, reason: DenyReason) -> Admission {
        warn!(
            service = %detail.name(),
            client_ip = %client_ip,
            reason = %reason,
            "접근 거부"
        );
        Admission::Denied(reason)
    }
}

impl std::fmt::Debug for AccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("timeout", &self.timeout)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}
