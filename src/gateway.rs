//! 요청/연결 하나를 서비스와 업스트림으로 해석하는 진입점
//!
//! 흐름: 매칭 → 접근 제어 → 업스트림 선택. 실제 프록시 전송은 호출자 몫입니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::StatusCode;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::access::{AccessController, AccessDenied, DenyReason};
use crate::balancer::BalanceError;
use crate::logging::{log_request, RequestLog};
use crate::registry::{Registry, ServiceEntry};
use crate::routing::request::{client_ip, extract_target};
use crate::routing::RoutingError;
use crate::service::{Protocol, ServiceDetail};

/// 요청 단위 에러. 공유 레지스트리나 다른 요청에는 영향이 없습니다.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Denied(#[from] AccessDenied),

    #[error(transparent)]
    Balance(#[from] BalanceError),
}

impl GatewayError {
    /// 클라이언트에 돌려줄 HTTP 상태 코드
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Routing(e) => match e {
                RoutingError::NoMatchingService { .. } | RoutingError::NotLoaded => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RoutingError::MissingHost
                | RoutingError::InvalidHost { .. }
                | RoutingError::InvalidPort { .. }
                | RoutingError::HeaderParseError { .. } => StatusCode::BAD_REQUEST,
            },
            GatewayError::Denied(denied) => match denied.reason {
                DenyReason::Blacklisted | DenyReason::NotWhitelisted => StatusCode::FORBIDDEN,
                DenyReason::ServiceRateLimited | DenyReason::ClientRateLimited => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                DenyReason::CounterUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            },
            GatewayError::Balance(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// 디스패치 결과: 처리할 서비스와 선택된 업스트림
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub service: Arc<ServiceEntry>,
    pub upstream: String,
    pub client_ip: IpAddr,
}

impl Dispatch {
    pub fn detail(&self) -> &ServiceDetail {
        self.service.detail()
    }

    /// HTTP 서비스라면 업스트림으로 보낼 경로를 계산합니다.
    pub fn upstream_path(&self, path: &str) -> String {
        match self.detail().http_rule() {
            Some(rule) => rule.rewrite_path(path),
            None => path.to_string(),
        }
    }

    /// 업스트림 연결 결과를 로드밸런서에 알립니다.
    pub fn report(&self, success: bool) {
        let balancer = self.service.balancer();
        if success {
            balancer.report_success(&self.upstream);
        } else {
            balancer.report_failure(&self.upstream);
        }
    }
}

pub struct Gateway {
    registry: Arc<Registry>,
    access: AccessController,
    trust_forwarded: bool,
}

impl Gateway {
    pub fn new(registry: Arc<Registry>, access: AccessController) -> Self {
        Self {
            registry,
            access,
            trust_forwarded: false,
        }
    }

    /// `X-Forwarded-For`/`X-Real-IP` 헤더를 클라이언트 주소로 신뢰할지 설정합니다.
    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// HTTP 요청을 디스패치합니다.
    pub async fn dispatch_http<B>(
        &self,
        req: &hyper::Request<B>,
        peer: IpAddr,
    ) -> Result<Dispatch, GatewayError> {
        let started = Instant::now();
        let mut log = RequestLog::new(Uuid::new_v4().to_string());
        log.with_request(req);

        let result = self.route_http(req, peer, &mut log).await;
        self.finish(&mut log, started, &result);
        result
    }

    /// TCP/gRPC 연결을 리슨 포트로 디스패치합니다.
    pub async fn dispatch_port(&self, port: u16, peer: IpAddr) -> Result<Dispatch, GatewayError> {
        let started = Instant::now();
        let mut log = RequestLog::new(Uuid::new_v4().to_string());
        let client_ip = peer.to_canonical();
        log.with_client(client_ip);

        let result = match self.registry.match_port(port) {
            Ok(entry) => {
                let protocol = entry.detail().protocol();
                log.with_connection(protocol.as_str(), port);
                self.admit_and_select(entry, client_ip, &mut log).await
            }
            Err(e) => {
                log.with_connection(Protocol::Tcp.as_str(), port);
                Err(e.into())
            }
        };
        self.finish(&mut log, started, &result);
        result
    }

    async fn route_http<B>(
        &self,
        req: &hyper::Request<B>,
        peer: IpAddr,
        log: &mut RequestLog,
    ) -> Result<Dispatch, GatewayError> {
        let client_ip = client_ip(req, peer, self.trust_forwarded);
        log.with_client(client_ip);

        let target = extract_target(req)?;
        let entry = self.registry.match_http(target.host_name(), &target.path)?;
        self.admit_and_select(entry, client_ip, log).await
    }

    async fn admit_and_select(
        &self,
        entry: Arc<ServiceEntry>,
        client_ip: IpAddr,
        log: &mut RequestLog,
    ) -> Result<Dispatch, GatewayError> {
        log.with_service(entry.name());

        self.access.check(entry.detail(), client_ip).await?;
        let upstream = entry.select_upstream(client_ip)?;
        log.with_upstream(&upstream);

        // 기록 실패는 요청을 막지 않음
        if let Err(e) = self.access.record(entry.detail(), client_ip).await {
            warn!(service = %entry.name(), error = %e, "유량 기록 실패");
        }

        Ok(Dispatch {
            service: entry,
            upstream,
            client_ip,
        })
    }

    fn finish(&self, log: &mut RequestLog, started: Instant, result: &Result<Dispatch, GatewayError>) {
        log.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(e) = result {
            log.with_error(e.status_code(), e);
        }
        log_request(log);
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("access", &self.access)
            .field("trust_forwarded", &self.trust_forwarded)
            .finish()
    }
}
