//! Service Gateway는 API 게이트웨이의 서비스 레지스트리/라우팅 코어입니다.
//!
//! # 주요 기능
//!
//! - HTTP(도메인/경로 접두사), TCP, gRPC 서비스 매칭
//! - 업스트림 로드밸런싱 (random, round-robin, smooth weighted round-robin, IP hash)
//! - 블랙/화이트 리스트와 QPS 기반 접근 제어
//! - 잠금 없는 조회와 원자적 재로드를 지원하는 서비스 레지스트리
//!
//! # 예제
//!
//! ```
//! use service_gateway::service::{
//!     AccessControlConfig, BalancePolicy, HttpRule, LoadBalanceConfig, Protocol, Rule,
//!     ServiceDetail, ServiceInfo,
//! };
//! use service_gateway::balancer::BalancerOptions;
//! use service_gateway::registry::Snapshot;
//!
//! let detail = ServiceDetail::new(
//!     ServiceInfo::new(1, "api", Protocol::Http),
//!     Rule::Http(HttpRule::prefix(1, "/api")),
//!     LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "10.0.0.1:80,10.0.0.2:80", "1,1").unwrap(),
//!     AccessControlConfig::new(1),
//! ).unwrap();
//!
//! let snapshot = Snapshot::build(vec![detail], BalancerOptions::default(), 1).unwrap();
//! let entry = snapshot.match_http("example.com", "/api/users").unwrap();
//! assert_eq!(entry.name(), "api");
//! ```
//!
//! # 레지스트리
//!
//! ```no_run
//! use std::sync::Arc;
//! use service_gateway::registry::{JsonServiceStore, Registry, RegistryOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(JsonServiceStore::new("services.json")?);
//! let registry = Registry::new(store, RegistryOptions::default());
//!
//! registry.load().await?;
//! let entry = registry.match_port(6379)?;
//! println!("{}", entry.name());
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod balancer;
pub mod gateway;
pub mod logging;
pub mod registry;
pub mod routing;
pub mod service;
pub mod settings;
