use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::registry::ServiceEntry;
use crate::routing::error::RoutingError;
use crate::routing::host::normalize_host;
use crate::service::{ConfigError, HttpMatchKind, Rule};

/// 스냅샷마다 만들어지는 라우팅 색인입니다.
///
/// 도메인/포트 매칭은 O(1), 접두사 매칭은 접두사 규칙 수 k에 대해 O(k)입니다.
#[derive(Debug, Default)]
pub struct RouteIndex {
    domains: HashMap<String, Arc<ServiceEntry>>,
    // 긴 접두사가 앞에 오도록 정렬, 길이가 같으면 로드 순서 유지
    prefixes: Vec<(String, Arc<ServiceEntry>)>,
    ports: HashMap<u16, Arc<ServiceEntry>>,
}

impl RouteIndex {
    /// 로드 순서대로 전달된 서비스로 색인을 만듭니다.
    ///
    /// 도메인 중복, TCP/gRPC 포트 충돌은 `ConfigError`입니다.
    pub fn build(entries: &[Arc<ServiceEntry>]) -> Result<Self, ConfigError> {
        let mut index = RouteIndex::default();

        for entry in entries {
            let detail = entry.detail();
            match &detail.rule {
                Rule::Http(rule) => match rule.match_kind {
                    HttpMatchKind::Domain => {
                        let Some(domain) = rule.domain_key() else {
                            return Err(ConfigError::new(
                                "pattern",
                                format!("서비스 {}의 도메인 형식이 잘못됨: {}", detail.name(), rule.pattern),
                            ));
                        };
                        if let Some(existing) = index.domains.get(&domain) {
                            return Err(ConfigError::new(
                                "pattern",
                                format!(
                                    "도메인 {}이(가) 서비스 {}와 {}에 중복 등록됨",
                                    domain,
                                    existing.detail().name(),
                                    detail.name()
                                ),
                            ));
                        }
                        index.domains.insert(domain, entry.clone());
                    }
                    HttpMatchKind::PathPrefix => {
                        index.prefixes.push((rule.pattern.clone(), entry.clone()));
                    }
                },
                Rule::Tcp(_) | Rule::Grpc(_) => {
                    let Some(port) = detail.listen_port() else {
                        continue;
                    };
                    if let Some(existing) = index.ports.get(&port) {
                        return Err(ConfigError::new(
                            "listen_port",
                            format!(
                                "포트 {}이(가) 서비스 {}와 {}에 중복 등록됨",
                                port,
                                existing.detail().name(),
                                detail.name()
                            ),
                        ));
                    }
                    index.ports.insert(port, entry.clone());
                }
            }
        }

        // sort_by는 안정 정렬
        index.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        debug!(
            domains = index.domains.len(),
            prefixes = index.prefixes.len(),
            ports = index.ports.len(),
            "라우팅 색인 생성"
        );
        Ok(index)
    }

    /// 호스트/경로로 HTTP 서비스를 찾습니다.
    ///
    /// 호스트의 포트를 떼어낸 뒤 도메인 색인을 먼저 보고, 없으면 경로 접두사를
    /// 긴 것부터 검사합니다.
    pub fn match_http(&self, host: &str, path: &str) -> Result<&Arc<ServiceEntry>, RoutingError> {
        if let Some(name) = normalize_host(host) {
            if let Some(entry) = self.domains.get(&name) {
                return Ok(entry);
            }
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, entry)| entry)
            .ok_or_else(|| RoutingError::NoMatchingService {
                target: format!("{}{}", host, path),
            })
    }

    pub fn match_port(&self, port: u16) -> Result<&Arc<ServiceEntry>, RoutingError> {
        self.ports.get(&port).ok_or_else(|| RoutingError::NoMatchingService {
            target: format!(":{}", port),
        })
    }

    /// 매칭 순서대로의 접두사 목록
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(|(prefix, _)| prefix.as_str())
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.keys().copied()
    }
}
