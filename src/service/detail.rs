use crate::settings::ClusterSettings;

use super::{
    AccessControlConfig, ConfigError, HttpMatchKind, HttpRule, LoadBalanceConfig, Protocol, Rule,
    ServiceInfo,
};

/// 레지스트리가 색인하고 매칭 결과로 반환하는 서비스 단위입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetail {
    pub info: ServiceInfo,
    pub rule: Rule,
    pub load_balance: LoadBalanceConfig,
    pub access_control: AccessControlConfig,
}

impl ServiceDetail {
    /// 구성 요소를 모아 검증한 뒤 `ServiceDetail`을 만듭니다.
    ///
    /// 규칙의 프로토콜이 서비스 프로토콜과 다르거나, 하위 설정이 다른 서비스를
    /// 가리키면 `ConfigError`를 반환합니다.
    pub fn new(
        info: ServiceInfo,
        rule: Rule,
        load_balance: LoadBalanceConfig,
        access_control: AccessControlConfig,
    ) -> Result<Self, ConfigError> {
        info.validate()?;

        if rule.protocol() != info.protocol {
            return Err(ConfigError::new(
                "protocol",
                format!(
                    "서비스 {}의 프로토콜({})과 규칙 프로토콜({})이 다릅니다",
                    info.name,
                    info.protocol,
                    rule.protocol()
                ),
            ));
        }
        rule.validate()?;
        load_balance.validate()?;

        let owners = [
            ("rule.service_id", rule.service_id()),
            ("load_balance.service_id", load_balance.service_id),
            ("access_control.service_id", access_control.service_id),
        ];
        for (field, owner) in owners {
            if owner != info.id {
                return Err(ConfigError::new(
                    field,
                    format!("서비스 {}가 아닌 {}에 속한 설정입니다", info.id, owner),
                ));
            }
        }

        Ok(Self {
            info,
            rule,
            load_balance,
            access_control,
        })
    }

    pub fn id(&self) -> i64 {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn protocol(&self) -> Protocol {
        self.info.protocol
    }

    pub fn http_rule(&self) -> Option<&HttpRule> {
        match &self.rule {
            Rule::Http(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.rule.listen_port()
    }

    pub fn total_nodes(&self) -> usize {
        self.load_balance.upstreams.len()
    }

    /// 클라이언트가 이 서비스에 접근하는 주소를 계산합니다.
    ///
    /// - HTTP 접두사 규칙: `cluster_ip:port/prefix` (TLS 필요 시 ssl 포트)
    /// - HTTP 도메인 규칙: 도메인 그대로
    /// - TCP/gRPC: `cluster_ip:listen_port`
    pub fn access_address(&self, cluster: &ClusterSettings) -> String {
        match &self.rule {
            Rule::Http(rule) => match rule.match_kind {
                HttpMatchKind::Domain => rule.pattern.clone(),
                HttpMatchKind::PathPrefix => {
                    let port = if rule.require_tls {
                        cluster.ssl_port
                    } else {
                        cluster.port
                    };
                    format!("{}:{}{}", cluster.ip, port, rule.pattern)
                }
            },
            Rule::Tcp(rule) => format!("{}:{}", cluster.ip, rule.listen_port),
            Rule::Grpc(rule) => format!("{}:{}", cluster.ip, rule.listen_port),
        }
    }
}
