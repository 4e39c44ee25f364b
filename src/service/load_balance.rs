use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// 업스트림 선택 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    Random,
    RoundRobin,
    /// Nginx 방식의 smooth weighted round-robin
    #[default]
    WeightedRoundRobin,
    IpHash,
}

impl BalancePolicy {
    /// 기존 관리 DB의 숫자 코드(0=random, 1=round-robin, 2=weight round-robin, 3=ip hash)를 변환합니다.
    pub fn from_round_type(round_type: i64) -> Result<Self, ConfigError> {
        match round_type {
            0 => Ok(BalancePolicy::Random),
            1 => Ok(BalancePolicy::RoundRobin),
            2 => Ok(BalancePolicy::WeightedRoundRobin),
            3 => Ok(BalancePolicy::IpHash),
            other => Err(ConfigError::new(
                "round_type",
                format!("알 수 없는 로드밸런싱 정책 코드: {}", other),
            )),
        }
    }
}

impl FromStr for BalancePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(BalancePolicy::Random),
            "round_robin" => Ok(BalancePolicy::RoundRobin),
            "weighted_round_robin" | "weight_round_robin" => Ok(BalancePolicy::WeightedRoundRobin),
            "ip_hash" => Ok(BalancePolicy::IpHash),
            _ => Err(ConfigError::new(
                "round_type",
                format!("알 수 없는 로드밸런싱 정책: {}", s),
            )),
        }
    }
}

/// 서비스 뒤의 업스트림 인스턴스 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub address: String,
    pub weight: u32,
    pub disabled: bool,
}

impl Upstream {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            disabled: weight == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalanceConfig {
    pub service_id: i64,
    pub policy: BalancePolicy,
    pub upstreams: Vec<Upstream>,
    /// 일시적으로 선택 대상에서 제외되는 주소
    pub forbidden: Vec<String>,
    pub connect_timeout: Duration,
    pub header_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_idle: u32,
}

impl LoadBalanceConfig {
    pub fn new(service_id: i64, policy: BalancePolicy, upstreams: Vec<Upstream>) -> Self {
        Self {
            service_id,
            policy,
            upstreams,
            forbidden: Vec::new(),
            connect_timeout: Duration::ZERO,
            header_timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            max_idle: 0,
        }
    }

    /// 쉼표로 구분된 주소 목록과 가중치 목록을 짝지어 파싱합니다.
    ///
    /// 두 목록의 길이가 다르면 실행 시점 기본값 없이 `ConfigError`를 반환합니다.
    /// 가중치 0은 비활성 업스트림으로 취급합니다.
    ///
    /// # 예제
    ///
    /// ```
    /// use service_gateway::service::{BalancePolicy, LoadBalanceConfig};
    ///
    /// let config = LoadBalanceConfig::parse(
    ///     1,
    ///     BalancePolicy::WeightedRoundRobin,
    ///     "10.0.0.1:80,10.0.0.2:80",
    ///     "1,3",
    /// ).unwrap();
    /// assert_eq!(config.upstreams[1].weight, 3);
    ///
    /// assert!(LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1,b:1", "1").is_err());
    /// ```
    pub fn parse(
        service_id: i64,
        policy: BalancePolicy,
        address_list: &str,
        weight_list: &str,
    ) -> Result<Self, ConfigError> {
        let addresses = split_list(address_list);
        let weights = split_list(weight_list);

        if addresses.len() != weights.len() {
            return Err(ConfigError::new(
                "weight_list",
                format!(
                    "주소 목록({})과 가중치 목록({})의 길이가 다릅니다",
                    addresses.len(),
                    weights.len()
                ),
            ));
        }

        let upstreams = addresses
            .into_iter()
            .zip(weights)
            .map(|(address, weight)| {
                let weight = weight.parse::<u32>().map_err(|_| {
                    ConfigError::new("weight_list", format!("잘못된 가중치: '{}'", weight))
                })?;
                Ok(Upstream::new(address, weight))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let config = Self::new(service_id, policy, upstreams);
        config.validate()?;
        Ok(config)
    }

    pub fn with_forbidden_list(mut self, forbid_list: &str) -> Self {
        self.forbidden = split_list(forbid_list)
            .into_iter()
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, header: Duration, idle: Duration) -> Self {
        self.connect_timeout = connect;
        self.header_timeout = header;
        self.idle_timeout = idle;
        self
    }

    pub fn with_max_idle(mut self, max_idle: u32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstreams.is_empty() {
            return Err(ConfigError::new("ip_list", "업스트림이 하나도 없습니다"));
        }
        for upstream in &self.upstreams {
            validate_address(&upstream.address)?;
            if upstream.weight == 0 && !upstream.disabled {
                return Err(ConfigError::new(
                    "weight_list",
                    format!("가중치 0인 업스트림은 비활성이어야 합니다: '{}'", upstream.address),
                ));
            }
        }
        Ok(())
    }

    pub fn is_forbidden(&self, address: &str) -> bool {
        self.forbidden.iter().any(|forbidden| forbidden == address)
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).collect()
}

/// 업스트림 주소는 `host:port` 형식이어야 합니다.
fn validate_address(address: &str) -> Result<(), ConfigError> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        ConfigError::new("ip_list", format!("'host:port' 형식이 아닙니다: '{}'", address))
    })?;

    if host.is_empty() {
        return Err(ConfigError::new("ip_list", format!("호스트가 비어 있습니다: '{}'", address)));
    }
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(()),
        _ => Err(ConfigError::new("ip_list", format!("잘못된 포트: '{}'", address))),
    }
}
