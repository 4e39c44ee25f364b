use std::fmt;
use std::net::IpAddr;

use super::ConfigError;

/// 블랙/화이트 리스트의 항목 하나. 단일 IP 또는 CIDR 대역입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl IpRule {
    pub fn parse(field: &str, value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::new(field, format!("{}: '{}'", reason, value));

        match value.split_once('/') {
            None => value
                .parse::<IpAddr>()
                .map(|ip| IpRule::Exact(ip.to_canonical()))
                .map_err(|_| invalid("잘못된 IP 주소")),
            Some((network, prefix_len)) => {
                let network = network
                    .parse::<IpAddr>()
                    .map_err(|_| invalid("잘못된 CIDR 네트워크"))?
                    .to_canonical();
                let prefix_len = prefix_len
                    .parse::<u8>()
                    .map_err(|_| invalid("잘못된 CIDR 접두사 길이"))?;
                let max_len = match network {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                if prefix_len > max_len {
                    return Err(invalid("CIDR 접두사 길이 초과"));
                }
                Ok(IpRule::Cidr { network, prefix_len })
            }
        }
    }

    pub fn matches(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match *self {
            IpRule::Exact(expected) => expected == ip,
            IpRule::Cidr { network, prefix_len } => match (network, ip) {
                (IpAddr::V4(network), IpAddr::V4(ip)) => {
                    let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
                    u32::from(network) & mask == u32::from(ip) & mask
                }
                (IpAddr::V6(network), IpAddr::V6(ip)) => {
                    let mask = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
                    u128::from(network) & mask == u128::from(ip) & mask
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for IpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpRule::Exact(ip) => write!(f, "{}", ip),
            IpRule::Cidr { network, prefix_len } => write!(f, "{}/{}", network, prefix_len),
        }
    }
}

/// 서비스별 접근 제어 설정
///
/// 화이트 리스트가 비어 있지 않으면 배타적으로 적용됩니다.
/// QPS 제한 값 0은 무제한을 뜻합니다.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessControlConfig {
    pub service_id: i64,
    pub auth_enabled: bool,
    pub black_list: Vec<IpRule>,
    pub white_list: Vec<IpRule>,
    pub client_qps_limit: u64,
    pub service_qps_limit: u64,
}

impl AccessControlConfig {
    pub fn new(service_id: i64) -> Self {
        Self {
            service_id,
            ..Default::default()
        }
    }

    /// 쉼표 또는 줄바꿈으로 구분된 IP/CIDR 목록을 파싱합니다.
    pub fn parse_ip_list(field: &str, list: &str) -> Result<Vec<IpRule>, ConfigError> {
        list.split(|c| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| IpRule::parse(field, entry))
            .collect()
    }

    pub fn is_whitelisted(&self, ip: IpAddr) -> bool {
        self.white_list.iter().any(|rule| rule.matches(ip))
    }

    pub fn is_blacklisted(&self, ip: IpAddr) -> bool {
        self.black_list.iter().any(|rule| rule.matches(ip))
    }
}
