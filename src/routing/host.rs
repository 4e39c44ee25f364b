use crate::routing::error::RoutingError;

/// 호스트 정보를 담는 불변 데이터 구조입니다.
///
/// # 필드
///
/// * `name` - 소문자로 정규화된 호스트 이름 (예: "example.com")
/// * `port` - 선택적 포트 번호
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInfo {
    pub name: String,
    pub port: Option<u16>,
}

impl HostInfo {
    /// 호스트 헤더 값에서 HostInfo를 생성합니다.
    ///
    /// # 인자
    ///
    /// * `value` - 파싱할 호스트 문자열 (예: "example.com", "example.com:8080", "[::1]:8080")
    ///
    /// # 반환
    ///
    /// 성공 시 `HostInfo` 인스턴스를 포함한 `Ok`를 반환하고,
    /// 실패 시 적절한 `RoutingError`를 포함한 `Err`를 반환합니다.
    ///
    /// # 예제
    ///
    /// ```
    /// use service_gateway::routing::HostInfo;
    ///
    /// let host_info = HostInfo::from_header_value("Example.com:8080").unwrap();
    /// assert_eq!(host_info.name, "example.com");
    /// assert_eq!(host_info.port, Some(8080));
    /// ```
    pub fn from_header_value(value: &str) -> Result<Self, RoutingError> {
        let invalid = || RoutingError::InvalidHost {
            host: value.to_string(),
            reason: "Invalid format".to_string(),
        };

        if value.is_empty() {
            return Err(invalid());
        }

        // IPv6 리터럴: [addr] 또는 [addr]:port
        if let Some(rest) = value.strip_prefix('[') {
            let (addr, tail) = rest.split_once(']').ok_or_else(invalid)?;
            if addr.is_empty() {
                return Err(invalid());
            }
            let port = match tail {
                "" => None,
                tail => Some(parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?),
            };
            return Ok(HostInfo {
                name: format!("[{}]", addr.to_lowercase()),
                port,
            });
        }

        // 호스트와 포트 분리
        let parts: Vec<&str> = value.split(':').collect();
        match parts.len() {
            1 => Ok(HostInfo {
                name: value.to_lowercase(),
                port: None,
            }),
            2 => {
                // 호스트 이름이 비어있는지 확인
                if parts[0].is_empty() {
                    return Err(invalid());
                }

                Ok(HostInfo {
                    name: parts[0].to_lowercase(),
                    port: Some(parse_port(parts[1])?),
                })
            }
            _ => Err(invalid()),
        }
    }
}

fn parse_port(value: &str) -> Result<u16, RoutingError> {
    let port = value.parse::<u16>().map_err(|_| RoutingError::InvalidPort {
        port: value.to_string(),
        reason: "Invalid format".to_string(),
    })?;

    if port == 0 {
        return Err(RoutingError::InvalidPort {
            port: value.to_string(),
            reason: "Port must be greater than 0".to_string(),
        });
    }
    Ok(port)
}

/// 매칭용으로 호스트 값에서 포트를 떼어내고 소문자로 정규화합니다.
///
/// 형식이 잘못된 값은 `None`이며, 이 경우 도메인 매칭을 건너뜁니다.
pub(crate) fn normalize_host(host: &str) -> Option<String> {
    HostInfo::from_header_value(host.trim()).ok().map(|info| info.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("API.example.com:443").as_deref(), Some("api.example.com"));
        assert_eq!(normalize_host("[::1]:8080").as_deref(), Some("[::1]"));
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("a:b:c"), None);
    }

    #[test]
    fn test_ipv6_host() {
        let info = HostInfo::from_header_value("[2001:db8::1]").unwrap();
        assert_eq!(info.name, "[2001:db8::1]");
        assert_eq!(info.port, None);

        assert!(HostInfo::from_header_value("[2001:db8::1]x").is_err());
        assert!(HostInfo::from_header_value("[::1]:0").is_err());
    }
}
